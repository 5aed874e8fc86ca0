pub mod change;
pub mod ids;
pub mod record;

pub use change::{Change, ChangeAction, DuplicateGroup};
pub use ids::RecordId;
pub use record::{ListFilter, Record, RecordPatch};
