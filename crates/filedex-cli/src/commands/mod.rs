pub mod config;
pub mod records;

pub use records::run_record_command;
