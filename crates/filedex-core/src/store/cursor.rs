use rusqlite::types::Value;
use rusqlite::{params_from_iter, Transaction};
use std::collections::VecDeque;
use std::fmt;
use std::iter::FusedIterator;

use crate::error::Result;
use crate::model::{ListFilter, Record};
use crate::store::provider::Session;
use crate::store::repository::{row_to_record, RECORD_COLUMNS};

const PAGE_SIZE: u32 = 256;

/// Lazy, finite iterator over the records matching a [`ListFilter`].
///
/// Pages are fetched by ascending id inside a single read transaction, so
/// the whole iteration sees one committed snapshot. The cursor borrows its
/// session and ends with it.
pub struct RecordCursor<'s> {
    tx: Transaction<'s>,
    sql: String,
    filter_params: Vec<Value>,
    last_id: i64,
    remaining: Option<u32>,
    page: VecDeque<Record>,
    done: bool,
}

impl<'s> RecordCursor<'s> {
    pub(crate) fn open(session: &'s Session, filter: &ListFilter) -> Result<Self> {
        let tx = session.conn().unchecked_transaction()?;

        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id > ?");
        let mut filter_params = Vec::new();
        if let Some(text) = &filter.name_contains {
            sql.push_str(" AND name LIKE ? ESCAPE '\\'");
            filter_params.push(Value::Text(format!("%{}%", escape_like(text))));
        }
        if let Some(hash) = &filter.hash {
            sql.push_str(" AND lower(hash) = lower(?)");
            filter_params.push(Value::Text(hash.clone()));
        }
        sql.push_str(" ORDER BY id LIMIT ?");

        Ok(Self {
            tx,
            sql,
            filter_params,
            last_id: 0,
            remaining: filter.limit,
            page: VecDeque::new(),
            done: filter.limit == Some(0),
        })
    }

    fn fetch_page(&mut self) -> Result<()> {
        let batch = self.remaining.map_or(PAGE_SIZE, |left| left.min(PAGE_SIZE));

        let mut params = Vec::with_capacity(self.filter_params.len() + 2);
        params.push(Value::Integer(self.last_id));
        params.extend(self.filter_params.iter().cloned());
        params.push(Value::Integer(i64::from(batch)));

        let records = {
            let mut stmt = self.tx.prepare_cached(&self.sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), row_to_record)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let fetched = u32::try_from(records.len()).unwrap_or(u32::MAX);
        if fetched < batch {
            self.done = true;
        }
        if let Some(left) = self.remaining.as_mut() {
            *left = left.saturating_sub(fetched);
            if *left == 0 {
                self.done = true;
            }
        }
        if let Some(last) = records.last() {
            self.last_id = last.id.get();
        }
        self.page.extend(records);
        Ok(())
    }
}

impl Iterator for RecordCursor<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.page.pop_front() {
            return Some(Ok(record));
        }
        if self.done {
            return None;
        }
        match self.fetch_page() {
            Ok(()) => self.page.pop_front().map(Ok),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for RecordCursor<'_> {}

impl fmt::Debug for RecordCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCursor")
            .field("sql", &self.sql)
            .field("last_id", &self.last_id)
            .field("remaining", &self.remaining)
            .field("buffered", &self.page.len())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
