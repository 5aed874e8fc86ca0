//! Transactional CRUD over the `records` table.
//!
//! Every mutation runs in one `IMMEDIATE` transaction together with its
//! change-log entry. On error the transaction is rolled back before the
//! error is returned, so a failed command leaves the store untouched.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::codec;
use crate::error::{Error, Result};
use crate::model::{Change, ChangeAction, DuplicateGroup, ListFilter, Record, RecordId, RecordPatch};
use crate::scan::{ScanSummary, ScannedFile};
use crate::store::cursor::RecordCursor;
use crate::store::provider::Session;

pub(crate) const RECORD_COLUMNS: &str = "id, name, size, hash, modified_at";

/// Insert a new record.
pub fn create(session: &mut Session, record: &Record) -> Result<Record> {
    record.validate()?;
    in_transaction(session, "create", |tx| {
        insert_record(tx, record)?;
        append_change(tx, record.id, ChangeAction::Added, Some(record))?;
        Ok(record.clone())
    })
}

/// Fetch one record by id.
pub fn read(session: &Session, id: RecordId) -> Result<Record> {
    fetch(session.conn(), id)?.ok_or(Error::NotFound { id })
}

/// Apply `patch` to an existing record and return the stored result.
pub fn update(session: &mut Session, id: RecordId, patch: &RecordPatch) -> Result<Record> {
    if patch.is_empty() {
        return Err(Error::validation("fields", "nothing to update"));
    }
    in_transaction(session, "update", |tx| {
        let current = fetch(tx, id)?.ok_or(Error::NotFound { id })?;
        let updated = patch.apply_to(&current);
        updated.validate()?;

        overwrite_record(tx, &updated)?;
        append_change(tx, id, ChangeAction::Updated, Some(&updated))?;
        Ok(updated)
    })
}

/// Remove a record.
pub fn delete(session: &mut Session, id: RecordId) -> Result<()> {
    in_transaction(session, "delete", |tx| {
        let removed = tx.execute("DELETE FROM records WHERE id = ?1", [id.get()])?;
        if removed == 0 {
            return Err(Error::NotFound { id });
        }
        append_change(tx, id, ChangeAction::Removed, None)
    })
}

/// Iterate over matching records, ordered by id.
pub fn list<'s>(session: &'s Session, filter: &ListFilter) -> Result<RecordCursor<'s>> {
    RecordCursor::open(session, filter)
}

/// Insert all `records` or none of them.
pub fn import(session: &mut Session, records: &[Record]) -> Result<usize> {
    for record in records {
        record.validate()?;
    }
    in_transaction(session, "import", |tx| {
        for record in records {
            insert_record(tx, record)?;
            append_change(tx, record.id, ChangeAction::Imported, Some(record))?;
        }
        Ok(records.len())
    })
}

/// Catalog scanned files by name, all in one transaction.
///
/// An unknown name gets the next id never used by a record or the change
/// log. A known name is rewritten only when its size, hash or modification
/// time differ from the stored record.
pub fn scan(session: &mut Session, files: &[ScannedFile]) -> Result<ScanSummary> {
    in_transaction(session, "scan", |tx| {
        let mut summary = ScanSummary::default();
        for file in files {
            let name = file.name();
            let existing = fetch_by_name(tx, &name)?;
            let scanned = Record {
                id: match &existing {
                    Some(current) => current.id,
                    None => next_id(tx)?,
                },
                name,
                size: Some(file.size),
                hash: Some(file.hash.clone()),
                modified_at: Some(file.modified_at),
            };

            match existing {
                Some(current) if current == scanned => {
                    summary.unchanged += 1;
                    continue;
                }
                Some(_) => {
                    scanned.validate()?;
                    overwrite_record(tx, &scanned)?;
                    summary.updated += 1;
                }
                None => {
                    scanned.validate()?;
                    insert_record(tx, &scanned)?;
                    summary.added += 1;
                }
            }
            append_change(tx, scanned.id, ChangeAction::Scanned, Some(&scanned))?;
        }
        Ok(summary)
    })
}

/// Group records that share a content hash (case-insensitive).
pub fn duplicates(session: &Session) -> Result<Vec<DuplicateGroup>> {
    let tx = session.conn().unchecked_transaction()?;

    let hashes: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT lower(hash) FROM records
             WHERE hash IS NOT NULL
             GROUP BY lower(hash)
             HAVING COUNT(*) > 1
             ORDER BY lower(hash)",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut stmt = tx.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM records WHERE lower(hash) = ?1 ORDER BY id"
    ))?;
    let mut groups = Vec::with_capacity(hashes.len());
    for hash in hashes {
        let records = stmt
            .query_map([&hash], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        groups.push(DuplicateGroup { hash, records });
    }

    Ok(groups)
}

/// Change-log entries for `id`, oldest first.
///
/// Removed records keep their history. A stored record without log
/// entries has an empty history; an id that is neither stored nor logged is
/// `NotFound`.
pub fn history(session: &Session, id: RecordId) -> Result<Vec<Change>> {
    let mut stmt = session.conn().prepare(
        "SELECT seq, record_id, action, snapshot, changed_at
         FROM record_changes
         WHERE record_id = ?1
         ORDER BY seq",
    )?;
    let changes = stmt
        .query_map([id.get()], row_to_change)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if changes.is_empty() && fetch(session.conn(), id)?.is_none() {
        return Err(Error::NotFound { id });
    }
    Ok(changes)
}

/// Number of stored records.
pub fn count(session: &Session) -> Result<u64> {
    let count: i64 = session
        .conn()
        .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

fn in_transaction<T, F>(session: &mut Session, operation: &str, body: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = session
        .conn_mut()
        .transaction_with_behavior(TransactionBehavior::Immediate)?;

    match body(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            match tx.rollback() {
                Ok(()) => log::debug!("Rolled back {} after error: {}", operation, err),
                Err(rollback_err) => {
                    log::warn!("Rollback of {} failed: {}", operation, rollback_err);
                }
            }
            Err(err)
        }
    }
}

fn insert_record(conn: &Connection, record: &Record) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO records (id, name, size, hash, modified_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.id.get(),
            record.name,
            record.size,
            record.hash,
            record.modified_at.map(format_timestamp),
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(err) if is_key_violation(&err) => Err(Error::DuplicateKey { id: record.id }),
        Err(err) => Err(err.into()),
    }
}

fn overwrite_record(conn: &Connection, record: &Record) -> Result<()> {
    conn.execute(
        "UPDATE records SET name = ?2, size = ?3, hash = ?4, modified_at = ?5
         WHERE id = ?1",
        params![
            record.id.get(),
            record.name,
            record.size,
            record.hash,
            record.modified_at.map(format_timestamp),
        ],
    )?;
    Ok(())
}

// Ids of removed records stay reserved for their history.
fn next_id(conn: &Connection) -> Result<RecordId> {
    let highest: i64 = conn.query_row(
        "SELECT MAX(
             COALESCE((SELECT MAX(id) FROM records), 0),
             COALESCE((SELECT MAX(record_id) FROM record_changes), 0)
         )",
        [],
        |row| row.get(0),
    )?;
    RecordId::new(highest + 1)
}

fn append_change(
    conn: &Connection,
    id: RecordId,
    action: ChangeAction,
    snapshot: Option<&Record>,
) -> Result<()> {
    let snapshot = snapshot.map(codec::to_json).transpose()?;
    conn.execute(
        "INSERT INTO record_changes (record_id, action, snapshot, changed_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            id.get(),
            action.as_str(),
            snapshot,
            format_timestamp(Utc::now()),
        ],
    )?;
    Ok(())
}

fn fetch(conn: &Connection, id: RecordId) -> Result<Option<Record>> {
    let record = conn
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
            [id.get()],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

fn fetch_by_name(conn: &Connection, name: &str) -> Result<Option<Record>> {
    let record = conn
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM records WHERE name = ?1 ORDER BY id LIMIT 1"),
            [name],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

fn is_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

pub(crate) fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    let id = RecordId::new(row.get(0)?)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(err)))?;
    let modified_at = row
        .get::<_, Option<String>>(4)?
        .map(|text| parse_timestamp(4, &text))
        .transpose()?;

    Ok(Record {
        id,
        name: row.get(1)?,
        size: row.get(2)?,
        hash: row.get(3)?,
        modified_at,
    })
}

fn row_to_change(row: &Row<'_>) -> rusqlite::Result<Change> {
    let record_id = RecordId::new(row.get(1)?)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(1, Type::Integer, Box::new(err)))?;
    let action = row
        .get::<_, String>(2)?
        .parse::<ChangeAction>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(err)))?;
    let record = row
        .get::<_, Option<String>>(3)?
        .map(|text| {
            serde_json::from_str::<Record>(&text).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(err))
            })
        })
        .transpose()?;
    let changed_at = parse_timestamp(4, &row.get::<_, String>(4)?)?;

    Ok(Change {
        seq: row.get(0)?,
        record_id,
        action,
        record,
        changed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ConnectionProvider, StoreConfig};

    fn provider() -> ConnectionProvider {
        ConnectionProvider::new(StoreConfig::embedded("repository-unit")).unwrap()
    }

    fn id(value: i64) -> RecordId {
        RecordId::new(value).unwrap()
    }

    #[test]
    fn test_create_writes_change_log() {
        let provider = provider();
        let mut session = provider.acquire().unwrap();
        create(&mut session, &Record::new(id(1), "a.txt")).unwrap();

        let changes = history(&session, id(1)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, ChangeAction::Added);
        assert_eq!(changes[0].record.as_ref().map(|r| r.name.as_str()), Some("a.txt"));
    }

    #[test]
    fn test_invalid_record_never_reaches_the_table() {
        let provider = provider();
        let mut session = provider.acquire().unwrap();
        let err = create(&mut session, &Record::new(id(1), "")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(count(&session).unwrap(), 0);
    }

    #[test]
    fn test_timestamp_storage_keeps_precision() {
        let at = DateTime::parse_from_rfc3339("2021-06-01T08:30:00.000123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let text = format_timestamp(at);
        assert_eq!(parse_timestamp(0, &text).unwrap(), at);
    }

    #[test]
    fn test_corrupt_timestamp_is_conversion_error() {
        let provider = provider();
        let session = provider.acquire().unwrap();
        session
            .conn()
            .execute(
                "INSERT INTO records (id, name, modified_at) VALUES (5, 'x', 'yesterday')",
                [],
            )
            .unwrap();

        let err = read(&session, id(5)).unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }
}
