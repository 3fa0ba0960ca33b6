use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::ValidationRecord;

use super::RowKeys;

/// Persistence for validation records. Writes are upserts keyed by
/// `(DOC#id, VALIDATION#timestamp)`.
pub trait RecordStore: Send + Sync {
    fn put_record(&self, record: &ValidationRecord) -> Result<(), DatabaseError>;

    /// Records of one run for one organization, ordered by document id.
    fn records_for_run(&self, org_id: &str, run_id: &str) -> Result<Vec<ValidationRecord>, DatabaseError>;

    /// Every validation of one document, oldest first.
    fn records_for_document(&self, document_id: &str) -> Result<Vec<ValidationRecord>, DatabaseError>;

    /// Records validated on one day (`YYYY-MM-DD`).
    fn records_for_date(&self, date: &str) -> Result<Vec<ValidationRecord>, DatabaseError>;
}

pub fn validation_keys(record: &ValidationRecord) -> RowKeys {
    let doc = format!("DOC#{}", record.document_id);
    RowKeys {
        pk: doc.clone(),
        sk: format!("VALIDATION#{}", record.timestamp),
        gsi1pk: format!("DATE#{}", record.date()),
        gsi1sk: doc.clone(),
        gsi2pk: format!("RUN#{}", record.run_id),
        gsi2sk: doc,
    }
}

pub fn upsert_validation_record(conn: &Connection, record: &ValidationRecord) -> Result<(), DatabaseError> {
    let keys = validation_keys(record);
    let body = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO validation_records (pk, sk, gsi1pk, gsi1sk, gsi2pk, gsi2sk,
         run_id, org_id, document_id, validation_timestamp, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT (pk, sk) DO UPDATE SET
            gsi1pk = excluded.gsi1pk, gsi1sk = excluded.gsi1sk,
            gsi2pk = excluded.gsi2pk, gsi2sk = excluded.gsi2sk,
            run_id = excluded.run_id, org_id = excluded.org_id,
            document_id = excluded.document_id,
            validation_timestamp = excluded.validation_timestamp,
            body = excluded.body",
        params![
            keys.pk,
            keys.sk,
            keys.gsi1pk,
            keys.gsi1sk,
            keys.gsi2pk,
            keys.gsi2sk,
            record.run_id,
            record.org_id,
            record.document_id,
            record.timestamp,
            body,
        ],
    )?;
    Ok(())
}

fn query_records(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<ValidationRecord>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let bodies = stmt
        .query_map(args, |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    bodies
        .iter()
        .map(|body| serde_json::from_str(body).map_err(DatabaseError::from))
        .collect()
}

pub fn get_run_records(conn: &Connection, org_id: &str, run_id: &str) -> Result<Vec<ValidationRecord>, DatabaseError> {
    query_records(
        conn,
        "SELECT body FROM validation_records
         WHERE gsi2pk = ?1 AND org_id = ?2
         ORDER BY gsi2sk, validation_timestamp",
        &[&format!("RUN#{run_id}"), &org_id],
    )
}

pub fn get_document_records(conn: &Connection, document_id: &str) -> Result<Vec<ValidationRecord>, DatabaseError> {
    query_records(
        conn,
        "SELECT body FROM validation_records WHERE pk = ?1 ORDER BY sk",
        &[&format!("DOC#{document_id}")],
    )
}

pub fn get_date_records(conn: &Connection, date: &str) -> Result<Vec<ValidationRecord>, DatabaseError> {
    query_records(
        conn,
        "SELECT body FROM validation_records
         WHERE gsi1pk = ?1
         ORDER BY gsi1sk, validation_timestamp",
        &[&format!("DATE#{date}")],
    )
}

/// `RecordStore` over one SQLite connection.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

impl RecordStore for SqliteRecordStore {
    fn put_record(&self, record: &ValidationRecord) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        upsert_validation_record(&conn, record)
    }

    fn records_for_run(&self, org_id: &str, run_id: &str) -> Result<Vec<ValidationRecord>, DatabaseError> {
        let conn = self.conn()?;
        get_run_records(&conn, org_id, run_id)
    }

    fn records_for_document(&self, document_id: &str) -> Result<Vec<ValidationRecord>, DatabaseError> {
        let conn = self.conn()?;
        get_document_records(&conn, document_id)
    }

    fn records_for_date(&self, date: &str) -> Result<Vec<ValidationRecord>, DatabaseError> {
        let conn = self.conn()?;
        get_date_records(&conn, date)
    }
}
