use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::IrpRecord;

use super::RowKeys;

/// Read side used by IRP comparison rules.
pub trait IrpLookup: Send + Sync {
    /// Most recent plan for a consumer, by start date.
    fn latest_for_consumer(&self, org_id: &str, consumer_name: &str) -> Result<Option<IrpRecord>, DatabaseError>;
}

/// Write side used by IRP processing.
pub trait IrpStore: IrpLookup {
    fn put_irp(&self, record: &IrpRecord) -> Result<(), DatabaseError>;
}

pub fn irp_keys(record: &IrpRecord) -> RowKeys {
    RowKeys {
        pk: consumer_partition(&record.org_id, &record.consumer_name),
        sk: format!("IRP#{}", record.irp_id),
        gsi1pk: format!("CONSUMER#{}", record.consumer_name),
        gsi1sk: format!("DATE#{}", record.start_date),
        gsi2pk: format!("ORG#{}", record.org_id),
        gsi2sk: format!("STARTDATE#{}", record.start_date),
    }
}

fn consumer_partition(org_id: &str, consumer_name: &str) -> String {
    format!("ORG#{org_id}#CONSUMER#{consumer_name}")
}

pub fn upsert_irp_record(conn: &Connection, record: &IrpRecord) -> Result<(), DatabaseError> {
    let keys = irp_keys(record);
    let body = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO irp_records (pk, sk, gsi1pk, gsi1sk, gsi2pk, gsi2sk,
         irp_id, org_id, consumer_name, irp_start_date, processed_timestamp, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT (pk, sk) DO UPDATE SET
            gsi1pk = excluded.gsi1pk, gsi1sk = excluded.gsi1sk,
            gsi2pk = excluded.gsi2pk, gsi2sk = excluded.gsi2sk,
            irp_start_date = excluded.irp_start_date,
            processed_timestamp = excluded.processed_timestamp,
            body = excluded.body",
        params![
            keys.pk,
            keys.sk,
            keys.gsi1pk,
            keys.gsi1sk,
            keys.gsi2pk,
            keys.gsi2sk,
            record.irp_id,
            record.org_id,
            record.consumer_name,
            record.start_date,
            record.processed_at,
            body,
        ],
    )?;
    Ok(())
}

pub fn get_latest_irp(conn: &Connection, org_id: &str, consumer_name: &str) -> Result<Option<IrpRecord>, DatabaseError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM irp_records WHERE pk = ?1
             ORDER BY gsi1sk DESC, processed_timestamp DESC
             LIMIT 1",
            params![consumer_partition(org_id, consumer_name)],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|b| serde_json::from_str(&b).map_err(DatabaseError::from))
        .transpose()
}

/// Plans of one organization, ordered by start date.
pub fn get_org_irps(conn: &Connection, org_id: &str) -> Result<Vec<IrpRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT body FROM irp_records WHERE gsi2pk = ?1 ORDER BY gsi2sk, consumer_name",
    )?;
    let bodies = stmt
        .query_map(params![format!("ORG#{org_id}")], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    bodies
        .iter()
        .map(|b| serde_json::from_str(b).map_err(DatabaseError::from))
        .collect()
}

/// IRP table over one SQLite connection.
pub struct SqliteIrpStore {
    conn: Mutex<Connection>,
}

impl SqliteIrpStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    pub fn upsert(&self, record: &IrpRecord) -> Result<(), DatabaseError> {
        let conn = self.conn()?;
        upsert_irp_record(&conn, record)
    }

    pub fn list_for_org(&self, org_id: &str) -> Result<Vec<IrpRecord>, DatabaseError> {
        let conn = self.conn()?;
        get_org_irps(&conn, org_id)
    }
}

impl IrpLookup for SqliteIrpStore {
    fn latest_for_consumer(&self, org_id: &str, consumer_name: &str) -> Result<Option<IrpRecord>, DatabaseError> {
        let conn = self.conn()?;
        get_latest_irp(&conn, org_id, consumer_name)
    }
}

impl IrpStore for SqliteIrpStore {
    fn put_irp(&self, record: &IrpRecord) -> Result<(), DatabaseError> {
        self.upsert(record)
    }
}
