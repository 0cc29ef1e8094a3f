//! Nested writes of handling records through an event log.
//!
//! Handling records are matched by (owner, machine identifier). On create,
//! every submitted entry is fetched or created and linked. On update with a
//! submitted list, records linked to the event log whose machine identifier
//! is no longer listed are deleted outright (not just unlinked), then every
//! entry is fetched or created and linked. Each nested write runs in a single
//! `BEGIN IMMEDIATE` transaction, so concurrent writers queue on the busy
//! timeout instead of failing their lock upgrade.

use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::debug;

use super::begin_immediate;
use super::models::{
    get_event_log, handling_records_for, insert_event_log, save_event_log, upsert_by_key, EventLog,
    EventLogPayload, HandlingRecord, HandlingRecordPayload,
};

/// Link a handling record to an event log. Linking twice is a no-op.
pub async fn link(
    conn: &mut SqliteConnection,
    event_log_id: i64,
    handling_record_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR IGNORE INTO event_log_handling_records (event_log_id, handling_record_id) VALUES (?, ?)",
    )
    .bind(event_log_id)
    .bind(handling_record_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Delete every handling record linked to `event_log_id` whose machine
/// identifier is not in `keep`. The rows are removed from `handling_records`,
/// which also drops their links to any other event log.
pub async fn delete_unreferenced(
    conn: &mut SqliteConnection,
    event_log_id: i64,
    keep: &HashSet<String>,
) -> Result<u64, sqlx::Error> {
    let linked = handling_records_for(&mut *conn, event_log_id).await?;

    let mut deleted = 0;
    for record in linked.into_iter().filter(|r| !keep.contains(&r.machine)) {
        deleted += sqlx::query("DELETE FROM handling_records WHERE id = ?")
            .bind(record.id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        debug!(event_log_id, handling_record_id = record.id, machine = %record.machine, "Deleted dropped handling record");
    }
    Ok(deleted)
}

/// Get-or-create each entry for `user_id` and link it to the event log.
async fn attach(
    conn: &mut SqliteConnection,
    user_id: i64,
    event_log_id: i64,
    entries: Vec<HandlingRecordPayload>,
) -> Result<(), sqlx::Error> {
    for entry in entries {
        let machine = entry.machine.clone().unwrap_or_default();
        let (record, created) = upsert_by_key(&mut *conn, user_id, &machine, entry).await?;
        if created {
            debug!(user_id, handling_record_id = record.id, machine = %machine, "Created handling record");
        }
        link(&mut *conn, event_log_id, record.id).await?;
    }
    Ok(())
}

/// Create an event log for `user_id` together with its handling records.
pub async fn create_event_log(
    pool: &SqlitePool,
    user_id: i64,
    mut payload: EventLogPayload,
) -> Result<(EventLog, Vec<HandlingRecord>), sqlx::Error> {
    let entries = payload.xulysukientbs.take().unwrap_or_default();

    let mut tx = begin_immediate(pool).await?;
    let log = insert_event_log(&mut tx, user_id, &payload).await?;
    attach(&mut tx, user_id, log.id, entries).await?;
    let records = handling_records_for(&mut tx, log.id).await?;
    tx.commit().await?;

    Ok((log, records))
}

/// Update an event log owned by `user_id`, reconciling its handling records
/// when the payload lists them. Returns `None` when the event log does not
/// exist for that owner.
pub async fn update_event_log(
    pool: &SqlitePool,
    user_id: i64,
    id: i64,
    mut payload: EventLogPayload,
) -> Result<Option<(EventLog, Vec<HandlingRecord>)>, sqlx::Error> {
    let mut tx = begin_immediate(pool).await?;

    let Some(mut log) = get_event_log(&mut tx, user_id, id).await? else {
        return Ok(None);
    };

    if let Some(entries) = payload.xulysukientbs.take() {
        let keep: HashSet<String> = entries
            .iter()
            .map(|e| e.machine.clone().unwrap_or_default())
            .collect();
        delete_unreferenced(&mut tx, log.id, &keep).await?;
        attach(&mut tx, user_id, log.id, entries).await?;
    }

    log.apply(&payload);
    save_event_log(&mut tx, &log).await?;

    let records = handling_records_for(&mut tx, log.id).await?;
    tx.commit().await?;

    Ok(Some((log, records)))
}
