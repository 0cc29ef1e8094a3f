//! Handling record (xu ly su kien) models and queries.
//!
//! A handling record is one remediation note for a machine. The machine
//! identifier (`Tomay` on the wire) is the natural key that nested event log
//! writes match on, scoped per owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use super::common::{assign, deserialize_some_utc};

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct HandlingRecord {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub machine: String,
    pub content: String,
    pub handled_at: Option<DateTime<Utc>>,
    pub inspection_process: String,
    pub related_proposals: String,
    pub directives: String,
    pub status: String,
    pub handling_process: String,
    pub root_cause_analysis: String,
    pub recording_unit: String,
    pub recording_shift: String,
}

/// Handling record as exposed over the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlingRecordResponse {
    pub id: i64,
    pub title: String,
    #[serde(rename = "Tomay")]
    pub machine: String,
    #[serde(rename = "Noidung_xuly")]
    pub content: String,
    #[serde(rename = "Thoigian_xuly")]
    pub handled_at: Option<DateTime<Utc>>,
    #[serde(rename = "Quatrinh_kiemtra")]
    pub inspection_process: String,
    #[serde(rename = "Dexuat_lienquan")]
    pub related_proposals: String,
    #[serde(rename = "Chidao")]
    pub directives: String,
    #[serde(rename = "Tinhtrang_xuly")]
    pub status: String,
    #[serde(rename = "Quatrinh_Xuly")]
    pub handling_process: String,
    #[serde(rename = "Phantich_Nguyennhan_Xl")]
    pub root_cause_analysis: String,
    #[serde(rename = "Donvi_ghinhan")]
    pub recording_unit: String,
    #[serde(rename = "Cavanhanh_ghinhan")]
    pub recording_shift: String,
}

impl From<HandlingRecord> for HandlingRecordResponse {
    fn from(record: HandlingRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            machine: record.machine,
            content: record.content,
            handled_at: record.handled_at,
            inspection_process: record.inspection_process,
            related_proposals: record.related_proposals,
            directives: record.directives,
            status: record.status,
            handling_process: record.handling_process,
            root_cause_analysis: record.root_cause_analysis,
            recording_unit: record.recording_unit,
            recording_shift: record.recording_shift,
        }
    }
}

/// Incoming handling record fields, both for direct updates and for the
/// `xulysukientbs` entries of an event log payload. Absent fields stay
/// untouched; `id` and `user` are never read from a payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandlingRecordPayload {
    pub title: Option<String>,
    #[serde(rename = "Tomay")]
    pub machine: Option<String>,
    #[serde(rename = "Noidung_xuly")]
    pub content: Option<String>,
    #[serde(rename = "Thoigian_xuly", default, deserialize_with = "deserialize_some_utc")]
    pub handled_at: Option<Option<DateTime<Utc>>>,
    #[serde(rename = "Quatrinh_kiemtra")]
    pub inspection_process: Option<String>,
    #[serde(rename = "Dexuat_lienquan")]
    pub related_proposals: Option<String>,
    #[serde(rename = "Chidao")]
    pub directives: Option<String>,
    #[serde(rename = "Tinhtrang_xuly")]
    pub status: Option<String>,
    #[serde(rename = "Quatrinh_Xuly")]
    pub handling_process: Option<String>,
    #[serde(rename = "Phantich_Nguyennhan_Xl")]
    pub root_cause_analysis: Option<String>,
    #[serde(rename = "Donvi_ghinhan")]
    pub recording_unit: Option<String>,
    #[serde(rename = "Cavanhanh_ghinhan")]
    pub recording_shift: Option<String>,
}

impl HandlingRecordPayload {
    /// Payload carrying only a machine identifier.
    pub fn for_machine(machine: impl Into<String>) -> Self {
        Self {
            machine: Some(machine.into()),
            ..Self::default()
        }
    }
}

impl HandlingRecord {
    /// Copy every field present in the payload onto this record.
    pub fn apply(&mut self, payload: HandlingRecordPayload) {
        assign(&mut self.title, payload.title);
        assign(&mut self.machine, payload.machine);
        assign(&mut self.content, payload.content);
        assign(&mut self.handled_at, payload.handled_at);
        assign(&mut self.inspection_process, payload.inspection_process);
        assign(&mut self.related_proposals, payload.related_proposals);
        assign(&mut self.directives, payload.directives);
        assign(&mut self.status, payload.status);
        assign(&mut self.handling_process, payload.handling_process);
        assign(&mut self.root_cause_analysis, payload.root_cause_analysis);
        assign(&mut self.recording_unit, payload.recording_unit);
        assign(&mut self.recording_shift, payload.recording_shift);
    }

    /// A not-yet-persisted record for `user_id` built from a payload.
    fn draft(user_id: i64, payload: HandlingRecordPayload) -> Self {
        let mut record = Self {
            id: 0,
            user_id,
            title: String::new(),
            machine: String::new(),
            content: String::new(),
            handled_at: None,
            inspection_process: String::new(),
            related_proposals: String::new(),
            directives: String::new(),
            status: String::new(),
            handling_process: String::new(),
            root_cause_analysis: String::new(),
            recording_unit: String::new(),
            recording_shift: String::new(),
        };
        record.apply(payload);
        record
    }
}

/// All handling records of one owner, machine identifier descending.
pub async fn list_handling_records(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<HandlingRecord>, sqlx::Error> {
    sqlx::query_as::<_, HandlingRecord>(
        "SELECT * FROM handling_records WHERE user_id = ? ORDER BY machine DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Fetch a handling record only if it belongs to `user_id`.
pub async fn get_handling_record(
    conn: &mut SqliteConnection,
    user_id: i64,
    id: i64,
) -> Result<Option<HandlingRecord>, sqlx::Error> {
    sqlx::query_as::<_, HandlingRecord>(
        "SELECT * FROM handling_records WHERE id = ? AND user_id = ?",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(conn)
    .await
}

/// Insert a new handling record for `user_id`.
pub async fn create_handling_record(
    conn: &mut SqliteConnection,
    user_id: i64,
    payload: HandlingRecordPayload,
) -> Result<HandlingRecord, sqlx::Error> {
    let draft = HandlingRecord::draft(user_id, payload);

    let id = sqlx::query(
        r#"
        INSERT INTO handling_records (
            user_id, title, machine, content, handled_at, inspection_process,
            related_proposals, directives, status, handling_process,
            root_cause_analysis, recording_unit, recording_shift
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(draft.user_id)
    .bind(&draft.title)
    .bind(&draft.machine)
    .bind(&draft.content)
    .bind(draft.handled_at)
    .bind(&draft.inspection_process)
    .bind(&draft.related_proposals)
    .bind(&draft.directives)
    .bind(&draft.status)
    .bind(&draft.handling_process)
    .bind(&draft.root_cause_analysis)
    .bind(&draft.recording_unit)
    .bind(&draft.recording_shift)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(HandlingRecord { id, ..draft })
}

/// Persist every mutable column of `record`. Ownership is part of the
/// WHERE clause, so a record can never move to another user.
pub async fn save_handling_record(
    conn: &mut SqliteConnection,
    record: &HandlingRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE handling_records SET
            title = ?, machine = ?, content = ?, handled_at = ?,
            inspection_process = ?, related_proposals = ?, directives = ?,
            status = ?, handling_process = ?, root_cause_analysis = ?,
            recording_unit = ?, recording_shift = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(&record.title)
    .bind(&record.machine)
    .bind(&record.content)
    .bind(record.handled_at)
    .bind(&record.inspection_process)
    .bind(&record.related_proposals)
    .bind(&record.directives)
    .bind(&record.status)
    .bind(&record.handling_process)
    .bind(&record.root_cause_analysis)
    .bind(&record.recording_unit)
    .bind(&record.recording_shift)
    .bind(record.id)
    .bind(record.user_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Delete a handling record owned by `user_id`. Returns false when no such
/// record exists for that owner.
pub async fn delete_handling_record(
    pool: &SqlitePool,
    user_id: i64,
    id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM handling_records WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Look up a handling record by its natural key. When several rows share
/// the key, the oldest one wins.
pub async fn find_by_owner_and_key(
    conn: &mut SqliteConnection,
    user_id: i64,
    machine: &str,
) -> Result<Option<HandlingRecord>, sqlx::Error> {
    sqlx::query_as::<_, HandlingRecord>(
        "SELECT * FROM handling_records WHERE user_id = ? AND machine = ? ORDER BY id ASC LIMIT 1",
    )
    .bind(user_id)
    .bind(machine)
    .fetch_optional(conn)
    .await
}

/// Get-or-create by (owner, machine identifier).
///
/// An existing row is returned unchanged; the payload's other fields are only
/// used when a new row has to be inserted. The boolean is true on insert.
pub async fn upsert_by_key(
    conn: &mut SqliteConnection,
    user_id: i64,
    machine: &str,
    payload: HandlingRecordPayload,
) -> Result<(HandlingRecord, bool), sqlx::Error> {
    if let Some(existing) = find_by_owner_and_key(&mut *conn, user_id, machine).await? {
        return Ok((existing, false));
    }

    let payload = HandlingRecordPayload {
        machine: Some(machine.to_string()),
        ..payload
    };
    let created = create_handling_record(conn, user_id, payload).await?;
    Ok((created, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_pool, seed_user};

    #[test]
    fn test_payload_reads_wire_names_and_ignores_owner() {
        let payload: HandlingRecordPayload = serde_json::from_str(
            r#"{"Tomay": "H1", "Noidung_xuly": "Cắt máy cắt", "user": 99, "id": 5}"#,
        )
        .unwrap();
        assert_eq!(payload.machine.as_deref(), Some("H1"));
        assert_eq!(payload.content.as_deref(), Some("Cắt máy cắt"));
        assert!(payload.handled_at.is_none());
    }

    #[test]
    fn test_apply_only_touches_present_fields() {
        let mut record = HandlingRecord::draft(1, HandlingRecordPayload::for_machine("H2"));
        record.status = "open".to_string();

        let patch: HandlingRecordPayload = serde_json::from_str(
            r#"{"Tomay": "H1", "Quatrinh_kiemtra": "Theo dõi", "Thoigian_xuly": "2025-05-24T12:00:00Z"}"#,
        )
        .unwrap();
        record.apply(patch);

        assert_eq!(record.machine, "H1");
        assert_eq!(record.inspection_process, "Theo dõi");
        assert_eq!(record.status, "open");
        assert!(record.handled_at.is_some());

        let clear: HandlingRecordPayload =
            serde_json::from_str(r#"{"Thoigian_xuly": null}"#).unwrap();
        record.apply(clear);
        assert!(record.handled_at.is_none());
    }

    #[test]
    fn test_payload_reads_offsetless_timestamp_as_utc() {
        let payload: HandlingRecordPayload =
            serde_json::from_str(r#"{"Thoigian_xuly": "2025-05-24T12:00:00"}"#).unwrap();
        let expected = DateTime::parse_from_rfc3339("2025-05-24T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(payload.handled_at, Some(Some(expected)));

        let bad: Result<HandlingRecordPayload, _> =
            serde_json::from_str(r#"{"Thoigian_xuly": "yesterday"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_response_uses_wire_names() {
        let record = HandlingRecord::draft(1, HandlingRecordPayload::for_machine("H1"));
        let json = serde_json::to_value(HandlingRecordResponse::from(record)).unwrap();
        assert_eq!(json["Tomay"], "H1");
        assert!(json.get("user_id").is_none());
        assert!(json.get("Cavanhanh_ghinhan").is_some());
    }

    #[tokio::test]
    async fn test_list_is_scoped_and_ordered_by_machine_desc() {
        let pool = memory_pool().await;
        let alice = seed_user(&pool, "alice@example.com").await;
        let bob = seed_user(&pool, "bob@example.com").await;

        let mut conn = pool.acquire().await.unwrap();
        for machine in ["H1", "H3", "H2"] {
            create_handling_record(&mut conn, alice.id, HandlingRecordPayload::for_machine(machine))
                .await
                .unwrap();
        }
        create_handling_record(&mut conn, bob.id, HandlingRecordPayload::for_machine("H9"))
            .await
            .unwrap();
        drop(conn);

        let machines: Vec<String> = list_handling_records(&pool, alice.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.machine)
            .collect();
        assert_eq!(machines, vec!["H3", "H2", "H1"]);
    }

    #[tokio::test]
    async fn test_upsert_by_key_is_idempotent_per_owner() {
        let pool = memory_pool().await;
        let alice = seed_user(&pool, "alice@example.com").await;
        let bob = seed_user(&pool, "bob@example.com").await;
        let mut conn = pool.acquire().await.unwrap();

        let first = HandlingRecordPayload {
            content: Some("first".to_string()),
            ..HandlingRecordPayload::for_machine("Indian")
        };
        let (created, inserted) = upsert_by_key(&mut conn, alice.id, "Indian", first)
            .await
            .unwrap();
        assert!(inserted);
        assert_eq!(created.content, "first");

        let second = HandlingRecordPayload {
            content: Some("second".to_string()),
            ..HandlingRecordPayload::for_machine("Indian")
        };
        let (found, inserted) = upsert_by_key(&mut conn, alice.id, "Indian", second)
            .await
            .unwrap();
        assert!(!inserted);
        assert_eq!(found.id, created.id);
        assert_eq!(found.content, "first");

        let (other, inserted) =
            upsert_by_key(&mut conn, bob.id, "Indian", HandlingRecordPayload::default())
                .await
                .unwrap();
        assert!(inserted);
        assert_ne!(other.id, created.id);
        assert_eq!(other.user_id, bob.id);
    }

    #[tokio::test]
    async fn test_find_by_key_prefers_oldest_duplicate() {
        let pool = memory_pool().await;
        let alice = seed_user(&pool, "alice@example.com").await;
        let mut conn = pool.acquire().await.unwrap();

        let older = create_handling_record(&mut conn, alice.id, HandlingRecordPayload::for_machine("M"))
            .await
            .unwrap();
        create_handling_record(&mut conn, alice.id, HandlingRecordPayload::for_machine("M"))
            .await
            .unwrap();

        let found = find_by_owner_and_key(&mut conn, alice.id, "M").await.unwrap().unwrap();
        assert_eq!(found.id, older.id);
    }

    #[tokio::test]
    async fn test_delete_and_save_respect_ownership() {
        let pool = memory_pool().await;
        let alice = seed_user(&pool, "alice@example.com").await;
        let bob = seed_user(&pool, "bob@example.com").await;
        let mut conn = pool.acquire().await.unwrap();

        let mut record =
            create_handling_record(&mut conn, alice.id, HandlingRecordPayload::for_machine("H2"))
                .await
                .unwrap();
        assert!(get_handling_record(&mut conn, bob.id, record.id).await.unwrap().is_none());

        record.apply(HandlingRecordPayload::for_machine("H1"));
        save_handling_record(&mut conn, &record).await.unwrap();
        let reloaded = get_handling_record(&mut conn, alice.id, record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.machine, "H1");
        drop(conn);

        assert!(!delete_handling_record(&pool, bob.id, record.id).await.unwrap());
        assert!(delete_handling_record(&pool, alice.id, record.id).await.unwrap());
        assert!(list_handling_records(&pool, alice.id).await.unwrap().is_empty());
    }
}
