//! Event log (nhat ky su kien) models and queries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::HashMap;

use super::common::{assign, deserialize_some};
use super::handling_record::{HandlingRecord, HandlingRecordPayload, HandlingRecordResponse};

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct EventLog {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub incident_date: Option<NaiveDate>,
    pub affected_system: String,
    pub observed_phenomenon: String,
    pub inspection_process: String,
    pub correction_type: String,
    pub leadership_report: String,
    pub proposal: String,
    pub operating_shift: String,
    pub remediation_unit: String,
}

/// Event log with its handling records, as returned by list and detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogResponse {
    pub id: i64,
    pub title: String,
    #[serde(rename = "Thoigian")]
    pub incident_date: Option<NaiveDate>,
    #[serde(rename = "Hethong_Thietbi")]
    pub affected_system: String,
    #[serde(rename = "Hientuong_Dienbien")]
    pub observed_phenomenon: String,
    #[serde(rename = "Quatrinh_Kt")]
    pub inspection_process: String,
    #[serde(rename = "LoaiSc")]
    pub correction_type: String,
    #[serde(rename = "Baocao_Chidao")]
    pub leadership_report: String,
    #[serde(rename = "DeNghi")]
    pub proposal: String,
    #[serde(rename = "CaVanHanh")]
    pub operating_shift: String,
    #[serde(rename = "Donvi_khacPhuc")]
    pub remediation_unit: String,
    pub xulysukientbs: Vec<HandlingRecordResponse>,
}

impl EventLogResponse {
    pub fn new(log: EventLog, records: Vec<HandlingRecord>) -> Self {
        Self {
            id: log.id,
            title: log.title,
            incident_date: log.incident_date,
            affected_system: log.affected_system,
            observed_phenomenon: log.observed_phenomenon,
            inspection_process: log.inspection_process,
            correction_type: log.correction_type,
            leadership_report: log.leadership_report,
            proposal: log.proposal,
            operating_shift: log.operating_shift,
            remediation_unit: log.remediation_unit,
            xulysukientbs: records.into_iter().map(HandlingRecordResponse::from).collect(),
        }
    }
}

/// Incoming event log fields for create, PUT and PATCH.
///
/// `xulysukientbs` keeps the absent/present distinction: `None` leaves the
/// association set alone on update, `Some(vec![])` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventLogPayload {
    pub title: Option<String>,
    #[serde(rename = "Thoigian", default, deserialize_with = "deserialize_some")]
    pub incident_date: Option<Option<NaiveDate>>,
    #[serde(rename = "Hethong_Thietbi")]
    pub affected_system: Option<String>,
    #[serde(rename = "Hientuong_Dienbien")]
    pub observed_phenomenon: Option<String>,
    #[serde(rename = "Quatrinh_Kt")]
    pub inspection_process: Option<String>,
    #[serde(rename = "LoaiSc")]
    pub correction_type: Option<String>,
    #[serde(rename = "Baocao_Chidao")]
    pub leadership_report: Option<String>,
    #[serde(rename = "DeNghi")]
    pub proposal: Option<String>,
    #[serde(rename = "CaVanHanh")]
    pub operating_shift: Option<String>,
    #[serde(rename = "Donvi_khacPhuc")]
    pub remediation_unit: Option<String>,
    pub xulysukientbs: Option<Vec<HandlingRecordPayload>>,
}

impl EventLog {
    /// Copy every scalar field present in the payload onto this log.
    /// The owner and the handling record set are not touched here.
    pub fn apply(&mut self, payload: &EventLogPayload) {
        assign(&mut self.title, payload.title.clone());
        assign(&mut self.incident_date, payload.incident_date);
        assign(&mut self.affected_system, payload.affected_system.clone());
        assign(&mut self.observed_phenomenon, payload.observed_phenomenon.clone());
        assign(&mut self.inspection_process, payload.inspection_process.clone());
        assign(&mut self.correction_type, payload.correction_type.clone());
        assign(&mut self.leadership_report, payload.leadership_report.clone());
        assign(&mut self.proposal, payload.proposal.clone());
        assign(&mut self.operating_shift, payload.operating_shift.clone());
        assign(&mut self.remediation_unit, payload.remediation_unit.clone());
    }

    fn draft(user_id: i64, payload: &EventLogPayload) -> Self {
        let mut log = Self {
            id: 0,
            user_id,
            title: String::new(),
            incident_date: None,
            affected_system: String::new(),
            observed_phenomenon: String::new(),
            inspection_process: String::new(),
            correction_type: String::new(),
            leadership_report: String::new(),
            proposal: String::new(),
            operating_shift: String::new(),
            remediation_unit: String::new(),
        };
        log.apply(payload);
        log
    }
}

/// Row of the link table joined with its handling record
#[derive(Debug, FromRow)]
struct LinkedHandlingRecord {
    event_log_id: i64,
    #[sqlx(flatten)]
    record: HandlingRecord,
}

/// All event logs of one owner, newest id first.
pub async fn list_event_logs(pool: &SqlitePool, user_id: i64) -> Result<Vec<EventLog>, sqlx::Error> {
    sqlx::query_as::<_, EventLog>("SELECT * FROM event_logs WHERE user_id = ? ORDER BY id DESC")
        .bind(user_id)
        .fetch_all(pool)
        .await
}

/// Handling records of every event log owned by `user_id`, keyed by event log.
pub async fn handling_records_by_event_log(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<HashMap<i64, Vec<HandlingRecord>>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LinkedHandlingRecord>(
        r#"
        SELECT l.event_log_id, h.*
        FROM event_log_handling_records l
        JOIN event_logs e ON e.id = l.event_log_id
        JOIN handling_records h ON h.id = l.handling_record_id
        WHERE e.user_id = ?
        ORDER BY l.event_log_id, h.id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<i64, Vec<HandlingRecord>> = HashMap::new();
    for row in rows {
        grouped.entry(row.event_log_id).or_default().push(row.record);
    }
    Ok(grouped)
}

/// Fetch an event log only if it belongs to `user_id`.
pub async fn get_event_log(
    conn: &mut SqliteConnection,
    user_id: i64,
    id: i64,
) -> Result<Option<EventLog>, sqlx::Error> {
    sqlx::query_as::<_, EventLog>("SELECT * FROM event_logs WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .fetch_optional(conn)
        .await
}

/// Handling records currently linked to one event log, by id.
pub async fn handling_records_for(
    conn: &mut SqliteConnection,
    event_log_id: i64,
) -> Result<Vec<HandlingRecord>, sqlx::Error> {
    sqlx::query_as::<_, HandlingRecord>(
        r#"
        SELECT h.*
        FROM handling_records h
        JOIN event_log_handling_records l ON l.handling_record_id = h.id
        WHERE l.event_log_id = ?
        ORDER BY h.id
        "#,
    )
    .bind(event_log_id)
    .fetch_all(conn)
    .await
}

/// Insert the scalar part of a new event log owned by `user_id`.
pub async fn insert_event_log(
    conn: &mut SqliteConnection,
    user_id: i64,
    payload: &EventLogPayload,
) -> Result<EventLog, sqlx::Error> {
    let draft = EventLog::draft(user_id, payload);

    let id = sqlx::query(
        r#"
        INSERT INTO event_logs (
            user_id, title, incident_date, affected_system, observed_phenomenon,
            inspection_process, correction_type, leadership_report, proposal,
            operating_shift, remediation_unit
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(draft.user_id)
    .bind(&draft.title)
    .bind(draft.incident_date)
    .bind(&draft.affected_system)
    .bind(&draft.observed_phenomenon)
    .bind(&draft.inspection_process)
    .bind(&draft.correction_type)
    .bind(&draft.leadership_report)
    .bind(&draft.proposal)
    .bind(&draft.operating_shift)
    .bind(&draft.remediation_unit)
    .execute(conn)
    .await?
    .last_insert_rowid();

    Ok(EventLog { id, ..draft })
}

/// Persist the scalar columns of `log`. `user_id` is only used to scope the
/// row and is never written.
pub async fn save_event_log(conn: &mut SqliteConnection, log: &EventLog) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE event_logs SET
            title = ?, incident_date = ?, affected_system = ?, observed_phenomenon = ?,
            inspection_process = ?, correction_type = ?, leadership_report = ?,
            proposal = ?, operating_shift = ?, remediation_unit = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(&log.title)
    .bind(log.incident_date)
    .bind(&log.affected_system)
    .bind(&log.observed_phenomenon)
    .bind(&log.inspection_process)
    .bind(&log.correction_type)
    .bind(&log.leadership_report)
    .bind(&log.proposal)
    .bind(&log.operating_shift)
    .bind(&log.remediation_unit)
    .bind(log.id)
    .bind(log.user_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Delete an event log owned by `user_id`. Its links go with it; the linked
/// handling records stay.
pub async fn delete_event_log(pool: &SqlitePool, user_id: i64, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM event_logs WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
