use crate::model::{ActorContext, CoreError, Event, Status, Student};
use crate::roster;
use rusqlite::Connection;
use serde::Serialize;
use tracing::warn;

/// One failed row inside a bulk pass. Bulk operations never abort on a row;
/// they accumulate and report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub student_id: i64,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    pub affected_count: usize,
    pub errors: Vec<RowError>,
}

/// Which students a paged update was allowed to touch. The per-row write
/// path is identical either way; the caller sends only the ids it edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateScope {
    Page,
    All,
}

impl UpdateScope {
    pub fn parse(raw: &str) -> Option<UpdateScope> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "page" => Some(UpdateScope::Page),
            "all" => Some(UpdateScope::All),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateScope::Page => "page",
            UpdateScope::All => "all",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    pub student_id: i64,
    pub status: String,
    pub marked_by: i64,
    pub updated_at: String,
}

fn now_utc() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// The one write primitive. A single INSERT .. ON CONFLICT .. DO UPDATE
/// keyed on the record's composite primary key, so concurrent identical
/// calls cannot produce two rows and repeat calls are idempotent.
fn write_record(
    conn: &Connection,
    event: &Event,
    student_id: i64,
    status: Status,
    actor: &ActorContext,
) -> Result<RecordView, CoreError> {
    let updated_at = now_utc();
    conn.execute(
        "INSERT INTO attendance_records(student_id, event_kind, event_id, status, marked_by, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, event_kind, event_id) DO UPDATE SET
           status = excluded.status,
           marked_by = excluded.marked_by,
           updated_at = excluded.updated_at",
        (
            student_id,
            event.kind().as_str(),
            event.id(),
            status.as_str(),
            actor.actor_id,
            &updated_at,
        ),
    )?;
    Ok(RecordView {
        student_id,
        status: status.as_str().to_string(),
        marked_by: actor.actor_id,
        updated_at,
    })
}

/// Single-student upsert (scanner/manual entry path). Membership is
/// validated before the write, never after.
pub fn upsert_one(
    conn: &Connection,
    event: &Event,
    student: &Student,
    status: Status,
    actor: &ActorContext,
) -> Result<RecordView, CoreError> {
    roster::check_membership(conn, event, student)?;
    write_record(conn, event, student.id, status, actor)
}

/// Set every roster member's record to `status`, overwriting whatever was
/// there. This is a full overwrite, not a fill.
pub fn bulk_set_default(
    conn: &Connection,
    event: &Event,
    status: Status,
    actor: &ActorContext,
) -> Result<MutationOutcome, CoreError> {
    let members = roster::resolve(conn, event)?;
    let mut outcome = MutationOutcome::default();
    for student in &members {
        match write_record(conn, event, student.id, status, actor) {
            Ok(_) => outcome.affected_count += 1,
            Err(e) => {
                warn!(
                    student_id = student.id,
                    event_kind = event.kind().as_str(),
                    event_id = event.id(),
                    error = %e,
                    "bulk_set_default row failed"
                );
                outcome.errors.push(RowError {
                    student_id: student.id,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(outcome)
}

/// Insert `default` only for roster members with no record yet. Existing
/// records are never touched; the count reports actual inserts, and 0 is a
/// valid outcome.
pub fn fill_missing(
    conn: &Connection,
    event: &Event,
    actor: &ActorContext,
    default: Status,
) -> Result<MutationOutcome, CoreError> {
    let members = roster::resolve(conn, event)?;
    let mut outcome = MutationOutcome::default();
    for student in &members {
        let inserted = conn.execute(
            "INSERT INTO attendance_records(student_id, event_kind, event_id, status, marked_by, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, event_kind, event_id) DO NOTHING",
            (
                student.id,
                event.kind().as_str(),
                event.id(),
                default.as_str(),
                actor.actor_id,
                now_utc(),
            ),
        );
        match inserted {
            Ok(n) => outcome.affected_count += n,
            Err(e) => {
                warn!(
                    student_id = student.id,
                    event_kind = event.kind().as_str(),
                    event_id = event.id(),
                    error = %e,
                    "fill_missing row failed"
                );
                outcome.errors.push(RowError {
                    student_id: student.id,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(outcome)
}

/// Per-student overwrites for the ids in `marks`. Statuses are parsed per
/// row and membership is checked per row, so one bad entry costs only that
/// row; everything else proceeds.
pub fn update_many(
    conn: &Connection,
    event: &Event,
    marks: &[(i64, String)],
    actor: &ActorContext,
    scope: UpdateScope,
) -> Result<MutationOutcome, CoreError> {
    let mut outcome = MutationOutcome::default();
    for (student_id, raw_status) in marks {
        let result = apply_one(conn, event, *student_id, raw_status, actor);
        match result {
            Ok(_) => outcome.affected_count += 1,
            Err(e) => {
                warn!(
                    student_id = *student_id,
                    event_kind = event.kind().as_str(),
                    event_id = event.id(),
                    scope = scope.as_str(),
                    error = %e,
                    "update_many row failed"
                );
                outcome.errors.push(RowError {
                    student_id: *student_id,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(outcome)
}

fn apply_one(
    conn: &Connection,
    event: &Event,
    student_id: i64,
    raw_status: &str,
    actor: &ActorContext,
) -> Result<RecordView, CoreError> {
    let status = Status::parse(raw_status)?;
    let Some(student) = roster::find_student_by_id(conn, student_id)? else {
        return Err(CoreError::StudentNotFound(student_id.to_string()));
    };
    upsert_one(conn, event, &student, status, actor)
}
