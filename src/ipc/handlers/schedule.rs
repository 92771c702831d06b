use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    get_opt_str, get_required_i64, get_required_str, parse_actor, parse_event_ref, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Event, EventKind};
use crate::schedule;
use rusqlite::Connection;
use serde_json::json;

fn add_meeting(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = get_required_str(params, "date")?;
    let start_time = get_required_str(params, "startTime")?;
    let end_time = get_required_str(params, "endTime")?;
    let subject = get_required_str(params, "subject")?;
    let venue = get_opt_str(params, "venue");
    let year = get_required_i64(params, "year")?;
    let semester = get_required_i64(params, "semester")?;
    let section = get_required_str(params, "section")?;
    let department_id = get_required_i64(params, "departmentId")?;
    let faculty_id = get_required_i64(params, "facultyId")?;

    conn.execute(
        "INSERT INTO academic_meetings(date, start_time, end_time, subject, venue,
                                       year, semester, section, department_id, faculty_id)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &date,
            &start_time,
            &end_time,
            &subject,
            &venue,
            year,
            semester,
            &section,
            department_id,
            faculty_id,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "academic_meetings" })),
    })?;
    Ok(json!({ "eventKind": "meeting", "eventId": conn.last_insert_rowid() }))
}

fn add_training(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = get_required_str(params, "date")?;
    let start_time = get_required_str(params, "startTime")?;
    let end_time = get_required_str(params, "endTime")?;
    let topic = get_required_str(params, "topic")?;
    let venue = get_opt_str(params, "venue");
    let batch_id = get_required_i64(params, "batchId")?;
    let department_id = get_required_i64(params, "departmentId")?;
    let trainer_name = get_required_str(params, "trainerName")?;

    conn.execute(
        "INSERT INTO training_sessions(date, start_time, end_time, topic, venue,
                                       batch_id, department_id, trainer_name)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &date,
            &start_time,
            &end_time,
            &topic,
            &venue,
            batch_id,
            department_id,
            &trainer_name,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "training_sessions" })),
    })?;
    Ok(json!({ "eventKind": "training", "eventId": conn.last_insert_rowid() }))
}

fn cancel_event(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (kind, id) = parse_event_ref(params)?;
    let table = match kind {
        EventKind::Meeting => "academic_meetings",
        EventKind::Training => "training_sessions",
    };
    let changed = conn
        .execute(
            &format!("UPDATE {table} SET cancelled = 1 WHERE id = ?"),
            [id],
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": table })),
        })?;
    if changed == 0 {
        return Err(HandlerErr {
            code: "not_found",
            message: format!("{} {} not found", kind, id),
            details: Some(json!({ "eventKind": kind.as_str(), "eventId": id })),
        });
    }
    Ok(json!({ "eventKind": kind.as_str(), "eventId": id, "cancelled": true }))
}

fn event_json(event: &Event) -> serde_json::Value {
    match event {
        Event::Meeting {
            id,
            date,
            start_time,
            end_time,
            subject,
            venue,
            year,
            semester,
            section,
            department_id,
            faculty_id,
        } => json!({
            "eventKind": "meeting",
            "eventId": id,
            "date": date,
            "startTime": start_time,
            "endTime": end_time,
            "subject": subject,
            "venue": venue,
            "year": year,
            "semester": semester,
            "section": section,
            "departmentId": department_id,
            "facultyId": faculty_id,
        }),
        Event::Training {
            id,
            date,
            start_time,
            end_time,
            topic,
            venue,
            batch_id,
            department_id,
            trainer_name,
        } => json!({
            "eventKind": "training",
            "eventId": id,
            "date": date,
            "startTime": start_time,
            "endTime": end_time,
            "topic": topic,
            "venue": venue,
            "batchId": batch_id,
            "departmentId": department_id,
            "trainerName": trainer_name,
        }),
    }
}

fn resolve_date(params: &serde_json::Value) -> String {
    get_opt_str(params, "date").unwrap_or_else(|| chrono::Local::now().date_naive().to_string())
}

fn list_today(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let actor = parse_actor(params)?;
    let date = resolve_date(params);
    let events = schedule::list_today(conn, &actor, &date)?;
    let events_json: Vec<serde_json::Value> = events.iter().map(event_json).collect();
    Ok(json!({ "date": date, "events": events_json }))
}

fn day_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let actor = parse_actor(params)?;
    let date = resolve_date(params);
    let summaries = schedule::day_summary(conn, &actor, &date)?;
    let summaries_json = serde_json::to_value(&summaries).map_err(|e| HandlerErr {
        code: "internal",
        message: e.to_string(),
        details: None,
    })?;
    Ok(json!({ "date": date, "events": summaries_json }))
}

fn dispatch(
    state: &mut AppState,
    req: &Request,
    f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.addMeeting" => Some(dispatch(state, req, add_meeting)),
        "schedule.addTraining" => Some(dispatch(state, req, add_training)),
        "schedule.cancel" => Some(dispatch(state, req, cancel_event)),
        "schedule.listToday" => Some(dispatch(state, req, list_today)),
        "schedule.daySummary" => Some(dispatch(state, req, day_summary)),
        _ => None,
    }
}
