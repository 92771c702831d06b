use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    get_opt_i64, get_opt_str, get_required_str, parse_actor, parse_event_ref, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{CoreError, Status};
use crate::projection::{self, SortDir, SortKey};
use crate::roster;
use crate::store::{self, UpdateScope};
use rusqlite::Connection;
use serde_json::json;

fn roster_page(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (kind, id) = parse_event_ref(params)?;
    let event = roster::fetch_event(conn, kind, id)?;

    let sort_key = SortKey::resolve(params.get("sortKey").and_then(|v| v.as_str()));
    let sort_dir = SortDir::resolve(params.get("sortDir").and_then(|v| v.as_str()));
    let page_number = get_opt_i64(params, "page").unwrap_or(1);
    let page_size = get_opt_i64(params, "pageSize");

    let page = projection::page(conn, &event, sort_key, sort_dir, page_number, page_size)?;
    serde_json::to_value(&page).map_err(internal)
}

fn mark_one(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let actor = parse_actor(params)?;
    let (kind, id) = parse_event_ref(params)?;
    let roll_number = get_required_str(params, "rollNumber")?;
    let status = Status::parse(&get_required_str(params, "status")?)?;

    let event = roster::fetch_event(conn, kind, id)?;
    let student = roster::find_student_by_roll(conn, roll_number.trim())?
        .ok_or_else(|| CoreError::StudentNotFound(roll_number.trim().to_string()))?;
    let record = store::upsert_one(conn, &event, &student, status, &actor)?;
    Ok(json!({ "record": serde_json::to_value(&record).map_err(internal)? }))
}

fn bulk_set_default(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let actor = parse_actor(params)?;
    let (kind, id) = parse_event_ref(params)?;
    let status = Status::parse(&get_required_str(params, "status")?)?;

    let event = roster::fetch_event(conn, kind, id)?;
    let outcome = store::bulk_set_default(conn, &event, status, &actor)?;
    serde_json::to_value(&outcome).map_err(internal)
}

fn fill_missing(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let actor = parse_actor(params)?;
    let (kind, id) = parse_event_ref(params)?;
    // The materialized default mirrors the projection's read-time default.
    let status = match get_opt_str(params, "status") {
        Some(raw) => Status::parse(&raw)?,
        None => Status::Absent,
    };

    let event = roster::fetch_event(conn, kind, id)?;
    let outcome = store::fill_missing(conn, &event, &actor, status)?;
    serde_json::to_value(&outcome).map_err(internal)
}

fn update_many(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let actor = parse_actor(params)?;
    let (kind, id) = parse_event_ref(params)?;
    let scope_raw = get_required_str(params, "scope")?;
    let scope = UpdateScope::parse(&scope_raw)
        .ok_or_else(|| HandlerErr::bad_params("scope must be page or all"))?;

    let Some(marks_obj) = params.get("marks").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing marks"));
    };
    let mut marks: Vec<(i64, String)> = Vec::with_capacity(marks_obj.len());
    for (key, value) in marks_obj {
        let student_id: i64 = key
            .parse()
            .map_err(|_| HandlerErr::bad_params(format!("marks key is not a student id: {key}")))?;
        let Some(status_raw) = value.as_str() else {
            return Err(HandlerErr::bad_params(format!(
                "marks[{key}] must be a status string"
            )));
        };
        marks.push((student_id, status_raw.to_string()));
    }
    // Deterministic application order regardless of map iteration.
    marks.sort_by_key(|(student_id, _)| *student_id);

    let event = roster::fetch_event(conn, kind, id)?;
    let outcome = store::update_many(conn, &event, &marks, &actor, scope)?;
    serde_json::to_value(&outcome).map_err(internal)
}

fn internal(e: serde_json::Error) -> HandlerErr {
    HandlerErr {
        code: "internal",
        message: e.to_string(),
        details: None,
    }
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
        "attendance.rosterPage" => Some(dispatch(state, req, roster_page)),
        "attendance.markOne" => Some(dispatch(state, req, mark_one)),
        "attendance.bulkSetDefault" => Some(dispatch(state, req, bulk_set_default)),
        "attendance.fillMissing" => Some(dispatch(state, req, fill_missing)),
        "attendance.updateMany" => Some(dispatch(state, req, update_many)),
        _ => None,
    }
}
