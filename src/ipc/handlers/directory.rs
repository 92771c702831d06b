use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    get_opt_i64, get_required_i64, get_required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn add_department(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    conn.execute("INSERT INTO departments(name) VALUES(?)", [&name])
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "departments" })),
        })?;
    Ok(json!({ "departmentId": conn.last_insert_rowid(), "name": name }))
}

fn add_faculty(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let department_id = get_required_i64(params, "departmentId")?;
    require_department(conn, department_id)?;
    conn.execute(
        "INSERT INTO faculty(name, department_id) VALUES(?, ?)",
        (&name, department_id),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "faculty" })),
    })?;
    Ok(json!({ "facultyId": conn.last_insert_rowid() }))
}

fn add_batch(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let department_id = get_required_i64(params, "departmentId")?;
    require_department(conn, department_id)?;
    conn.execute(
        "INSERT INTO training_batches(name, department_id) VALUES(?, ?)",
        (&name, department_id),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "training_batches" })),
    })?;
    Ok(json!({ "batchId": conn.last_insert_rowid() }))
}

fn add_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let roll_number = get_required_str(params, "rollNumber")?;
    let register_number = get_required_str(params, "registerNumber")?;
    let name = get_required_str(params, "name")?;
    let department_id = get_required_i64(params, "departmentId")?;
    let section = get_required_str(params, "section")?;
    let year_of_study = get_required_i64(params, "yearOfStudy")?;
    let batch_id = get_opt_i64(params, "batchId");

    let roll_number = roll_number.trim().to_string();
    if roll_number.is_empty() {
        return Err(HandlerErr::bad_params("rollNumber must not be empty"));
    }
    require_department(conn, department_id)?;

    conn.execute(
        "INSERT INTO students(roll_number, register_number, name, department_id,
                              section, batch_id, year_of_study)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &roll_number,
            &register_number,
            &name,
            department_id,
            &section,
            batch_id,
            year_of_study,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students", "rollNumber": roll_number })),
    })?;
    let student_id = conn.last_insert_rowid();

    // A student created with a batch starts as an active member of it.
    if let Some(batch_id) = batch_id {
        conn.execute(
            "INSERT INTO batch_members(batch_id, student_id, active) VALUES(?, ?, 1)
             ON CONFLICT(batch_id, student_id) DO UPDATE SET active = 1",
            (batch_id, student_id),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "batch_members" })),
        })?;
    }

    Ok(json!({ "studentId": student_id, "rollNumber": roll_number }))
}

fn set_batch_membership(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let batch_id = get_required_i64(params, "batchId")?;
    let student_id = get_required_i64(params, "studentId")?;
    let active = params
        .get("active")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params("missing active"))?;

    let batch_exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM training_batches WHERE id = ?",
            [batch_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(db_query_failed)?;
    if batch_exists.is_none() {
        return Err(HandlerErr {
            code: "not_found",
            message: "batch not found".to_string(),
            details: Some(json!({ "batchId": batch_id })),
        });
    }
    let student_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(db_query_failed)?;
    if student_exists.is_none() {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: Some(json!({ "studentId": student_id })),
        });
    }

    conn.execute(
        "INSERT INTO batch_members(batch_id, student_id, active) VALUES(?, ?, ?)
         ON CONFLICT(batch_id, student_id) DO UPDATE SET active = excluded.active",
        (batch_id, student_id, active as i64),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "batch_members" })),
    })?;
    Ok(json!({ "batchId": batch_id, "studentId": student_id, "active": active }))
}

fn require_department(conn: &Connection, department_id: i64) -> Result<(), HandlerErr> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM departments WHERE id = ?",
            [department_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(db_query_failed)?;
    if exists.is_none() {
        return Err(HandlerErr {
            code: "not_found",
            message: "department not found".to_string(),
            details: Some(json!({ "departmentId": department_id })),
        });
    }
    Ok(())
}

fn db_query_failed(e: rusqlite::Error) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
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
        "directory.addDepartment" => Some(dispatch(state, req, add_department)),
        "directory.addFaculty" => Some(dispatch(state, req, add_faculty)),
        "directory.addBatch" => Some(dispatch(state, req, add_batch)),
        "directory.addStudent" => Some(dispatch(state, req, add_student)),
        "directory.setBatchMembership" => Some(dispatch(state, req, set_batch_membership)),
        _ => None,
    }
}
