use crate::ipc::error::err;
use crate::model::{ActorContext, ActorRole, CoreError, EventKind};
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }
}

impl From<CoreError> for HandlerErr {
    fn from(e: CoreError) -> HandlerErr {
        match e {
            CoreError::StudentNotFound(which) => HandlerErr {
                code: "not_found",
                message: format!("student not found: {}", which),
                details: Some(json!({ "student": which })),
            },
            CoreError::EventNotFound { kind, id } => HandlerErr {
                code: "not_found",
                message: format!("{} {} not found", kind, id),
                details: Some(json!({ "eventKind": kind.as_str(), "eventId": id })),
            },
            CoreError::NotAMember {
                student_id,
                roll_number,
                mismatch,
            } => HandlerErr {
                code: "not_a_member",
                message: format!("student {} is not on this roster", roll_number),
                details: Some(json!({
                    "studentId": student_id,
                    "rollNumber": roll_number,
                    "mismatch": serde_json::to_value(&mismatch).unwrap_or_default(),
                })),
            },
            CoreError::InvalidStatus(raw) => HandlerErr {
                code: "invalid_status",
                message: format!("invalid attendance status: {}", raw),
                details: Some(json!({ "status": raw })),
            },
            CoreError::Db(db_err) => HandlerErr {
                code: "db_query_failed",
                message: db_err.to_string(),
                details: None,
            },
        }
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn get_opt_i64(params: &serde_json::Value, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.as_i64())
}

/// The authenticated actor, as `params.actor`. Supplied by the portal
/// shell; the engine trusts it verbatim.
pub fn parse_actor(params: &serde_json::Value) -> Result<ActorContext, HandlerErr> {
    let actor = params
        .get("actor")
        .ok_or_else(|| HandlerErr::bad_params("missing actor"))?;
    let actor_id = get_required_i64(actor, "actorId")?;
    let role_raw = get_required_str(actor, "role")?;
    let role = ActorRole::parse(&role_raw)
        .ok_or_else(|| HandlerErr::bad_params("actor.role must be faculty or admin"))?;
    let department_id = get_required_i64(actor, "departmentId")?;
    Ok(ActorContext {
        actor_id,
        role,
        department_id,
    })
}

/// An event reference is always (kind, id); the two id namespaces are not
/// comparable without the kind.
pub fn parse_event_ref(params: &serde_json::Value) -> Result<(EventKind, i64), HandlerErr> {
    let kind_raw = get_required_str(params, "eventKind")?;
    let kind = EventKind::parse(&kind_raw)
        .ok_or_else(|| HandlerErr::bad_params("eventKind must be meeting or training"))?;
    let id = get_required_i64(params, "eventId")?;
    Ok((kind, id))
}
