use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The two timetabled event kinds attendance is recorded against.
///
/// Meeting and training ids live in separate numeric namespaces; every
/// record and every request carries the kind alongside the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Meeting,
    Training,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Meeting => "meeting",
            EventKind::Training => "training",
        }
    }

    pub fn parse(raw: &str) -> Option<EventKind> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "meeting" => Some(EventKind::Meeting),
            "training" => Some(EventKind::Training),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved event row. The variant carries the fields that define its
/// roster; presentation fields (venue, trainer, subject) ride along for
/// catalog output.
#[derive(Debug, Clone)]
pub enum Event {
    Meeting {
        id: i64,
        date: String,
        start_time: String,
        end_time: String,
        subject: String,
        venue: Option<String>,
        year: i64,
        semester: i64,
        section: String,
        department_id: i64,
        faculty_id: i64,
    },
    Training {
        id: i64,
        date: String,
        start_time: String,
        end_time: String,
        topic: String,
        venue: Option<String>,
        batch_id: i64,
        department_id: i64,
        trainer_name: String,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Meeting { .. } => EventKind::Meeting,
            Event::Training { .. } => EventKind::Training,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Event::Meeting { id, .. } | Event::Training { id, .. } => *id,
        }
    }
}

/// Closed attendance status domain. Any status may overwrite any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Present,
    Absent,
    Late,
    Excused,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Present => "present",
            Status::Absent => "absent",
            Status::Late => "late",
            Status::Excused => "excused",
        }
    }

    pub fn parse(raw: &str) -> Result<Status, CoreError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Status::Present),
            "absent" => Ok(Status::Absent),
            "late" => Ok(Status::Late),
            "excused" => Ok(Status::Excused),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    Faculty,
    Admin,
}

impl ActorRole {
    pub fn parse(raw: &str) -> Option<ActorRole> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "faculty" => Some(ActorRole::Faculty),
            "admin" => Some(ActorRole::Admin),
            _ => None,
        }
    }
}

/// Authenticated actor identity, supplied per request by the portal shell.
/// The engine trusts it verbatim and never mutates it.
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub actor_id: i64,
    pub role: ActorRole,
    pub department_id: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub roll_number: String,
    pub register_number: String,
    pub name: String,
    pub department_id: i64,
    pub section: String,
    pub batch_id: Option<i64>,
    pub year_of_study: i64,
}

/// Why a scanned/typed roll number was rejected for an event, with the
/// event's defining attributes so the operator can diagnose a bad scan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RosterMismatch {
    #[serde(rename_all = "camelCase")]
    Meeting {
        expected_department_id: i64,
        expected_section: String,
        expected_year: i64,
        student_department_id: i64,
        student_section: String,
        student_year: i64,
    },
    #[serde(rename_all = "camelCase")]
    Training {
        batch_id: i64,
        membership_inactive: bool,
    },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("student not found: {0}")]
    StudentNotFound(String),
    #[error("{kind} {id} not found")]
    EventNotFound { kind: EventKind, id: i64 },
    #[error("student {roll_number} is not on this roster")]
    NotAMember {
        student_id: i64,
        roll_number: String,
        mismatch: RosterMismatch,
    },
    #[error("invalid attendance status: {0}")]
    InvalidStatus(String),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}
