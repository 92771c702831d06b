use crate::model::{ActorContext, ActorRole, CoreError, Event};
use crate::roster;
use chrono::NaiveTime;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

/// Merged catalog of one actor's day: meetings the actor teaches (admins
/// see the whole department) plus the department's training sessions.
/// Cancelled events are not candidates for attendance and never appear.
pub fn list_today(
    conn: &Connection,
    actor: &ActorContext,
    date: &str,
) -> Result<Vec<Event>, CoreError> {
    let mut events: Vec<Event> = Vec::new();

    let meeting_sql = match actor.role {
        ActorRole::Faculty => {
            "SELECT id, date, start_time, end_time, subject, venue,
                    year, semester, section, department_id, faculty_id
             FROM academic_meetings
             WHERE date = ? AND cancelled = 0 AND faculty_id = ?
             ORDER BY id"
        }
        ActorRole::Admin => {
            "SELECT id, date, start_time, end_time, subject, venue,
                    year, semester, section, department_id, faculty_id
             FROM academic_meetings
             WHERE date = ? AND cancelled = 0 AND department_id = ?
             ORDER BY id"
        }
    };
    let scope_id = match actor.role {
        ActorRole::Faculty => actor.actor_id,
        ActorRole::Admin => actor.department_id,
    };
    let mut stmt = conn.prepare(meeting_sql)?;
    let meetings = stmt
        .query_map((date, scope_id), |r| {
            Ok(Event::Meeting {
                id: r.get(0)?,
                date: r.get(1)?,
                start_time: r.get(2)?,
                end_time: r.get(3)?,
                subject: r.get(4)?,
                venue: r.get(5)?,
                year: r.get(6)?,
                semester: r.get(7)?,
                section: r.get(8)?,
                department_id: r.get(9)?,
                faculty_id: r.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    events.extend(meetings);

    let mut stmt = conn.prepare(
        "SELECT id, date, start_time, end_time, topic, venue,
                batch_id, department_id, trainer_name
         FROM training_sessions
         WHERE date = ? AND cancelled = 0 AND department_id = ?
         ORDER BY id",
    )?;
    let trainings = stmt
        .query_map((date, actor.department_id), |r| {
            Ok(Event::Training {
                id: r.get(0)?,
                date: r.get(1)?,
                start_time: r.get(2)?,
                end_time: r.get(3)?,
                topic: r.get(4)?,
                venue: r.get(5)?,
                batch_id: r.get(6)?,
                department_id: r.get(7)?,
                trainer_name: r.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    events.extend(trainings);

    // Stable sort: equal start times keep merge order (meetings first, each
    // table in primary-key order), so the catalog is deterministic.
    events.sort_by_key(|e| parse_start_time(event_start(e)));
    Ok(events)
}

fn event_start(event: &Event) -> &str {
    match event {
        Event::Meeting { start_time, .. } | Event::Training { start_time, .. } => start_time,
    }
}

fn parse_start_time(raw: &str) -> NaiveTime {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub event_kind: &'static str,
    pub event_id: i64,
    pub title: String,
    pub start_time: String,
    pub roster_size: usize,
    pub marked_count: usize,
    pub present_count: usize,
    pub percent_present: f64,
}

/// Per-event counts across the actor's day. The roster denominator is
/// re-resolved at summary time, so a roster change shifts past percentages
/// with it.
pub fn day_summary(
    conn: &Connection,
    actor: &ActorContext,
    date: &str,
) -> Result<Vec<EventSummary>, CoreError> {
    let events = list_today(conn, actor, date)?;
    let mut summaries = Vec::with_capacity(events.len());
    for event in &events {
        let members = roster::resolve(conn, event)?;

        let mut stmt = conn.prepare(
            "SELECT student_id, status FROM attendance_records
             WHERE event_kind = ? AND event_id = ?",
        )?;
        let by_student: HashMap<i64, String> = stmt
            .query_map((event.kind().as_str(), event.id()), |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;

        let mut marked = 0usize;
        let mut present = 0usize;
        for member in &members {
            if let Some(status) = by_student.get(&member.id) {
                marked += 1;
                if status == "present" {
                    present += 1;
                }
            }
        }
        let percent_present = if members.is_empty() {
            0.0
        } else {
            present as f64 * 100.0 / members.len() as f64
        };

        let title = match event {
            Event::Meeting { subject, .. } => subject.clone(),
            Event::Training { topic, .. } => topic.clone(),
        };
        summaries.push(EventSummary {
            event_kind: event.kind().as_str(),
            event_id: event.id(),
            title,
            start_time: event_start(event).to_string(),
            roster_size: members.len(),
            marked_count: marked,
            present_count: present,
            percent_present,
        });
    }
    Ok(summaries)
}
