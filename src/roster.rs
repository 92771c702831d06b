use crate::model::{CoreError, Event, EventKind, RosterMismatch, Student};
use rusqlite::{Connection, OptionalExtension, Row};

fn student_from_row(row: &Row) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        roll_number: row.get(1)?,
        register_number: row.get(2)?,
        name: row.get(3)?,
        department_id: row.get(4)?,
        section: row.get(5)?,
        batch_id: row.get(6)?,
        year_of_study: row.get(7)?,
    })
}

const STUDENT_COLS: &str =
    "id, roll_number, register_number, name, department_id, section, batch_id, year_of_study";

/// Load an event row by (kind, id). The two id namespaces are separate
/// tables, so the kind picks the table.
pub fn fetch_event(conn: &Connection, kind: EventKind, id: i64) -> Result<Event, CoreError> {
    let event = match kind {
        EventKind::Meeting => conn
            .query_row(
                "SELECT id, date, start_time, end_time, subject, venue,
                        year, semester, section, department_id, faculty_id
                 FROM academic_meetings WHERE id = ?",
                [id],
                |r| {
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
                },
            )
            .optional()?,
        EventKind::Training => conn
            .query_row(
                "SELECT id, date, start_time, end_time, topic, venue,
                        batch_id, department_id, trainer_name
                 FROM training_sessions WHERE id = ?",
                [id],
                |r| {
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
                },
            )
            .optional()?,
    };
    event.ok_or(CoreError::EventNotFound { kind, id })
}

/// Resolve the ordered roster for an event. Pure read of current table
/// state; membership is derived at call time, never cached.
pub fn resolve(conn: &Connection, event: &Event) -> Result<Vec<Student>, CoreError> {
    match event {
        Event::Meeting {
            department_id,
            section,
            year,
            ..
        } => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STUDENT_COLS} FROM students
                 WHERE department_id = ? AND section = ? AND year_of_study = ?
                 ORDER BY roll_number"
            ))?;
            let rows = stmt
                .query_map((department_id, section, year), student_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }
        Event::Training { batch_id, .. } => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STUDENT_COLS} FROM students
                 WHERE id IN (SELECT student_id FROM batch_members
                              WHERE batch_id = ? AND active = 1)
                 ORDER BY roll_number"
            ))?;
            let rows = stmt
                .query_map([batch_id], student_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }
    }
}

pub fn find_student_by_roll(
    conn: &Connection,
    roll_number: &str,
) -> Result<Option<Student>, CoreError> {
    let student = conn
        .query_row(
            &format!("SELECT {STUDENT_COLS} FROM students WHERE roll_number = ?"),
            [roll_number],
            student_from_row,
        )
        .optional()?;
    Ok(student)
}

pub fn find_student_by_id(conn: &Connection, id: i64) -> Result<Option<Student>, CoreError> {
    let student = conn
        .query_row(
            &format!("SELECT {STUDENT_COLS} FROM students WHERE id = ?"),
            [id],
            student_from_row,
        )
        .optional()?;
    Ok(student)
}

/// The single-entry predicate. Must decide exactly as `resolve` does for the
/// event's variant; the integration suite asserts the two never diverge.
pub fn check_membership(
    conn: &Connection,
    event: &Event,
    student: &Student,
) -> Result<(), CoreError> {
    match event {
        Event::Meeting {
            department_id,
            section,
            year,
            ..
        } => {
            if student.department_id == *department_id
                && student.section == *section
                && student.year_of_study == *year
            {
                Ok(())
            } else {
                Err(CoreError::NotAMember {
                    student_id: student.id,
                    roll_number: student.roll_number.clone(),
                    mismatch: RosterMismatch::Meeting {
                        expected_department_id: *department_id,
                        expected_section: section.clone(),
                        expected_year: *year,
                        student_department_id: student.department_id,
                        student_section: student.section.clone(),
                        student_year: student.year_of_study,
                    },
                })
            }
        }
        Event::Training { batch_id, .. } => {
            let active: Option<i64> = conn
                .query_row(
                    "SELECT active FROM batch_members WHERE batch_id = ? AND student_id = ?",
                    (batch_id, student.id),
                    |r| r.get(0),
                )
                .optional()?;
            match active {
                Some(a) if a != 0 => Ok(()),
                other => Err(CoreError::NotAMember {
                    student_id: student.id,
                    roll_number: student.roll_number.clone(),
                    mismatch: RosterMismatch::Training {
                        batch_id: *batch_id,
                        membership_inactive: other.is_some(),
                    },
                }),
            }
        }
    }
}

/// Membership as a plain predicate, for callers that only need the answer.
#[allow(dead_code)]
pub fn is_member(conn: &Connection, event: &Event, student: &Student) -> Result<bool, CoreError> {
    match check_membership(conn, event, student) {
        Ok(()) => Ok(true),
        Err(CoreError::NotAMember { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}
