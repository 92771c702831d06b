use crate::model::{CoreError, Event};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

pub const PAGE_SIZE_DEFAULT: i64 = 25;
pub const PAGE_SIZE_MAX: i64 = 200;

/// Sort keys the roster view accepts. Anything outside the allow-list falls
/// back to the roll number. The requested string never reaches SQL; only
/// the fixed fragments below do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    RollNumber,
    Name,
    DepartmentName,
    Status,
}

impl SortKey {
    pub fn resolve(raw: Option<&str>) -> SortKey {
        match raw.map(str::trim) {
            Some("name") => SortKey::Name,
            Some("departmentName") => SortKey::DepartmentName,
            Some("status") => SortKey::Status,
            _ => SortKey::RollNumber,
        }
    }

    fn order_expr(self) -> &'static str {
        match self {
            SortKey::RollNumber => "s.roll_number",
            SortKey::Name => "s.name",
            SortKey::DepartmentName => "department_name",
            SortKey::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn resolve(raw: Option<&str>) -> SortDir {
        match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("DESC") => SortDir::Desc,
            _ => SortDir::Asc,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRow {
    pub student_id: i64,
    pub roll_number: String,
    pub name: String,
    pub department_name: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterPage {
    pub rows: Vec<RosterRow>,
    pub total_count: i64,
    pub page_number: i64,
    pub page_size: i64,
}

fn clamp_page_size(requested: Option<i64>) -> i64 {
    match requested {
        Some(n) if n >= 1 => n.min(PAGE_SIZE_MAX),
        _ => PAGE_SIZE_DEFAULT,
    }
}

/// A page request past the end of the roster resets to page 1 rather than
/// returning an empty view.
fn effective_page(requested: i64, total_count: i64, page_size: i64) -> i64 {
    if requested < 1 {
        return 1;
    }
    let page_count = (total_count + page_size - 1) / page_size;
    if requested > page_count {
        1
    } else {
        requested
    }
}

fn roster_predicate(event: &Event) -> (&'static str, Vec<Value>) {
    match event {
        Event::Meeting {
            department_id,
            section,
            year,
            ..
        } => (
            "s.department_id = ? AND s.section = ? AND s.year_of_study = ?",
            vec![
                Value::Integer(*department_id),
                Value::Text(section.clone()),
                Value::Integer(*year),
            ],
        ),
        Event::Training { batch_id, .. } => (
            "s.id IN (SELECT student_id FROM batch_members
                      WHERE batch_id = ? AND active = 1)",
            vec![Value::Integer(*batch_id)],
        ),
    }
}

/// Paginated, sorted view of (student, current status) for an event. Status
/// comes from a left join with `absent` as the read-time default; no record
/// row is required for a student to appear.
pub fn page(
    conn: &Connection,
    event: &Event,
    sort_key: SortKey,
    sort_dir: SortDir,
    page_number: i64,
    page_size: Option<i64>,
) -> Result<RosterPage, CoreError> {
    let page_size = clamp_page_size(page_size);
    let (predicate, predicate_params) = roster_predicate(event);

    let count_sql = format!("SELECT COUNT(*) FROM students s WHERE {predicate}");
    let total_count: i64 = conn.query_row(
        &count_sql,
        params_from_iter(predicate_params.iter()),
        |r| r.get(0),
    )?;

    let page_number = effective_page(page_number, total_count, page_size);
    let offset = (page_number - 1) * page_size;

    let sql = format!(
        "SELECT s.id, s.roll_number, s.name, d.name AS department_name,
                COALESCE(ar.status, 'absent') AS status
         FROM students s
         JOIN departments d ON d.id = s.department_id
         LEFT JOIN attendance_records ar
           ON ar.student_id = s.id AND ar.event_kind = ? AND ar.event_id = ?
         WHERE {predicate}
         ORDER BY {order} {dir}, s.roll_number ASC
         LIMIT ? OFFSET ?",
        order = sort_key.order_expr(),
        dir = sort_dir.sql(),
    );

    let mut params: Vec<Value> = vec![
        Value::Text(event.kind().as_str().to_string()),
        Value::Integer(event.id()),
    ];
    params.extend(predicate_params);
    params.push(Value::Integer(page_size));
    params.push(Value::Integer(offset));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |r| {
            Ok(RosterRow {
                student_id: r.get(0)?,
                roll_number: r.get(1)?,
                name: r.get(2)?,
                department_name: r.get(3)?,
                status: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RosterPage {
        rows,
        total_count,
        page_number,
        page_size,
    })
}
