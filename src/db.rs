use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "campus.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS faculty(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            department_id INTEGER NOT NULL,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_faculty_department ON faculty(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY,
            roll_number TEXT NOT NULL UNIQUE,
            register_number TEXT NOT NULL,
            name TEXT NOT NULL,
            department_id INTEGER NOT NULL,
            section TEXT NOT NULL,
            batch_id INTEGER,
            year_of_study INTEGER NOT NULL,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    // The meeting roster predicate filters on this triple.
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_dept_section_year
         ON students(department_id, section, year_of_study)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS training_batches(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            department_id INTEGER NOT NULL,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS batch_members(
            batch_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY(batch_id, student_id),
            FOREIGN KEY(batch_id) REFERENCES training_batches(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batch_members_student ON batch_members(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_meetings(
            id INTEGER PRIMARY KEY,
            date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            subject TEXT NOT NULL,
            venue TEXT,
            year INTEGER NOT NULL,
            semester INTEGER NOT NULL,
            section TEXT NOT NULL,
            department_id INTEGER NOT NULL,
            faculty_id INTEGER NOT NULL,
            cancelled INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(department_id) REFERENCES departments(id),
            FOREIGN KEY(faculty_id) REFERENCES faculty(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_faculty_date
         ON academic_meetings(faculty_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_department_date
         ON academic_meetings(department_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS training_sessions(
            id INTEGER PRIMARY KEY,
            date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            topic TEXT NOT NULL,
            venue TEXT,
            batch_id INTEGER NOT NULL,
            department_id INTEGER NOT NULL,
            trainer_name TEXT NOT NULL,
            cancelled INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(batch_id) REFERENCES training_batches(id),
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_trainings_department_date
         ON training_sessions(department_id, date)",
        [],
    )?;

    // One record per (student, event kind, event id); the composite primary
    // key is what makes the per-row write an atomic upsert.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            student_id INTEGER NOT NULL,
            event_kind TEXT NOT NULL,
            event_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            marked_by INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(student_id, event_kind, event_id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_event
         ON attendance_records(event_kind, event_id)",
        [],
    )?;

    // Early workspaces predate event cancellation. Add the flag if missing.
    ensure_event_cancelled_columns(&conn)?;

    Ok(conn)
}

fn ensure_event_cancelled_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "academic_meetings", "cancelled")? {
        conn.execute(
            "ALTER TABLE academic_meetings ADD COLUMN cancelled INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !table_has_column(conn, "training_sessions", "cancelled")? {
        conn.execute(
            "ALTER TABLE training_sessions ADD COLUMN cancelled INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
