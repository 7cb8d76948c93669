use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradeimport.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    // Collaborator tables. The import pipeline only reads these.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            year INTEGER NOT NULL,
            cycle TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_year ON courses(year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_courses(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            subject_name TEXT NOT NULL,
            teacher_id TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_courses_course ON subject_courses(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_course ON students(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS retake_enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_course_id TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_course_id) REFERENCES subject_courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_retake_enrollments_subject
         ON retake_enrollments(subject_course_id)",
        [],
    )?;

    // Tables written by the import.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS contents(
            id TEXT PRIMARY KEY,
            subject_course_id TEXT NOT NULL,
            period INTEGER NOT NULL,
            title TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            created_by TEXT,
            created_from TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT,
            FOREIGN KEY(subject_course_id) REFERENCES subject_courses(id)
        )",
        [],
    )?;
    ensure_contents_ordinal(conn)?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_contents_active_title
         ON contents(subject_course_id, period, title) WHERE active = 1",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            content_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            outcome TEXT NOT NULL,
            evaluated_on TEXT NOT NULL,
            FOREIGN KEY(content_id) REFERENCES contents(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(content_id, student_id)
        )",
        [],
    )?;
    ensure_grades_updated_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn course_year(conn: &Connection, course_id: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row("SELECT year FROM courses WHERE id = ?", [course_id], |r| r.get(0))
        .optional()
}

/// Course ids for an academic year, optionally restricted to one cycle.
pub fn course_ids_for_year(
    conn: &Connection,
    year: u8,
    cycle: Option<&str>,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM courses
         WHERE year = ? AND (?2 IS NULL OR cycle = ?2)
         ORDER BY name",
    )?;
    let ids = stmt
        .query_map((year as i64, cycle), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

// Workspaces created before contents carried their column position lack the
// ordinal; older rows keep NULL.
fn ensure_contents_ordinal(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "contents", "ordinal")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE contents ADD COLUMN ordinal INTEGER", [])?;
    Ok(())
}

fn ensure_grades_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "grades", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE grades ADD COLUMN updated_at TEXT", [])?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_init_is_idempotent() {
        let conn = open_in_memory().expect("open");
        init_schema(&conn).expect("second init");
        assert!(table_has_column(&conn, "contents", "ordinal").expect("pragma"));
        assert!(table_has_column(&conn, "grades", "updated_at").expect("pragma"));
    }

    #[test]
    fn settings_roundtrip_and_overwrite() {
        let conn = open_in_memory().expect("open");
        assert!(settings_get_json(&conn, "setup.contentImport")
            .expect("get")
            .is_none());
        settings_set_json(&conn, "setup.contentImport", &json!({ "similarity": "overlap" }))
            .expect("set");
        settings_set_json(&conn, "setup.contentImport", &json!({ "similarity": "jaro_winkler" }))
            .expect("overwrite");
        let v = settings_get_json(&conn, "setup.contentImport")
            .expect("get")
            .expect("present");
        assert_eq!(v["similarity"], "jaro_winkler");
    }

    #[test]
    fn course_lookup_filters_by_year_and_cycle() {
        let conn = open_in_memory().expect("open");
        conn.execute(
            "INSERT INTO courses(id, name, year, cycle) VALUES
               ('c1', '3A', 3, '2024'),
               ('c2', '3A', 3, '2025'),
               ('c3', '4A', 4, '2025')",
            [],
        )
        .expect("seed");
        assert_eq!(course_ids_for_year(&conn, 3, None).expect("q").len(), 2);
        assert_eq!(
            course_ids_for_year(&conn, 3, Some("2025")).expect("q"),
            vec!["c2".to_string()]
        );
        assert!(course_ids_for_year(&conn, 5, None).expect("q").is_empty());
    }

    #[test]
    fn only_one_active_content_per_title() {
        let conn = open_in_memory().expect("open");
        conn.execute("INSERT INTO courses(id, name, year) VALUES('c1', '1A', 1)", [])
            .expect("course");
        conn.execute(
            "INSERT INTO subject_courses(id, course_id, subject_name, teacher_id)
             VALUES('s1', 'c1', 'Matemática', 't1')",
            [],
        )
        .expect("subject");
        let insert = "INSERT INTO contents
                (id, subject_course_id, period, title, teacher_id, created_from, active)
                 VALUES(?, 's1', 1, 'Fracciones', 't1', 'import', ?)";
        conn.execute(insert, ("a", 1)).expect("first");
        assert!(conn.execute(insert, ("b", 1)).is_err());
        conn.execute(insert, ("c", 0)).expect("inactive duplicate allowed");
    }
}
