#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn fixture_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradeimportd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradeimportd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

/// Sends one request and returns the whole response envelope.
pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

pub fn open_workspace_db(workspace: &Path) -> rusqlite::Connection {
    rusqlite::Connection::open(workspace.join("gradeimport.sqlite3")).expect("open workspace db")
}

/// Two courses (3A, 4A) with their subjects and students. Historia in 3A has
/// no teacher of record. Call after `workspace.select` created the schema.
pub fn seed_school(workspace: &Path) {
    let conn = open_workspace_db(workspace);
    conn.execute_batch(
        "INSERT INTO courses(id, name, year, cycle) VALUES
           ('c3', '3A', 3, '2025'),
           ('c4', '4A', 4, '2025');
         INSERT INTO subject_courses(id, course_id, subject_name, teacher_id) VALUES
           ('sc-mat3', 'c3', 'Matemática', 't-mat'),
           ('sc-bio3', 'c3', 'Biología', 't-bio'),
           ('sc-his3', 'c3', 'Historia', NULL),
           ('sc-fis4', 'c4', 'Física', 't-fis');
         INSERT INTO students(id, course_id, last_name, first_name) VALUES
           ('s-garcia', 'c3', 'García', 'Juan'),
           ('s-perez', 'c3', 'Pérez', 'Ana Laura'),
           ('s-rossi', 'c4', 'Rossi', 'Lucía');",
    )
    .expect("seed school");
}

pub fn count(workspace: &Path, sql: &str) -> i64 {
    open_workspace_db(workspace)
        .query_row(sql, [], |r| r.get(0))
        .expect("count")
}
