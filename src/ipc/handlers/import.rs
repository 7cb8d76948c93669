use crate::batch::{self, BatchRequest, BatchResult, YearCourses};
use crate::catalog;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::settings::ImportSettings;
use crate::sources::{self, SourceFile};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;

enum Mode {
    SingleYear { year: u8, course_id: String },
    AllYears(YearCourses),
}

struct ImportParams {
    mode: Mode,
    period: i64,
    acting_user_id: String,
    evaluated_on: NaiveDate,
    settings: ImportSettings,
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

fn parse_year(v: Option<&serde_json::Value>, key: &str) -> Result<u8, HandlerErr> {
    let year = v
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if !catalog::is_valid_year(year) {
        return Err(HandlerErr::bad_params(format!(
            "{} must be between {} and {}",
            key,
            catalog::FIRST_YEAR,
            catalog::LAST_YEAR
        )));
    }
    Ok(year as u8)
}

fn parse_courses_by_year(params: &serde_json::Value) -> Result<HashMap<u8, String>, HandlerErr> {
    let mut out = HashMap::new();
    let Some(v) = params.get("coursesByYear") else {
        return Ok(out);
    };
    if v.is_null() {
        return Ok(out);
    }
    let obj = v
        .as_object()
        .ok_or_else(|| HandlerErr::bad_params("coursesByYear must be an object"))?;
    for (key, course) in obj {
        let year = key
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|y| catalog::is_valid_year(*y))
            .ok_or_else(|| {
                HandlerErr::bad_params(format!("coursesByYear: invalid year {}", key))
            })?;
        let course_id = course
            .as_str()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                HandlerErr::bad_params(format!("coursesByYear.{} must be a course id", key))
            })?;
        out.insert(year as u8, course_id.trim().to_string());
    }
    Ok(out)
}

fn parse_params(
    conn: &Connection,
    params: &serde_json::Value,
    all_years: bool,
) -> Result<ImportParams, HandlerErr> {
    let settings = ImportSettings::resolve(conn, params).map_err(HandlerErr::bad_params)?;

    let period = match params.get("period") {
        Some(v) if !v.is_null() => v
            .as_i64()
            .ok_or_else(|| HandlerErr::bad_params("period must be an integer"))?,
        _ => settings
            .default_period
            .ok_or_else(|| HandlerErr::bad_params("missing period"))?,
    };
    if period < 1 {
        return Err(HandlerErr::bad_params("period must be positive"));
    }

    let acting_user_id = get_required_str(params, "actingUserId")?;

    let evaluated_on = match params.get("evaluatedOn").and_then(|v| v.as_str()) {
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|_| HandlerErr::bad_params("evaluatedOn must be YYYY-MM-DD"))?,
        None => chrono::Local::now().date_naive(),
    };

    let mode = if all_years {
        let cycle = params
            .get("cycle")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Mode::AllYears(YearCourses {
            explicit: parse_courses_by_year(params)?,
            cycle,
        })
    } else {
        Mode::SingleYear {
            year: parse_year(params.get("year"), "year")?,
            course_id: get_required_str(params, "courseId")?,
        }
    };

    Ok(ImportParams {
        mode,
        period,
        acting_user_id,
        evaluated_on,
        settings,
    })
}

fn source_read_failed(e: anyhow::Error, path: &str) -> HandlerErr {
    HandlerErr {
        code: "source_read_failed",
        message: format!("{e:#}"),
        details: Some(json!({ "path": path })),
    }
}

fn collect_sources(params: &serde_json::Value) -> Result<Vec<SourceFile>, HandlerErr> {
    let files = params.get("files").filter(|v| !v.is_null());
    let folder = params.get("folderPath").and_then(|v| v.as_str());
    let bundle = params.get("bundlePath").and_then(|v| v.as_str());
    let given = [files.is_some(), folder.is_some(), bundle.is_some()]
        .iter()
        .filter(|b| **b)
        .count();
    if given != 1 {
        return Err(HandlerErr::bad_params(
            "pass exactly one of files, folderPath, bundlePath",
        ));
    }

    if let Some(folder) = folder {
        return sources::read_folder(Path::new(folder)).map_err(|e| source_read_failed(e, folder));
    }
    if let Some(bundle) = bundle {
        return sources::read_bundle(Path::new(bundle)).map_err(|e| source_read_failed(e, bundle));
    }

    let list = files
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("files must be an array"))?;
    if list.is_empty() {
        return Err(HandlerErr::bad_params("files must not be empty"));
    }
    let mut out = Vec::with_capacity(list.len());
    for (i, f) in list.iter().enumerate() {
        let path = f
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params(format!("files[{}].path missing", i)))?;
        let file_name = f.get("fileName").and_then(|v| v.as_str());
        out.push(sources::read_file(Path::new(path), file_name));
    }
    Ok(out)
}

fn run(conn: &Connection, p: &ImportParams, files: &[SourceFile]) -> BatchResult {
    let req = BatchRequest {
        period: p.period,
        acting_user_id: &p.acting_user_id,
        evaluated_on: p.evaluated_on,
        settings: p.settings.clone(),
    };
    tracing::info!(
        files = files.len(),
        period = p.period,
        similarity = p.settings.similarity.as_str(),
        "content import batch started"
    );
    match &p.mode {
        Mode::SingleYear { year, course_id } => {
            batch::run_single_year(conn, &req, *year, course_id, files)
        }
        Mode::AllYears(courses) => batch::run_all_years(conn, &req, courses, files),
    }
}

fn result_json(result: &BatchResult) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(result).map_err(|e| HandlerErr {
        code: "import_failed",
        message: e.to_string(),
        details: None,
    })
}

fn import_run(
    conn: &Connection,
    params: &serde_json::Value,
    all_years: bool,
) -> Result<serde_json::Value, HandlerErr> {
    let p = parse_params(conn, params, all_years)?;
    let files = collect_sources(params)?;
    let result = run(conn, &p, &files);
    result_json(&result)
}

fn import_preview(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let all_years = params
        .get("allYears")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let p = parse_params(conn, params, all_years)?;
    let files = collect_sources(params)?;

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "import_failed",
        message: e.to_string(),
        details: None,
    })?;
    let mut result = run(&tx, &p, &files);
    result.dry_run = true;
    tx.rollback().map_err(|e| HandlerErr {
        code: "import_failed",
        message: e.to_string(),
        details: None,
    })?;
    result_json(&result)
}

fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
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
        "import.contents" => Some(with_conn(state, req, |c, p| import_run(c, p, false))),
        "import.allYears" => Some(with_conn(state, req, |c, p| import_run(c, p, true))),
        "import.preview" => Some(with_conn(state, req, import_preview)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn period_falls_back_to_workspace_section() {
        let conn = db::open_in_memory().expect("open");
        let params = json!({ "courseId": "c1", "year": 3, "actingUserId": "u1" });
        assert!(parse_params(&conn, &params, false).is_err());

        db::settings_set_json(&conn, crate::settings::SECTION_KEY, &json!({ "period": 2 }))
            .expect("set");
        let p = parse_params(&conn, &params, false).expect("params");
        assert_eq!(p.period, 2);
        assert!(matches!(p.mode, Mode::SingleYear { year: 3, .. }));
    }

    #[test]
    fn rejects_bad_dates_and_years() {
        let conn = db::open_in_memory().expect("open");
        let base = json!({ "courseId": "c1", "period": 1, "actingUserId": "u1" });

        let mut p = base.clone();
        p["year"] = json!(8);
        assert_eq!(parse_params(&conn, &p, false).err().map(|e| e.code), Some("bad_params"));

        let mut p = base.clone();
        p["year"] = json!(2);
        p["evaluatedOn"] = json!("30/06/2025");
        assert!(parse_params(&conn, &p, false).is_err());

        p["evaluatedOn"] = json!("2025-06-30");
        let parsed = parse_params(&conn, &p, false).expect("params");
        assert_eq!(parsed.evaluated_on, NaiveDate::from_ymd_opt(2025, 6, 30).expect("date"));
    }

    #[test]
    fn courses_by_year_keys_are_validated() {
        let ok_map = parse_courses_by_year(&json!({ "coursesByYear": { "3": "c3", "4": "c4" } }))
            .expect("map");
        assert_eq!(ok_map.get(&3).map(|s| s.as_str()), Some("c3"));
        assert!(parse_courses_by_year(&json!({ "coursesByYear": { "9": "c9" } })).is_err());
        assert!(parse_courses_by_year(&json!({ "coursesByYear": ["c3"] })).is_err());
        assert!(parse_courses_by_year(&json!({})).expect("empty").is_empty());
    }

    #[test]
    fn exactly_one_source_kind() {
        assert!(collect_sources(&json!({})).is_err());
        assert!(collect_sources(&json!({ "folderPath": "/a", "bundlePath": "/b" })).is_err());
        assert!(collect_sources(&json!({ "files": [] })).is_err());
        let missing = collect_sources(&json!({ "folderPath": "/definitely/not/here" }));
        assert_eq!(missing.err().map(|e| e.code), Some("source_read_failed"));
    }
}
