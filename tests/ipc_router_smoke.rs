mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradeimport-router-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["version"].is_string());
    assert!(health["workspacePath"].is_null());

    // Catalog answers without a workspace.
    let list = request_ok(&mut stdin, &mut reader, "2", "catalog.list", json!({ "year": 3 }));
    let subjects = list["subjects"].as_array().expect("subjects");
    assert!(subjects
        .iter()
        .any(|s| s["code"] == 2 && s["subjectName"] == "Matemática"));
    let resolved = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "catalog.resolve",
        json!({ "year": 4, "code": 8 }),
    );
    assert_eq!(resolved["subjectName"], "Física");
    let unknown = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "catalog.resolve",
        json!({ "year": 4, "code": 99 }),
    );
    assert!(unknown["subjectName"].is_null());
    let bad_year = request(&mut stdin, &mut reader, "5", "catalog.list", json!({ "year": 9 }));
    assert_eq!(error_code(&bad_year), Some("bad_params"));

    let no_ws = request(
        &mut stdin,
        &mut reader,
        "6",
        "import.contents",
        json!({ "courseId": "c3", "year": 3, "period": 1, "actingUserId": "u" }),
    );
    assert_eq!(error_code(&no_ws), Some("no_workspace"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let import_methods = [
        ("8", "import.contents"),
        ("9", "import.allYears"),
        ("10", "import.preview"),
    ];
    for (id, method) in import_methods {
        let resp = request(&mut stdin, &mut reader, id, method, json!({ "period": 1 }));
        assert_eq!(error_code(&resp), Some("bad_params"), "{}", method);
    }

    let unknown_method = request(&mut stdin, &mut reader, "11", "grades.delete", json!({}));
    assert_eq!(error_code(&unknown_method), Some("not_implemented"));

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json reply");
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("json reply");
    assert_eq!(error_code(&v), Some("bad_json"));

    // The loop keeps serving after a bad line.
    let health = request_ok(&mut stdin, &mut reader, "12", "health", json!({}));
    assert!(health["workspacePath"].is_string());
}

#[test]
fn folder_that_does_not_exist_fails_the_request() {
    let workspace = temp_dir("gradeimport-router-missing-folder");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "import.contents",
        json!({
            "courseId": "c3",
            "year": 3,
            "period": 1,
            "actingUserId": "u",
            "folderPath": workspace.join("nope").to_string_lossy(),
        }),
    );
    assert_eq!(error_code(&resp), Some("source_read_failed"));
}

#[test]
fn setup_section_supplies_import_defaults() {
    let workspace = temp_dir("gradeimport-router-setup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    test_support::seed_school(&workspace);

    let current = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(current["contentImport"]["similarity"], "overlap");
    assert!(current["contentImport"]["period"].is_null());

    let bad = request(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "contentImport", "patch": { "similarity": "soundex" } }),
    );
    assert_eq!(error_code(&bad), Some("bad_params"));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({
            "section": "contentImport",
            "patch": { "period": 3, "similarity": "jaro_winkler" }
        }),
    );
    assert_eq!(updated["contentImport"]["period"], 3);

    // No period in the request: the stored section decides.
    let single = test_support::fixture_path("fixtures/contents/single/3A (2).csv");
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "import.contents",
        json!({
            "courseId": "c3",
            "year": 3,
            "actingUserId": "admin-1",
            "files": [{ "path": single.to_string_lossy() }],
        }),
    );
    assert_eq!(res["totals"]["contentsCreated"], 2);
    assert_eq!(
        test_support::count(&workspace, "SELECT COUNT(*) FROM contents WHERE period = 3"),
        2
    );
}
