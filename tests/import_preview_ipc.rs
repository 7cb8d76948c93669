mod test_support;

use serde_json::json;
use test_support::{count, fixture_path, request_ok, seed_school, spawn_sidecar, temp_dir};

#[test]
fn preview_reports_counters_without_writing() {
    let workspace = temp_dir("gradeimport-preview");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_school(&workspace);

    let params = json!({
        "courseId": "c3",
        "year": 3,
        "period": 1,
        "actingUserId": "admin-1",
        "folderPath": fixture_path("fixtures/contents/single").to_string_lossy(),
    });
    let preview = request_ok(&mut stdin, &mut reader, "2", "import.preview", params.clone());
    assert_eq!(preview["dryRun"], true);
    assert_eq!(preview["totals"]["contentsCreated"], 5);
    assert_eq!(preview["totals"]["gradesWritten"], 10);
    assert_eq!(count(&workspace, "SELECT COUNT(*) FROM contents"), 0);
    assert_eq!(count(&workspace, "SELECT COUNT(*) FROM grades"), 0);

    let real = request_ok(&mut stdin, &mut reader, "3", "import.contents", params);
    assert_eq!(real["dryRun"], false);
    assert_eq!(real["totals"], preview["totals"]);
    assert_eq!(count(&workspace, "SELECT COUNT(*) FROM contents"), 5);
}

#[test]
fn all_years_preview_fills_by_year() {
    let workspace = temp_dir("gradeimport-preview-all-years");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_school(&workspace);

    let year3 = fixture_path("fixtures/contents/all_years/3er año/3A (2).csv");
    let year4 = fixture_path("fixtures/contents/all_years/4to año/4A (8).csv");
    let preview = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "import.preview",
        json!({
            "allYears": true,
            "period": 1,
            "actingUserId": "admin-1",
            "files": [
                { "path": year3.to_string_lossy() },
                { "path": year4.to_string_lossy() },
            ],
        }),
    );
    assert_eq!(preview["dryRun"], true);
    assert_eq!(preview["byYear"]["4"]["contentsCreated"], 2);
    assert_eq!(count(&workspace, "SELECT COUNT(*) FROM contents"), 0);
}
