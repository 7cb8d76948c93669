//! Batch import: runs every source file through classify → extract →
//! match/upsert, isolating failures per file and aggregating counters per
//! file, per academic year and for the whole run.

use crate::classify::{self, SubjectIndexCache};
use crate::db;
use crate::error::FileError;
use crate::extract::{self, ContentTitle, Extraction};
use crate::grades::map_token;
use crate::matching::{self, StudentCache};
use crate::settings::ImportSettings;
use crate::sources::SourceFile;
use crate::upsert::{self, ContentRecord, ContentUpsert, GradeWrite, NewContent};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Run-wide parameters, fixed for every file of one batch.
pub struct BatchRequest<'a> {
    pub period: i64,
    pub acting_user_id: &'a str,
    pub evaluated_on: NaiveDate,
    pub settings: ImportSettings,
}

/// How multi-year runs find the course for each year.
#[derive(Default)]
pub struct YearCourses {
    pub explicit: HashMap<u8, String>,
    pub cycle: Option<String>,
}

/// Caches that live exactly as long as one batch run.
#[derive(Default)]
pub struct RunCaches {
    pub subjects: SubjectIndexCache,
    pub students: StudentCache,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub file_name: String,
    pub status: OutcomeStatus,
    pub academic_year: Option<u8>,
    pub subject_name: Option<String>,
    pub contents_created: usize,
    pub contents_skipped: usize,
    pub grades_written: usize,
    pub grades_updated: usize,
    pub grades_skipped: usize,
    pub students_matched: usize,
    pub students_unmatched: usize,
    pub subjects_missing_teacher: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ImportOutcome {
    fn new(file_name: &str, academic_year: Option<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            status: OutcomeStatus::Success,
            academic_year,
            subject_name: None,
            contents_created: 0,
            contents_skipped: 0,
            grades_written: 0,
            grades_updated: 0,
            grades_skipped: 0,
            students_matched: 0,
            students_unmatched: 0,
            subjects_missing_teacher: 0,
            error_stage: None,
            error_message: None,
        }
    }

    fn failed(file_name: &str, academic_year: Option<u8>, e: &FileError) -> Self {
        let mut out = Self::new(file_name, academic_year);
        out.status = OutcomeStatus::Error;
        out.error_stage = Some(e.stage());
        out.error_message = Some(e.to_string());
        out
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatistics {
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub contents_created: usize,
    pub contents_skipped: usize,
    pub grades_written: usize,
    pub grades_updated: usize,
    pub students_matched: usize,
    pub students_unmatched: usize,
    pub subjects_missing_teacher: usize,
}

impl BatchStatistics {
    pub fn absorb(&mut self, o: &ImportOutcome) {
        match o.status {
            OutcomeStatus::Success => self.files_succeeded += 1,
            OutcomeStatus::Error => {
                self.files_failed += 1;
                return;
            }
        }
        self.contents_created += o.contents_created;
        self.contents_skipped += o.contents_skipped;
        self.grades_written += o.grades_written;
        self.grades_updated += o.grades_updated;
        self.students_matched += o.students_matched;
        self.students_unmatched += o.students_unmatched;
        self.subjects_missing_teacher += o.subjects_missing_teacher;
    }

    pub fn merge(&mut self, other: &BatchStatistics) {
        self.files_succeeded += other.files_succeeded;
        self.files_failed += other.files_failed;
        self.contents_created += other.contents_created;
        self.contents_skipped += other.contents_skipped;
        self.grades_written += other.grades_written;
        self.grades_updated += other.grades_updated;
        self.students_matched += other.students_matched;
        self.students_unmatched += other.students_unmatched;
        self.subjects_missing_teacher += other.subjects_missing_teacher;
    }

    fn summary_lines(&self, indent: &str) -> Vec<String> {
        vec![
            format!(
                "{indent}Files: {} succeeded, {} failed",
                self.files_succeeded, self.files_failed
            ),
            format!(
                "{indent}Contents: {} created, {} omitted (already present)",
                self.contents_created, self.contents_skipped
            ),
            format!(
                "{indent}Grades written: {} ({} updated)",
                self.grades_written, self.grades_updated
            ),
            format!(
                "{indent}Students: {} matched, {} not found",
                self.students_matched, self.students_unmatched
            ),
            format!(
                "{indent}Subjects without teacher: {}",
                self.subjects_missing_teacher
            ),
        ]
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub success: bool,
    pub dry_run: bool,
    pub summary: String,
    pub totals: BatchStatistics,
    pub files: Vec<ImportOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_year: Option<BTreeMap<u8, BatchStatistics>>,
}

impl BatchResult {
    fn build(
        files: Vec<ImportOutcome>,
        by_year: Option<BTreeMap<u8, BatchStatistics>>,
        totals: BatchStatistics,
    ) -> Self {
        let success = totals.files_succeeded > 0;
        let summary = render_summary(success, &totals, by_year.as_ref(), &files);
        tracing::info!(
            success,
            files_succeeded = totals.files_succeeded,
            files_failed = totals.files_failed,
            contents_created = totals.contents_created,
            contents_skipped = totals.contents_skipped,
            grades_written = totals.grades_written,
            grades_updated = totals.grades_updated,
            "content import batch finished"
        );
        Self {
            success,
            dry_run: false,
            summary,
            totals,
            files,
            by_year,
        }
    }
}

fn render_summary(
    success: bool,
    totals: &BatchStatistics,
    by_year: Option<&BTreeMap<u8, BatchStatistics>>,
    files: &[ImportOutcome],
) -> String {
    let mut lines = Vec::new();
    lines.push(if success {
        "Import finished.".to_string()
    } else {
        "Import failed: no file could be imported.".to_string()
    });
    if let Some(by_year) = by_year {
        for (year, stats) in by_year {
            lines.push(format!("Year {}:", year));
            lines.extend(stats.summary_lines("  "));
        }
        lines.push("Total:".to_string());
        lines.extend(totals.summary_lines("  "));
    } else {
        lines.extend(totals.summary_lines(""));
    }
    let failures: Vec<&ImportOutcome> = files
        .iter()
        .filter(|o| o.status == OutcomeStatus::Error)
        .collect();
    if !failures.is_empty() {
        lines.push("Errors:".to_string());
        for o in failures {
            lines.push(format!(
                "  {}: {}",
                o.file_name,
                o.error_message.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    lines.join("\n")
}

/// Imports every file into one course of one academic year.
pub fn run_single_year(
    conn: &Connection,
    req: &BatchRequest,
    year: u8,
    course_id: &str,
    files: &[SourceFile],
) -> BatchResult {
    let mut caches = RunCaches::default();
    let course_check = check_course_year(conn, course_id, year);

    let mut totals = BatchStatistics::default();
    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        let outcome = match &course_check {
            Ok(()) => process_file(conn, &mut caches, req, year, course_id, file, None),
            Err(e) => ImportOutcome::failed(&file.file_name, Some(year), e),
        };
        log_outcome(&outcome);
        totals.absorb(&outcome);
        outcomes.push(outcome);
    }
    BatchResult::build(outcomes, None, totals)
}

/// Groups files by academic year, then imports each group into that year's
/// course. Counters are kept per year and merged into the totals.
pub fn run_all_years(
    conn: &Connection,
    req: &BatchRequest,
    courses: &YearCourses,
    files: &[SourceFile],
) -> BatchResult {
    let mut caches = RunCaches::default();
    let mut outcomes = Vec::with_capacity(files.len());
    let mut unplaced = BatchStatistics::default();
    let mut groups: BTreeMap<u8, Vec<(&SourceFile, Option<Extraction>)>> = BTreeMap::new();

    for file in files {
        match detect_year(file, &req.settings) {
            Ok((year, extraction)) => groups.entry(year).or_default().push((file, extraction)),
            Err(e) => {
                let outcome = ImportOutcome::failed(&file.file_name, None, &e);
                log_outcome(&outcome);
                unplaced.absorb(&outcome);
                outcomes.push(outcome);
            }
        }
    }

    let mut by_year: BTreeMap<u8, BatchStatistics> = BTreeMap::new();
    for (year, group) in groups {
        let course = resolve_year_course(conn, courses, year);
        let stats = by_year.entry(year).or_default();
        for (file, extraction) in group {
            let outcome = match &course {
                Ok(course_id) => {
                    process_file(conn, &mut caches, req, year, course_id, file, extraction)
                }
                Err(e) => ImportOutcome::failed(&file.file_name, Some(year), e),
            };
            log_outcome(&outcome);
            stats.absorb(&outcome);
            outcomes.push(outcome);
        }
    }

    let mut totals = unplaced;
    for stats in by_year.values() {
        totals.merge(stats);
    }
    BatchResult::build(outcomes, Some(by_year), totals)
}

/// Year from the file's path first; otherwise from the label of its
/// content-title row, in which case the extraction is handed on for reuse.
fn detect_year(
    file: &SourceFile,
    settings: &ImportSettings,
) -> Result<(u8, Option<Extraction>), FileError> {
    if let Some(year) = classify::year_from_path(&file.path) {
        return Ok((year, None));
    }
    let bytes = file
        .content
        .as_ref()
        .map_err(|e| FileError::Unreadable(e.clone()))?;
    let extraction = extract::extract(bytes, &settings.legacy_encodings)?;
    match extraction.labelled_year() {
        Some(year) if crate::catalog::is_valid_year(year as i64) => Ok((year, Some(extraction))),
        _ => Err(FileError::YearUndetermined),
    }
}

fn resolve_year_course(
    conn: &Connection,
    courses: &YearCourses,
    year: u8,
) -> Result<String, FileError> {
    if let Some(id) = courses.explicit.get(&year) {
        check_course_year(conn, id, year)?;
        return Ok(id.clone());
    }
    let mut ids = db::course_ids_for_year(conn, year, courses.cycle.as_deref())?;
    match ids.len() {
        0 => Err(FileError::CourseNotFound { year }),
        1 => Ok(ids.remove(0)),
        _ => Err(FileError::CourseAmbiguous { year }),
    }
}

/// The course must exist and belong to the academic year being imported.
fn check_course_year(conn: &Connection, course_id: &str, year: u8) -> Result<(), FileError> {
    match db::course_year(conn, course_id)? {
        Some(y) if y == i64::from(year) => Ok(()),
        Some(course_year) => Err(FileError::CourseYearMismatch {
            course_id: course_id.to_string(),
            course_year,
            year,
        }),
        None => Err(FileError::UnknownCourse {
            course_id: course_id.to_string(),
        }),
    }
}

fn process_file(
    conn: &Connection,
    caches: &mut RunCaches,
    req: &BatchRequest,
    year: u8,
    course_id: &str,
    file: &SourceFile,
    extraction: Option<Extraction>,
) -> ImportOutcome {
    let mut outcome = ImportOutcome::new(&file.file_name, Some(year));
    let imported = import_file(conn, caches, req, year, course_id, file, extraction, &mut outcome);
    if let Err(e) = imported {
        let subject_name = outcome.subject_name.take();
        outcome = ImportOutcome::failed(&file.file_name, Some(year), &e);
        outcome.subject_name = subject_name;
    }
    outcome
}

#[allow(clippy::too_many_arguments)]
fn import_file(
    conn: &Connection,
    caches: &mut RunCaches,
    req: &BatchRequest,
    year: u8,
    course_id: &str,
    file: &SourceFile,
    extraction: Option<Extraction>,
    outcome: &mut ImportOutcome,
) -> Result<(), FileError> {
    let bytes = file
        .content
        .as_ref()
        .map_err(|e| FileError::Unreadable(e.clone()))?;

    let classified =
        classify::classify(conn, &mut caches.subjects, &file.file_name, year, course_id)?;
    tracing::debug!(
        file = %file.file_name,
        code = classified.code,
        subject = classified.canonical_name,
        "file classified"
    );
    let subject = classified.subject;
    outcome.subject_name = Some(subject.subject_name.clone());

    let extraction = match extraction {
        Some(e) => e,
        None => extract::extract(bytes, &req.settings.legacy_encodings)?,
    };
    if extraction.titles.is_empty() {
        tracing::info!(file = %file.file_name, "no content titles; nothing to import");
        return Ok(());
    }

    let mut contents: Vec<(&ContentTitle, ContentRecord)> = Vec::new();
    let mut refused = 0usize;
    for title in &extraction.titles {
        let new = NewContent {
            subject_course_id: &subject.id,
            period: req.period,
            title: &title.title,
            teacher_id: subject.teacher_id.as_deref(),
            ordinal: title.ordinal,
            acting_user_id: req.acting_user_id,
        };
        match upsert::upsert_content(conn, &new)? {
            ContentUpsert::Created(rec) => {
                outcome.contents_created += 1;
                contents.push((title, rec));
            }
            ContentUpsert::Existing(rec) => {
                outcome.contents_skipped += 1;
                contents.push((title, rec));
            }
            ContentUpsert::MissingTeacher => refused += 1,
        }
    }
    if refused > 0 {
        outcome.subjects_missing_teacher = 1;
        tracing::warn!(
            file = %file.file_name,
            subject = %subject.subject_name,
            refused,
            "subject has no teacher assigned; new contents not created"
        );
    }

    for row in &extraction.student_rows {
        let matched = matching::match_student(
            conn,
            &mut caches.students,
            &subject.id,
            &row.name,
            &req.settings.similarity,
        )?;
        let Some(student) = matched else {
            outcome.students_unmatched += 1;
            tracing::debug!(
                file = %file.file_name,
                line = row.line_no,
                roll = row.roll,
                name = %row.name,
                "student not found"
            );
            continue;
        };
        outcome.students_matched += 1;
        tracing::trace!(
            line = row.line_no,
            student = %student.id,
            kind = ?student.kind,
            "student matched"
        );
        let student_id = student.id.clone();

        for (title, content) in &contents {
            let token = row.token_for(title).unwrap_or("");
            match map_token(token) {
                Some(o) => {
                    let (_, write) =
                        upsert::upsert_grade(conn, &content.id, &student_id, o, req.evaluated_on)?;
                    outcome.grades_written += 1;
                    if write == GradeWrite::Updated {
                        outcome.grades_updated += 1;
                    }
                }
                None if token.trim().is_empty() => {}
                None => {
                    outcome.grades_skipped += 1;
                    tracing::debug!(
                        file = %file.file_name,
                        line = row.line_no,
                        token,
                        "unrecognized grade token skipped"
                    );
                }
            }
        }
    }
    Ok(())
}

fn log_outcome(o: &ImportOutcome) {
    match o.status {
        OutcomeStatus::Success => tracing::info!(
            file = %o.file_name,
            year = ?o.academic_year,
            subject = ?o.subject_name,
            contents_created = o.contents_created,
            contents_skipped = o.contents_skipped,
            grades_written = o.grades_written,
            grades_updated = o.grades_updated,
            students_matched = o.students_matched,
            students_unmatched = o.students_unmatched,
            "file imported"
        ),
        OutcomeStatus::Error => tracing::warn!(
            file = %o.file_name,
            stage = o.error_stage.unwrap_or(""),
            reason = o.error_message.as_deref().unwrap_or(""),
            "file import failed"
        ),
    }
}
