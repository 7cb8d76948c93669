//! Idempotent writes for imported contents and grades.
//!
//! Contents are keyed by (subject course, period, title) among active rows and
//! are never modified once they exist; grades are keyed by (content, student)
//! and updated in place.

use crate::grades::Outcome;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

pub const CREATED_FROM_IMPORT: &str = "import";

#[derive(Clone, Debug, PartialEq)]
pub struct ContentRecord {
    pub id: String,
    pub subject_course_id: String,
    pub period: i64,
    pub title: String,
    pub teacher_id: String,
    pub created_from: String,
    pub ordinal: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ContentUpsert {
    Created(ContentRecord),
    /// Already present; left untouched.
    Existing(ContentRecord),
    /// Absent and the subject has no teacher of record.
    MissingTeacher,
}

pub struct NewContent<'a> {
    pub subject_course_id: &'a str,
    pub period: i64,
    pub title: &'a str,
    pub teacher_id: Option<&'a str>,
    pub ordinal: usize,
    pub acting_user_id: &'a str,
}

pub fn find_content(
    conn: &Connection,
    subject_course_id: &str,
    period: i64,
    title: &str,
) -> rusqlite::Result<Option<ContentRecord>> {
    conn.query_row(
        "SELECT id, subject_course_id, period, title, teacher_id, created_from, ordinal
         FROM contents
         WHERE subject_course_id = ? AND period = ? AND title = ? AND active = 1
         LIMIT 1",
        (subject_course_id, period, title),
        |r| {
            Ok(ContentRecord {
                id: r.get(0)?,
                subject_course_id: r.get(1)?,
                period: r.get(2)?,
                title: r.get(3)?,
                teacher_id: r.get(4)?,
                created_from: r.get(5)?,
                ordinal: r.get(6)?,
            })
        },
    )
    .optional()
}

pub fn upsert_content(conn: &Connection, new: &NewContent) -> rusqlite::Result<ContentUpsert> {
    if let Some(existing) = find_content(conn, new.subject_course_id, new.period, new.title)? {
        return Ok(ContentUpsert::Existing(existing));
    }
    let Some(teacher_id) = new.teacher_id else {
        return Ok(ContentUpsert::MissingTeacher);
    };

    let record = ContentRecord {
        id: Uuid::new_v4().to_string(),
        subject_course_id: new.subject_course_id.to_string(),
        period: new.period,
        title: new.title.to_string(),
        teacher_id: teacher_id.to_string(),
        created_from: CREATED_FROM_IMPORT.to_string(),
        ordinal: Some(new.ordinal as i64),
    };
    conn.execute(
        "INSERT INTO contents(
           id, subject_course_id, period, title, teacher_id, created_by, created_from,
           ordinal, active, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        (
            &record.id,
            &record.subject_course_id,
            record.period,
            &record.title,
            &record.teacher_id,
            new.acting_user_id,
            &record.created_from,
            record.ordinal,
            chrono::Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(ContentUpsert::Created(record))
}

#[derive(Clone, Debug, PartialEq)]
pub struct GradeRecord {
    pub id: String,
    pub outcome: Outcome,
    pub evaluated_on: NaiveDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GradeWrite {
    Created,
    Updated,
}

pub fn find_grade(
    conn: &Connection,
    content_id: &str,
    student_id: &str,
) -> rusqlite::Result<Option<GradeRecord>> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, outcome, evaluated_on FROM grades
             WHERE content_id = ? AND student_id = ?",
            (content_id, student_id),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((id, outcome, evaluated_on)) = row else {
        return Ok(None);
    };
    let outcome = Outcome::from_db(&outcome).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(1, "outcome".into(), rusqlite::types::Type::Text)
    })?;
    let evaluated_on = NaiveDate::parse_from_str(&evaluated_on, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Some(GradeRecord {
        id,
        outcome,
        evaluated_on,
    }))
}

pub fn upsert_grade(
    conn: &Connection,
    content_id: &str,
    student_id: &str,
    outcome: Outcome,
    evaluated_on: NaiveDate,
) -> rusqlite::Result<(GradeRecord, GradeWrite)> {
    let now = chrono::Utc::now().to_rfc3339();
    let day = evaluated_on.format("%Y-%m-%d").to_string();

    let (id, write) = match find_grade(conn, content_id, student_id)? {
        Some(existing) => {
            if existing.outcome != outcome {
                tracing::debug!(
                    grade_id = %existing.id,
                    from = existing.outcome.as_str(),
                    to = outcome.as_str(),
                    evaluated_before = %existing.evaluated_on,
                    "grade outcome changed"
                );
            }
            conn.execute(
                "UPDATE grades SET outcome = ?, evaluated_on = ?, updated_at = ? WHERE id = ?",
                (outcome.as_str(), &day, &now, &existing.id),
            )?;
            (existing.id, GradeWrite::Updated)
        }
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO grades(id, content_id, student_id, outcome, evaluated_on, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (&id, content_id, student_id, outcome.as_str(), &day, &now),
            )?;
            (id, GradeWrite::Created)
        }
    };

    Ok((
        GradeRecord {
            id,
            outcome,
            evaluated_on,
        },
        write,
    ))
}
