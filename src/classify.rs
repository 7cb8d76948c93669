//! File name → subject code → catalog name → course-scoped subject.

use crate::catalog;
use crate::error::FileError;
use crate::normalize::normalize;
use regex::Regex;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Clone, Debug, PartialEq)]
pub struct SubjectCourse {
    pub id: String,
    pub subject_name: String,
    pub course_id: String,
    pub teacher_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Classified {
    pub code: u32,
    pub canonical_name: &'static str,
    pub subject: SubjectCourse,
}

fn code_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((\d+)\)\.[^.()]+$").expect("valid code pattern"))
}

fn year_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[^0-9])([1-9])\s*(?:er|ro|do|to|mo|vo|no|°|º|ª)?\.?\s*a[ñn]o\b")
            .expect("valid year pattern")
    })
}

/// Subject code embedded as `(<digits>)` right before the extension.
pub fn extract_code(file_name: &str) -> Result<u32, FileError> {
    let base = base_name(file_name);
    code_pattern()
        .captures(base)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .ok_or(FileError::BadFilenameFormat)
}

/// Academic year named by an "N-th year" marker such as `3er AÑO` or `5° año`.
pub fn year_marker(text: &str) -> Option<u8> {
    year_pattern()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u8>().ok())
}

/// Year hinted by the file name or any enclosing folder, innermost first.
pub fn year_from_path(path: &str) -> Option<u8> {
    path.rsplit(['/', '\\'])
        .filter_map(year_marker)
        .find(|y| catalog::is_valid_year(*y as i64))
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Per-run index of each course's subjects by normalized name.
#[derive(Default)]
pub struct SubjectIndexCache {
    by_course: HashMap<String, HashMap<String, SubjectCourse>>,
}

impl SubjectIndexCache {
    pub fn index_for(
        &mut self,
        conn: &Connection,
        course_id: &str,
    ) -> rusqlite::Result<&HashMap<String, SubjectCourse>> {
        if !self.by_course.contains_key(course_id) {
            let index = build_subject_index(conn, course_id)?;
            tracing::debug!(course_id, subjects = index.len(), "subject index built");
            self.by_course.insert(course_id.to_string(), index);
        }
        Ok(&self.by_course[course_id])
    }

    #[cfg(test)]
    pub fn cached_courses(&self) -> usize {
        self.by_course.len()
    }
}

fn build_subject_index(
    conn: &Connection,
    course_id: &str,
) -> rusqlite::Result<HashMap<String, SubjectCourse>> {
    let mut stmt = conn.prepare(
        "SELECT id, subject_name, course_id, teacher_id
         FROM subject_courses
         WHERE course_id = ?
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([course_id], |r| {
            Ok(SubjectCourse {
                id: r.get(0)?,
                subject_name: r.get(1)?,
                course_id: r.get(2)?,
                teacher_id: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut index = HashMap::new();
    for s in rows {
        // First row wins when two subjects normalize to the same name.
        index.entry(normalize(&s.subject_name)).or_insert(s);
    }
    Ok(index)
}

pub fn classify(
    conn: &Connection,
    cache: &mut SubjectIndexCache,
    file_name: &str,
    year: u8,
    course_id: &str,
) -> Result<Classified, FileError> {
    let code = extract_code(file_name)?;
    let canonical_name =
        catalog::resolve(year, code).ok_or(FileError::UnknownCode { year, code })?;
    let index = cache.index_for(conn, course_id)?;
    let subject = index
        .get(&normalize(canonical_name))
        .cloned()
        .ok_or_else(|| FileError::SubjectNotInCourse {
            subject: canonical_name.to_string(),
        })?;
    Ok(Classified {
        code,
        canonical_name,
        subject,
    })
}
