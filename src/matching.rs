//! Reconciles hand-typed student names from exports against enrolled students.
//!
//! A match is accepted on exact normalized equality with any name-order
//! variant, or when the best similarity score is strictly above
//! [`ACCEPT_THRESHOLD`]. Scores in the (`NEAR_MISS_THRESHOLD`, `ACCEPT_THRESHOLD`]
//! band are logged and rejected: a false positive writes grades into another
//! student's record.

use crate::normalize::normalize;
use rusqlite::Connection;
use std::collections::HashMap;

pub const ACCEPT_THRESHOLD: f64 = 85.0;
pub const NEAR_MISS_THRESHOLD: f64 = 75.0;

/// Similarity metric on normalized strings, 0..=100.
pub trait SimilarityStrategy {
    fn score(&self, a: &str, b: &str) -> f64;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Similarity {
    CharacterOverlap,
    JaroWinkler,
}

impl Similarity {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "overlap" | "character_overlap" => Some(Similarity::CharacterOverlap),
            "jaro_winkler" => Some(Similarity::JaroWinkler),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Similarity::CharacterOverlap => "overlap",
            Similarity::JaroWinkler => "jaro_winkler",
        }
    }
}

impl SimilarityStrategy for Similarity {
    fn score(&self, a: &str, b: &str) -> f64 {
        match self {
            Similarity::CharacterOverlap => CharacterOverlap.score(a, b),
            Similarity::JaroWinkler => JaroWinkler.score(a, b),
        }
    }
}

/// Matching characters (sum of recursively found longest common substrings)
/// relative to the combined length: `2 * matches * 100 / (len(a) + len(b))`.
pub struct CharacterOverlap;

impl SimilarityStrategy for CharacterOverlap {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let total = a.len() + b.len();
        if total == 0 {
            return 0.0;
        }
        (common_chars(&a, &b) * 2) as f64 * 100.0 / total as f64
    }
}

fn common_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (mut best_len, mut best_a, mut best_b) = (0usize, 0usize, 0usize);
    for i in 0..a.len() {
        for j in 0..b.len() {
            let mut k = 0;
            while i + k < a.len() && j + k < b.len() && a[i + k] == b[j + k] {
                k += 1;
            }
            if k > best_len {
                best_len = k;
                best_a = i;
                best_b = j;
            }
        }
    }
    if best_len == 0 {
        return 0;
    }
    best_len
        + common_chars(&a[..best_a], &b[..best_b])
        + common_chars(&a[best_a + best_len..], &b[best_b + best_len..])
}

pub struct JaroWinkler;

impl SimilarityStrategy for JaroWinkler {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::jaro_winkler(a, b) * 100.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnrollmentKind {
    Regular,
    Recursando,
}

#[derive(Clone, Debug)]
pub struct StudentCandidate {
    pub id: String,
    pub last_name: String,
    pub first_name: String,
    pub kind: EnrollmentKind,
}

impl StudentCandidate {
    /// "Last, First", "Last First" and "First Last", normalized.
    pub fn name_variants(&self) -> [String; 3] {
        let last = self.last_name.trim();
        let first = self.first_name.trim();
        [
            normalize(&format!("{}, {}", last, first)),
            normalize(&format!("{} {}", last, first)),
            normalize(&format!("{} {}", first, last)),
        ]
    }
}

/// Per-run candidate lists keyed by subject-course id.
#[derive(Default)]
pub struct StudentCache {
    by_subject: HashMap<String, Vec<StudentCandidate>>,
}

impl StudentCache {
    pub fn candidates_for(
        &mut self,
        conn: &Connection,
        subject_course_id: &str,
    ) -> rusqlite::Result<&[StudentCandidate]> {
        if !self.by_subject.contains_key(subject_course_id) {
            let list = load_candidates(conn, subject_course_id)?;
            tracing::debug!(
                subject_course_id,
                candidates = list.len(),
                "student candidates loaded"
            );
            self.by_subject.insert(subject_course_id.to_string(), list);
        }
        Ok(&self.by_subject[subject_course_id])
    }

    #[cfg(test)]
    pub fn cached_subjects(&self) -> usize {
        self.by_subject.len()
    }
}

fn load_candidates(
    conn: &Connection,
    subject_course_id: &str,
) -> rusqlite::Result<Vec<StudentCandidate>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.last_name, s.first_name, 0
         FROM students s
         JOIN subject_courses sc ON sc.course_id = s.course_id
         WHERE sc.id = ?1 AND s.active = 1
         UNION ALL
         SELECT s.id, s.last_name, s.first_name, 1
         FROM retake_enrollments r
         JOIN students s ON s.id = r.student_id
         WHERE r.subject_course_id = ?1 AND r.active = 1",
    )?;
    let rows = stmt
        .query_map([subject_course_id], |r| {
            Ok(StudentCandidate {
                id: r.get(0)?,
                last_name: r.get(1)?,
                first_name: r.get(2)?,
                kind: if r.get::<_, i64>(3)? != 0 {
                    EnrollmentKind::Recursando
                } else {
                    EnrollmentKind::Regular
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Clone, Debug)]
pub struct NearMiss {
    pub student_id: String,
    pub score: f64,
}

pub enum MatchResult<'a> {
    Matched(&'a StudentCandidate),
    NotFound(Option<NearMiss>),
}

/// Best candidate for `raw_name`, or `NotFound` carrying the near-miss (if any)
/// so callers can report it.
pub fn best_match<'a>(
    raw_name: &str,
    candidates: &'a [StudentCandidate],
    strategy: &dyn SimilarityStrategy,
) -> MatchResult<'a> {
    let needle = normalize(raw_name);
    if needle.is_empty() {
        return MatchResult::NotFound(None);
    }

    let mut best: Option<(&StudentCandidate, f64)> = None;
    for candidate in candidates {
        for variant in candidate.name_variants() {
            if variant == needle {
                return MatchResult::Matched(candidate);
            }
            let score = strategy.score(&needle, &variant);
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((candidate, score));
            }
        }
    }

    match best {
        Some((candidate, score)) if score > ACCEPT_THRESHOLD => MatchResult::Matched(candidate),
        Some((candidate, score)) if score > NEAR_MISS_THRESHOLD => {
            MatchResult::NotFound(Some(NearMiss {
                student_id: candidate.id.clone(),
                score,
            }))
        }
        _ => MatchResult::NotFound(None),
    }
}

/// Looks up the candidates for a subject through the cache and matches.
pub fn match_student<'c>(
    conn: &Connection,
    cache: &'c mut StudentCache,
    subject_course_id: &str,
    raw_name: &str,
    strategy: &dyn SimilarityStrategy,
) -> rusqlite::Result<Option<&'c StudentCandidate>> {
    let candidates = cache.candidates_for(conn, subject_course_id)?;
    match best_match(raw_name, candidates, strategy) {
        MatchResult::Matched(c) => Ok(Some(c)),
        MatchResult::NotFound(Some(near)) => {
            tracing::debug!(
                raw_name,
                student_id = %near.student_id,
                score = near.score,
                "near-miss student match rejected"
            );
            Ok(None)
        }
        MatchResult::NotFound(None) => Ok(None),
    }
}
