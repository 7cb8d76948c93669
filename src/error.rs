//! Per-file failure reasons for the content import pipeline.

use thiserror::Error;

/// Why a single source file could not be imported.
///
/// The `Display` text is what the caller shows next to the file name, so
/// every message must read as a complete sentence fragment for a person.
#[derive(Error, Debug)]
pub enum FileError {
    /// File name does not end with `(<digits>).<ext>`.
    #[error("bad filename format: expected a subject code like \"(7)\" before the extension")]
    BadFilenameFormat,

    /// The code is not in the year's subject table.
    #[error("unknown subject code {code} for year {year}")]
    UnknownCode { year: u8, code: u32 },

    /// The catalog subject is not taught in the target course.
    #[error("subject \"{subject}\" is not assigned to the target course")]
    SubjectNotInCourse { subject: String },

    /// None of the configured encodings produced usable text.
    #[error("could not decode file contents")]
    Undecodable,

    /// Neither the third line nor an "N-th year" line holds content titles.
    #[error("no content-title row found")]
    NoTitleRow,

    /// Multi-year mode could not place the file in an academic year.
    #[error("could not determine academic year from file name or contents")]
    YearUndetermined,

    #[error("course {course_id} not found")]
    UnknownCourse { course_id: String },

    #[error("course {course_id} belongs to year {course_year}, not year {year}")]
    CourseYearMismatch {
        course_id: String,
        course_year: i64,
        year: u8,
    },

    #[error("no course found for year {year}")]
    CourseNotFound { year: u8 },

    #[error("several courses found for year {year}; pass coursesByYear")]
    CourseAmbiguous { year: u8 },

    /// A folder or bundle entry that could not be read.
    #[error("could not read source file: {0}")]
    Unreadable(String),

    /// Row store failure while reading or writing.
    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl FileError {
    /// Pipeline stage the failure belongs to, for logs and the outcome record.
    pub fn stage(&self) -> &'static str {
        match self {
            FileError::BadFilenameFormat
            | FileError::UnknownCode { .. }
            | FileError::SubjectNotInCourse { .. }
            | FileError::YearUndetermined
            | FileError::UnknownCourse { .. }
            | FileError::CourseYearMismatch { .. }
            | FileError::CourseNotFound { .. }
            | FileError::CourseAmbiguous { .. } => "classify",
            FileError::Undecodable | FileError::NoTitleRow | FileError::Unreadable(_) => {
                "extract"
            }
            FileError::Store(_) => "upsert",
        }
    }
}
