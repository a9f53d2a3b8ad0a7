use chrono::{Local, NaiveDateTime};

/// One verbatim copy of a source line plus the time the loader wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub raw_line: String,
    pub inserted_at: NaiveDateTime,
}

impl RawRecord {
    /// Stamps `line` with the current local time. Surrounding whitespace, including the
    /// line terminator, is trimmed once; everything inside is kept as is.
    pub fn from_line(line: &str) -> Self {
        Self::with_timestamp(line, Local::now().naive_local())
    }

    pub fn with_timestamp(line: &str, inserted_at: NaiveDateTime) -> Self {
        RawRecord { raw_line: line.trim().to_string(), inserted_at }
    }
}
