use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while importing recordings.
///
/// During a directory scan these are fatal to the offending file only, never
/// to the batch. A file that was already imported is not an error at all.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no such directory: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("no such file: {0}")]
    FileNotFound(PathBuf),

    #[error("malformed recording: {0}")]
    MalformedInput(String),

    /// The recording declares a sport no canonical sport matches. Hard error:
    /// importing must never invent sport rows.
    #[error("no sport matches label {0:?}")]
    UnknownSport(String),

    #[error("sport label {0:?} matches more than one sport")]
    AmbiguousSport(String),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Raised when a season list is defined, not when slices are computed:
/// anchor validity depends only on static configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeasonError {
    /// Slice arithmetic assumes every anchored year has the anchor date,
    /// which rules out February 29.
    #[error("a season cannot start on a leap day")]
    LeapDayBoundary,

    #[error("no calendar date for month {month} day {day}")]
    InvalidAnchor { month: u32, day: u32 },

    #[error("season list is empty")]
    NoSeasons,
}
