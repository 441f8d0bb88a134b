use crate::database::{SportMatch, Store};
use crate::dlog;
use crate::error::ImportError;
use crate::tcx::{self, ParsedActivity};
use crate::types::{ImportRecord, Sport};
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use walkdir::WalkDir;

/// Below this whole-activity speed a recording labelled "running" is stored
/// as walking (6000 meters per hour).
pub const WALK_SPEED_THRESHOLD_M_S: f64 = 6000.0 / 3600.0;

const RECORDING_EXTENSION: &str = "tcx";

// Recording file names carry the transfer timestamp, e.g.
// 2009-02-21-15-02-21.tcx.
static STEM_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})-(\d{2})-(\d{2})-(\d{2})$").expect("valid regex")
});

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    pub activities: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The file was new; this many activities were stored.
    Imported(usize),
    /// An import record already covers this file. Not an error.
    AlreadyImported,
}

/// Imports recording files through an explicitly supplied store handle.
pub struct Importer<'a> {
    store: &'a mut Store,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// Recursively import every recording under `dir`, one file per
    /// transaction. A file that fails is logged and skipped; the scan keeps
    /// going so one bad recording cannot block the rest of the directory.
    pub fn scan_directory(&mut self, dir: &Path) -> Result<ScanSummary, ImportError> {
        if !dir.is_dir() {
            return Err(ImportError::DirectoryNotFound(dir.to_path_buf()));
        }
        dlog!("scanning {} for new recordings", dir.display());

        let mut summary = ScanSummary::default();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(err = %e, "unreadable directory entry");
                    summary.failed += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() || !has_recording_extension(entry.path()) {
                continue;
            }
            match self.import_file(entry.path()) {
                Ok(ImportOutcome::Imported(n)) => {
                    summary.imported += 1;
                    summary.activities += n;
                }
                Ok(ImportOutcome::AlreadyImported) => summary.skipped += 1,
                Err(e) => {
                    tracing::warn!(file = %entry.path().display(), err = %e, "import failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            imported = summary.imported,
            skipped = summary.skipped,
            failed = summary.failed,
            activities = summary.activities,
            "scan done"
        );
        Ok(summary)
    }

    /// Import one recording file: parse, classify, persist the activity
    /// graphs and the import record in a single transaction. A file whose
    /// identifier already has an import record is a no-op.
    pub fn import_file(&mut self, path: &Path) -> Result<ImportOutcome, ImportError> {
        if !path.is_file() {
            return Err(ImportError::FileNotFound(path.to_path_buf()));
        }

        let identifier = file_identifier(path)?;
        if self.store.find_import_record(&identifier)?.is_some() {
            tracing::info!(file = %path.display(), "already imported, skipping");
            return Ok(ImportOutcome::AlreadyImported);
        }
        tracing::info!(file = %path.display(), "importing");

        // The file name timestamp is display/sanity data only; the activity's
        // own Id element is authoritative.
        let recorded_at = stem_timestamp(&identifier);
        if recorded_at.is_none() {
            dlog!("file name {identifier} does not carry a timestamp");
        }

        let parsed = tcx::parse_file(path)?;
        let mut resolved = Vec::with_capacity(parsed.len());
        for activity in parsed {
            if let Some(stamp) = recorded_at
                && stamp.date() != activity.start_time.date()
            {
                dlog!(
                    "file name date {stamp} differs from activity start {}",
                    activity.start_time
                );
            }
            let sport = self.resolve_sport(&activity)?;
            resolved.push((sport, activity));
        }

        let count = resolved.len();
        self.store
            .save_imported(&resolved, &ImportRecord::for_file(identifier))?;
        Ok(ImportOutcome::Imported(count))
    }

    /// The recording's declared label, lowercased, resolved against the
    /// canonical sports. A "running" label is demoted to walking when the
    /// whole-activity speed sits below the walk threshold.
    fn resolve_sport(&self, activity: &ParsedActivity) -> Result<Sport, ImportError> {
        let mut label = activity.sport_label.to_lowercase();
        if label == "running" {
            let distance: f64 = activity.laps.iter().map(|l| l.distance_m).sum();
            let duration: f64 = activity.laps.iter().map(|l| l.duration_s).sum();
            let speed = if duration > 0.0 { distance / duration } else { 0.0 };
            if speed < WALK_SPEED_THRESHOLD_M_S {
                dlog!("speed {speed:.3} m/s is below the walk threshold, reclassifying");
                label = "walking".to_string();
            }
        }
        match self.store.find_sport_like(&label)? {
            SportMatch::Found(sport) => Ok(sport),
            SportMatch::NotFound => Err(ImportError::UnknownSport(activity.sport_label.clone())),
            SportMatch::Ambiguous(_) => {
                Err(ImportError::AmbiguousSport(activity.sport_label.clone()))
            }
        }
    }
}

fn has_recording_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(RECORDING_EXTENSION))
}

fn file_identifier(path: &Path) -> Result<String, ImportError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ImportError::MalformedInput(format!("unusable file name: {}", path.display())))?;
    Ok(stem.to_string())
}

fn stem_timestamp(identifier: &str) -> Option<NaiveDateTime> {
    let caps = STEM_TIMESTAMP.captures(identifier)?;
    let field = |i: usize| caps[i].parse::<u32>().ok();
    let year = i32::try_from(field(1)?).ok()?;
    NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)?.and_hms_opt(
        field(4)?,
        field(5)?,
        field(6)?,
    )
}
