use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const DEFAULT_DB: &str = "redadeg.db";

#[derive(Parser, Debug)]
#[command(
    name = "redadeg",
    about = "Import Garmin TCX workouts into SQLite and report per-season statistics"
)]
pub struct Cli {
    /// SQLite database file. Created (and seeded) on first use.
    #[arg(long, default_value = DEFAULT_DB, global = true)]
    pub db: PathBuf,

    /// Only list activities of this sport (default mode).
    #[arg(long)]
    pub sport: Option<String>,

    /// Maximum number of activities printed by the default listing.
    #[arg(long, default_value_t = 50)]
    pub count: usize,

    /// Increase log verbosity (-v, -vv). Defaults to INFO.
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Decrease log verbosity (-q, -qq). Defaults to INFO.
    #[arg(short = 'q', long, action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[command(subcommand)]
    pub cmd: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Import every new .tcx recording found under a directory.
    Ingest {
        /// Directory scanned recursively for recordings.
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Per-season totals for one sport.
    Stats {
        /// Sport to report on.
        #[arg(long, default_value = "running")]
        sport: String,

        /// Built-in season layout.
        #[arg(long, value_enum, default_value = "monthly", conflicts_with = "seasons")]
        period: Period,

        /// JSON file with custom season anchors, in order:
        /// [{"month": 5, "day": 1, "name": "Pre Season"}, ...]
        #[arg(long, value_name = "FILE")]
        seasons: Option<PathBuf>,
    },
    /// Write an HTML map page for one activity's track.
    Map {
        /// Activity id as shown by the listing.
        id: i64,

        /// Output file. Defaults to a file in the platform temp directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete one activity along with its laps and trackpoints.
    Delete { id: i64 },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Period {
    Monthly,
    Yearly,
}
