#![deny(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::Parser;
use redadeg::cli::{Cli, Cmd, Period};
use redadeg::database::Store;
use redadeg::ingest::Importer;
use redadeg::{map, season, stats, utils};
use std::fs;
use std::path::{Path, PathBuf};

#[macro_use]
extern crate redadeg;

fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::init_logging(cli.verbose, cli.quiet);

    match cli.cmd {
        Some(Cmd::Ingest { dir }) => ingest(&cli.db, &dir),
        Some(Cmd::Stats {
            sport,
            period,
            seasons,
        }) => report(&cli.db, &sport, period, seasons.as_deref()),
        Some(Cmd::Map { id, out }) => write_map(&cli.db, id, out),
        Some(Cmd::Delete { id }) => delete(&cli.db, id),
        None => list(&cli.db, cli.sport.as_deref(), cli.count),
    }
}

fn ingest(db: &Path, dir: &Path) -> Result<()> {
    dlog!("mode=ingest dir={} db={}", dir.display(), db.display());
    let mut store = Store::open(db)?;
    let summary = Importer::new(&mut store).scan_directory(dir)?;
    println!(
        "imported {} file(s) ({} activities), skipped {}, failed {}",
        summary.imported, summary.activities, summary.skipped, summary.failed
    );
    Ok(())
}

fn list(db: &Path, sport: Option<&str>, count: usize) -> Result<()> {
    dlog!("mode=list db={}", db.display());
    let store = Store::open(db)?;
    let activities = store.query_activities(sport, None)?;
    if activities.is_empty() {
        anyhow::bail!("No activities in the database. Run `redadeg ingest <DIR>` first.");
    }
    for a in activities.iter().take(count) {
        let km = a.distance_meters() / 1000.0;
        println!(
            "{}\t{}\t{}\t{km:.2} km\t{}",
            a.id,
            a.start_time,
            a.sport.name,
            utils::format_time_str(a.duration_seconds())
        );
    }
    Ok(())
}

fn report(db: &Path, sport: &str, period: Period, seasons_file: Option<&Path>) -> Result<()> {
    dlog!("mode=stats sport={sport} db={}", db.display());
    let store = Store::open(db)?;
    let seasons = match seasons_file {
        Some(path) => season::load_seasons(path)?,
        None => match period {
            Period::Monthly => season::monthly_seasons(),
            Period::Yearly => season::yearly_seasons(),
        },
    };
    let rows = stats::season_report(&store, sport, &seasons)?;
    if rows.is_empty() {
        println!("no {sport} activities recorded");
        return Ok(());
    }
    for row in rows {
        let hr = row
            .heart_rate_avg
            .map_or_else(|| "-".to_string(), |v| format!("{v:.0} bpm"));
        println!(
            "{}\t{:.2} km\t{}\t{:.2} km/h\t{} /km\t{hr}",
            row.label,
            row.distance_m / 1000.0,
            utils::format_time_str(row.duration_s),
            row.speed_km_h,
            utils::format_time_str(row.pace_s_per_km)
        );
    }
    Ok(())
}

fn write_map(db: &Path, id: i64, out: Option<PathBuf>) -> Result<()> {
    dlog!("mode=map id={id} db={}", db.display());
    let store = Store::open(db)?;
    let activity = store
        .load_activity(id)?
        .with_context(|| format!("no activity with id {id}"))?;
    let html = map::activity_map_html(&activity);
    let out = out.unwrap_or_else(|| {
        std::env::temp_dir().join(format!("redadeg-{id}-{}.html", activity.sport.name))
    });
    fs::write(&out, html).with_context(|| format!("writing {}", out.display()))?;
    println!("{}", out.display());
    Ok(())
}

fn delete(db: &Path, id: i64) -> Result<()> {
    let mut store = Store::open(db)?;
    if !store.delete_activity(id)? {
        anyhow::bail!("no activity with id {id}");
    }
    println!("deleted activity {id}");
    Ok(())
}
