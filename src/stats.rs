use crate::database::Store;
use crate::season::{Season, SeasonSlice, build_season_slices};
use crate::types::Activity;
use crate::utils::{calculate_pace, calculate_speed};
use chrono::Datelike;

/// Aggregated totals for one sport over one season slice.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    /// "{season name} {start year}", e.g. "February 2009".
    pub label: String,
    pub distance_m: f64,
    pub duration_s: f64,
    pub speed_km_h: f64,
    pub pace_s_per_km: f64,
    /// Duration-weighted average over the slice's activities; absent when the
    /// slice is empty or any activity in it has no heart-rate average.
    pub heart_rate_avg: Option<f64>,
}

/// Sum distance and duration over the activities that fall inside the slice
/// and derive speed and pace from the totals.
pub fn aggregate_slice(slice: &SeasonSlice, activities: &[Activity]) -> MetricsRow {
    let mut distance_m = 0.0;
    let mut duration_s = 0.0;
    let mut hr_weighted = 0.0;
    let mut hr_duration = 0.0;
    let mut hr_complete = true;
    let mut any = false;

    for activity in activities {
        if activity.start_time < slice.start_date || activity.start_time > slice.end_date {
            continue;
        }
        any = true;
        let activity_duration = activity.duration_seconds();
        distance_m += activity.distance_meters();
        duration_s += activity_duration;
        match activity.heart_rate_avg() {
            Some(avg) => {
                hr_weighted += avg * activity_duration;
                hr_duration += activity_duration;
            }
            None => hr_complete = false,
        }
    }

    let heart_rate_avg =
        (any && hr_complete && hr_duration > 0.0).then(|| hr_weighted / hr_duration);

    MetricsRow {
        label: format!("{} {}", slice.season.name(), slice.start_date.year()),
        distance_m,
        duration_s,
        speed_km_h: calculate_speed(distance_m, duration_s),
        pace_s_per_km: calculate_pace(distance_m, duration_s),
        heart_rate_avg,
    }
}

/// One row per slice covering the sport's full recorded date range, in slice
/// order. Empty when the sport has no activities at all.
pub fn season_report(
    store: &Store,
    sport: &str,
    seasons: &[Season],
) -> anyhow::Result<Vec<MetricsRow>> {
    let Some((first, last)) = store.activity_date_range(Some(sport))? else {
        return Ok(Vec::new());
    };
    let slices = build_season_slices(seasons, first, last)?;

    let mut rows = Vec::with_capacity(slices.len());
    for slice in &slices {
        let activities =
            store.query_activities(Some(sport), Some((slice.start_date, slice.end_date)))?;
        rows.push(aggregate_slice(slice, &activities));
    }
    Ok(rows)
}
