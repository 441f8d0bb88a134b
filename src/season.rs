use crate::dlog;
use crate::error::SeasonError;
use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;

/// A recurring calendar anchor: the month and day a season starts every year.
///
/// Seasons travel in ordered lists; the list order, not the anchor value,
/// drives slice sequencing and wraparound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Season {
    month: u32,
    day: u32,
    name: String,
}

impl Season {
    /// Rejects February 29 outright and any month/day pair that is not a
    /// real calendar date in a common year.
    pub fn new(month: u32, day: u32, name: &str) -> Result<Self, SeasonError> {
        if month == 2 && day == 29 {
            return Err(SeasonError::LeapDayBoundary);
        }
        // 2001 is a common year, so this also catches things like April 31.
        if NaiveDate::from_ymd_opt(2001, month, day).is_none() {
            return Err(SeasonError::InvalidAnchor { month, day });
        }
        Ok(Self {
            month,
            day,
            name: name.to_string(),
        })
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn anchor(&self) -> (u32, u32) {
        (self.month, self.day)
    }

    /// The anchor as a concrete date in the given year. Cannot fail: leap-day
    /// anchors are rejected at construction.
    fn date_in(&self, year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
            .expect("anchor validated by Season::new")
    }
}

/// A season pinned to a specific year: a concrete, dated interval.
///
/// The end date is one second before the next season's anchor in the
/// correct year.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonSlice {
    pub season: Season,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
}

impl SeasonSlice {
    fn new(season: &Season, start_date: NaiveDateTime, next_season: &Season) -> Self {
        let mut end_year = start_date.year();
        // The next anchor falls in the following year unless it is strictly
        // later in the calendar than this one. Equal anchors (a single-season
        // list) wrap a whole year, keeping end_date after start_date.
        if next_season.anchor() <= season.anchor() {
            end_year += 1;
        }
        let end_date = next_season.date_in(end_year).and_time(NaiveTime::MIN) - Duration::seconds(1);
        Self {
            season: season.clone(),
            start_date,
            end_date,
        }
    }
}

/// Index of the season containing the given date: the last season in list
/// order whose (month, day) anchor is on or before the date's (month, day).
/// When none qualifies the date sits before the year's first anchor and the
/// last season (started the previous year) wins.
fn containing_season_index(seasons: &[Season], date: NaiveDateTime) -> usize {
    let target = (date.month(), date.day());
    let mut found = None;
    for (i, season) in seasons.iter().enumerate() {
        if season.anchor() <= target {
            found = Some(i);
        }
    }
    found.unwrap_or(seasons.len() - 1)
}

pub fn find_containing_season(
    seasons: &[Season],
    date: NaiveDateTime,
) -> Result<&Season, SeasonError> {
    if seasons.is_empty() {
        return Err(SeasonError::NoSeasons);
    }
    Ok(&seasons[containing_season_index(seasons, date)])
}

/// All season slices covering [first_activity_date, last_activity_date].
///
/// The first slice contains the first activity date (starting the previous
/// year when its anchor is later in the calendar than the date); each
/// following slice starts one second after its predecessor ends; the walk
/// stops once a slice ends past the last activity date. Pure and
/// deterministic for a given input triple.
pub fn build_season_slices(
    seasons: &[Season],
    first_activity_date: NaiveDateTime,
    last_activity_date: NaiveDateTime,
) -> Result<Vec<SeasonSlice>, SeasonError> {
    if seasons.is_empty() {
        return Err(SeasonError::NoSeasons);
    }

    let mut index = containing_season_index(seasons, first_activity_date);
    let season = &seasons[index];
    let mut start_year = first_activity_date.year();
    if season.anchor() > (first_activity_date.month(), first_activity_date.day()) {
        start_year -= 1;
    }
    let start_date = season.date_in(start_year).and_time(NaiveTime::MIN);
    dlog!(
        "first slice: season {} starting {start_date}",
        season.name()
    );

    let mut slices = vec![SeasonSlice::new(
        season,
        start_date,
        &seasons[(index + 1) % seasons.len()],
    )];

    loop {
        let last_end = slices[slices.len() - 1].end_date;
        if last_end > last_activity_date {
            break;
        }
        index = (index + 1) % seasons.len();
        let start_date = last_end + Duration::seconds(1);
        slices.push(SeasonSlice::new(
            &seasons[index],
            start_date,
            &seasons[(index + 1) % seasons.len()],
        ));
    }

    Ok(slices)
}

/// Twelve seasons anchored on the first of each month; the same slicing
/// machinery then doubles as monthly statistics.
pub fn monthly_seasons() -> Vec<Season> {
    const MONTHS: [&str; 12] = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];
    (1u32..=12)
        .zip(MONTHS)
        .map(|(month, name)| Season::new(month, 1, name).expect("day 1 exists in every month"))
        .collect()
}

/// One season anchored January 1: yearly statistics.
pub fn yearly_seasons() -> Vec<Season> {
    vec![Season::new(1, 1, "Year").expect("January 1 is always valid")]
}

/// Load a custom season list from a JSON array of
/// `{"month": M, "day": D, "name": N}` objects, in file order.
pub fn load_seasons(path: &Path) -> anyhow::Result<Vec<Season>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading seasons file: {}", path.display()))?;
    let doc: JsonValue = serde_json::from_str(&raw)
        .with_context(|| format!("parsing seasons file: {}", path.display()))?;
    let entries = doc.as_array().context("seasons file must be a JSON array")?;

    let mut seasons = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let month = entry
            .get("month")
            .and_then(JsonValue::as_u64)
            .with_context(|| format!("season #{}: missing numeric \"month\"", i + 1))?;
        let day = entry
            .get("day")
            .and_then(JsonValue::as_u64)
            .with_context(|| format!("season #{}: missing numeric \"day\"", i + 1))?;
        let name = entry
            .get("name")
            .and_then(JsonValue::as_str)
            .with_context(|| format!("season #{}: missing \"name\"", i + 1))?;
        seasons.push(Season::new(
            u32::try_from(month).unwrap_or(u32::MAX),
            u32::try_from(day).unwrap_or(u32::MAX),
            name,
        )?);
    }
    if seasons.is_empty() {
        anyhow::bail!("seasons file defines no seasons");
    }
    Ok(seasons)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn race_seasons() -> Vec<Season> {
        vec![
            Season::new(5, 1, "Pre Season").unwrap(),
            Season::new(7, 1, "Prime Season").unwrap(),
            Season::new(10, 1, "Post Season").unwrap(),
            Season::new(11, 1, "Off Season").unwrap(),
        ]
    }

    #[test]
    fn leap_day_anchor_rejected() {
        assert_eq!(Err(SeasonError::LeapDayBoundary), Season::new(2, 29, "Nope"));
    }

    #[test]
    fn impossible_anchors_rejected() {
        assert!(matches!(
            Season::new(4, 31, "Nope"),
            Err(SeasonError::InvalidAnchor { .. })
        ));
        assert!(matches!(
            Season::new(13, 1, "Nope"),
            Err(SeasonError::InvalidAnchor { .. })
        ));
        assert!(matches!(
            Season::new(1, 0, "Nope"),
            Err(SeasonError::InvalidAnchor { .. })
        ));
    }

    #[test]
    fn all_common_year_anchors_accepted() {
        for month in 1..=12u32 {
            for day in 1..=31u32 {
                let valid = NaiveDate::from_ymd_opt(2001, month, day).is_some();
                let season = Season::new(month, day, "S");
                assert_eq!(valid && (month, day) != (2, 29), season.is_ok());
            }
        }
    }

    #[test]
    fn finds_season_starting_on_or_before_date() {
        let seasons = race_seasons();
        let s = find_containing_season(&seasons, dt(2009, 5, 2, 12, 37, 25)).unwrap();
        assert_eq!("Pre Season", s.name());
    }

    #[test]
    fn finds_season_starting_exactly_on_date() {
        let seasons = race_seasons();
        let s = find_containing_season(&seasons, dt(2009, 11, 1, 0, 0, 0)).unwrap();
        assert_eq!("Off Season", s.name());
    }

    #[test]
    fn wraps_to_last_season_before_first_anchor() {
        let seasons = race_seasons();
        let slices =
            build_season_slices(&seasons, dt(2009, 1, 5, 0, 0, 0), dt(2009, 1, 5, 0, 0, 0))
                .unwrap();
        let first = &slices[0];
        assert_eq!("Off Season", first.season.name());
        assert_eq!(2008, first.start_date.year());
        assert_eq!(2009, first.end_date.year());
    }

    #[test]
    fn day_granularity_beats_month_granularity() {
        // Two seasons inside one month: the later one must win for a date
        // after its day-of-month.
        let seasons = vec![
            Season::new(5, 1, "Early May").unwrap(),
            Season::new(5, 15, "Late May").unwrap(),
        ];
        let s = find_containing_season(&seasons, dt(2009, 5, 20, 0, 0, 0)).unwrap();
        assert_eq!("Late May", s.name());
        let s = find_containing_season(&seasons, dt(2009, 5, 10, 0, 0, 0)).unwrap();
        assert_eq!("Early May", s.name());
    }

    #[test]
    fn first_slice_contains_its_activity_date() {
        let seasons = race_seasons();
        for date in [
            dt(2009, 1, 5, 0, 0, 0),
            dt(2009, 5, 1, 0, 0, 0),
            dt(2009, 6, 30, 23, 59, 59),
            dt(2009, 10, 15, 8, 0, 0),
            dt(2009, 12, 31, 23, 59, 59),
        ] {
            let slices = build_season_slices(&seasons, date, date).unwrap();
            assert!(slices[0].start_date <= date, "start after {date}");
            assert!(slices[0].end_date >= date, "end before {date}");
        }
    }

    #[test]
    fn monthly_slices_cover_a_winter_range() {
        let slices = build_season_slices(
            &monthly_seasons(),
            dt(2008, 12, 26, 15, 30, 0),
            dt(2009, 2, 22, 17, 0, 0),
        )
        .unwrap();
        assert_eq!(3, slices.len());
        assert_eq!("December", slices[0].season.name());
        assert_eq!("January", slices[1].season.name());
        assert_eq!("February", slices[2].season.name());
        assert_eq!(2008, slices[0].start_date.year());
        assert_eq!(2009, slices[1].start_date.year());
        assert_eq!(2009, slices[2].start_date.year());
    }

    #[test]
    fn yearly_slices_span_whole_years() {
        let slices = build_season_slices(
            &yearly_seasons(),
            dt(2008, 12, 26, 15, 30, 0),
            dt(2009, 2, 22, 17, 0, 0),
        )
        .unwrap();
        assert_eq!(2, slices.len());
        assert_eq!(dt(2008, 1, 1, 0, 0, 0), slices[0].start_date);
        assert_eq!(dt(2008, 12, 31, 23, 59, 59), slices[0].end_date);
        assert_eq!(dt(2009, 1, 1, 0, 0, 0), slices[1].start_date);
        assert_eq!(dt(2009, 12, 31, 23, 59, 59), slices[1].end_date);
    }

    #[test]
    fn slices_are_contiguous_ordered_and_cover_the_range() {
        let first = dt(2009, 5, 20, 14, 0, 0);
        let last = dt(2012, 12, 15, 4, 0, 0);
        let slices = build_season_slices(&race_seasons(), first, last).unwrap();
        assert!(slices[0].start_date <= first);
        assert!(slices[slices.len() - 1].end_date >= last);
        for pair in slices.windows(2) {
            assert_eq!(pair[0].end_date + Duration::seconds(1), pair[1].start_date);
        }
        for slice in &slices {
            assert!(slice.end_date > slice.start_date);
        }
    }

    #[test]
    fn empty_season_list_is_an_error() {
        assert_eq!(
            Err(SeasonError::NoSeasons),
            build_season_slices(&[], dt(2009, 1, 1, 0, 0, 0), dt(2009, 1, 2, 0, 0, 0))
        );
        assert!(matches!(
            find_containing_season(&[], dt(2009, 1, 1, 0, 0, 0)),
            Err(SeasonError::NoSeasons)
        ));
    }
}
