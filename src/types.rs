use chrono::NaiveDateTime;

/// Sport names seeded into every new database. Imports resolve against these
/// and only these; nothing ever adds a row at import time.
pub const CANONICAL_SPORTS: [&str; 4] = ["running", "biking", "walking", "other"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sport {
    pub id: i64,
    pub name: String,
}

/// One recorded session, loaded together with its laps.
///
/// Distance, duration and heart rate are derived from the lap graph on
/// demand, never stored.
#[derive(Debug, Clone)]
pub struct Activity {
    pub id: i64,
    /// Naive local timestamp; unique across all activities.
    pub start_time: NaiveDateTime,
    pub sport: Sport,
    pub laps: Vec<Lap>,
}

#[derive(Debug, Clone)]
pub struct Lap {
    pub start_time: NaiveDateTime,
    pub duration_s: f64,
    pub distance_m: f64,
    pub max_speed_m_s: f64,
    pub calories: Option<u32>,
    pub max_heart_rate: Option<u32>,
    pub avg_heart_rate: Option<u32>,
    pub trackpoints: Vec<Trackpoint>,
}

#[derive(Debug, Clone)]
pub struct Trackpoint {
    pub time: NaiveDateTime,
    /// None marks a logging pause, not a zero coordinate.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_m: Option<f64>,
    /// Cumulative meters since the activity start.
    pub distance_m: Option<f64>,
    pub heart_rate: Option<u32>,
}

/// Marks a source file as ingested. Its presence is the sole authority for
/// "already imported", even if the file itself is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    /// Reserved for non-file sources; currently always "file".
    pub source_type: String,
    /// The source file's base name without its extension.
    pub identifier: String,
}

impl ImportRecord {
    pub fn for_file(identifier: impl Into<String>) -> Self {
        Self {
            source_type: "file".to_string(),
            identifier: identifier.into(),
        }
    }
}

impl Activity {
    pub fn distance_meters(&self) -> f64 {
        self.laps.iter().map(|l| l.distance_m).sum()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.laps.iter().map(|l| l.duration_s).sum()
    }

    /// Duration-weighted average heart rate across laps.
    ///
    /// None when any lap has no reading or the total duration is zero.
    pub fn heart_rate_avg(&self) -> Option<f64> {
        let total = self.duration_seconds();
        if total <= 0.0 {
            return None;
        }
        let mut weighted = 0.0;
        for lap in &self.laps {
            weighted += f64::from(lap.avg_heart_rate?) * lap.duration_s;
        }
        Some(weighted / total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn lap(duration_s: f64, distance_m: f64, avg_heart_rate: Option<u32>) -> Lap {
        Lap {
            start_time: NaiveDate::from_ymd_opt(2009, 2, 21)
                .unwrap()
                .and_hms_opt(15, 2, 21)
                .unwrap(),
            duration_s,
            distance_m,
            max_speed_m_s: 3.0,
            calories: None,
            max_heart_rate: None,
            avg_heart_rate,
            trackpoints: Vec::new(),
        }
    }

    fn activity(laps: Vec<Lap>) -> Activity {
        Activity {
            id: 1,
            start_time: NaiveDate::from_ymd_opt(2009, 2, 21)
                .unwrap()
                .and_hms_opt(15, 2, 21)
                .unwrap(),
            sport: Sport {
                id: 1,
                name: "running".to_string(),
            },
            laps,
        }
    }

    #[test]
    fn distance_and_duration_sum_over_laps() {
        let a = activity(vec![lap(600.0, 1500.0, None), lap(300.0, 800.0, None)]);
        assert!((a.distance_meters() - 2300.0).abs() < f64::EPSILON);
        assert!((a.duration_seconds() - 900.0).abs() < f64::EPSILON);
    }

    #[test]
    fn heart_rate_avg_is_duration_weighted() {
        let a = activity(vec![
            lap(600.0, 1500.0, Some(120)),
            lap(300.0, 800.0, Some(150)),
        ]);
        let avg = a.heart_rate_avg().unwrap();
        assert!((avg - 130.0).abs() < 1e-9);
    }

    #[test]
    fn heart_rate_avg_absent_when_any_lap_lacks_data() {
        let a = activity(vec![lap(600.0, 1500.0, Some(120)), lap(300.0, 800.0, None)]);
        assert_eq!(None, a.heart_rate_avg());
    }

    #[test]
    fn heart_rate_avg_absent_for_empty_activity() {
        assert_eq!(None, activity(Vec::new()).heart_rate_avg());
    }
}
