use crate::dlog;
use crate::error::ImportError;
use crate::tcx::ParsedActivity;
use crate::types::{Activity, CANONICAL_SPORTS, ImportRecord, Lap, Sport, Trackpoint};
use chrono::{DateTime, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::Path;

/// Explicit handle around one SQLite connection. Callers own it and pass it
/// where it is needed; there is no process-wide session.
pub struct Store {
    conn: Connection,
}

/// Outcome of a sport lookup. Classification maps NotFound and Ambiguous to
/// hard errors instead of inventing rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SportMatch {
    Found(Sport),
    NotFound,
    Ambiguous(usize),
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        dlog!("opening database {}", path.display());
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, ImportError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, ImportError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        ensure_schema(&conn)?;
        seed_sports(&conn)?;
        Ok(Self { conn })
    }

    pub fn find_import_record(
        &self,
        identifier: &str,
    ) -> Result<Option<ImportRecord>, ImportError> {
        let record = self
            .conn
            .query_row(
                "SELECT source_type, identifier FROM import_record WHERE identifier = ?1",
                [identifier],
                |row| {
                    Ok(ImportRecord {
                        source_type: row.get(0)?,
                        identifier: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Case-sensitive substring lookup against the seeded sport names.
    pub fn find_sport_like(&self, label: &str) -> Result<SportMatch, ImportError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM sport WHERE instr(name, ?1) > 0 ORDER BY id")?;
        let mut sports = stmt
            .query_map([label], |row| {
                Ok(Sport {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match sports.len() {
            0 => SportMatch::NotFound,
            1 => SportMatch::Found(sports.remove(0)),
            n => SportMatch::Ambiguous(n),
        })
    }

    /// Persist every activity graph from one source file plus its import
    /// record in a single transaction, so a crash can never leave the marker
    /// without the data or the data without the marker.
    pub fn save_imported(
        &mut self,
        activities: &[(Sport, ParsedActivity)],
        record: &ImportRecord,
    ) -> Result<Vec<i64>, ImportError> {
        let tx = self.conn.transaction()?;
        let mut ids = Vec::with_capacity(activities.len());
        for (sport, activity) in activities {
            ids.push(insert_activity(&tx, sport, activity)?);
        }
        tx.execute(
            "INSERT INTO import_record (source_type, identifier) VALUES (?1, ?2)",
            params![record.source_type, record.identifier],
        )?;
        tx.commit()?;
        Ok(ids)
    }

    /// Activities ordered by start time, optionally restricted to one sport
    /// and/or an inclusive start-time range. Laps are loaded, trackpoints are
    /// not (use `load_activity` for the full graph).
    pub fn query_activities(
        &self,
        sport: Option<&str>,
        range: Option<(NaiveDateTime, NaiveDateTime)>,
    ) -> Result<Vec<Activity>, ImportError> {
        let (from_ts, to_ts) = match range {
            Some((from, to)) => (Some(timestamp(from)), Some(timestamp(to))),
            None => (None, None),
        };
        let mut stmt = self.conn.prepare(
            "SELECT a.id, a.start_time, s.id, s.name
             FROM activity a JOIN sport s ON s.id = a.sport_id
             WHERE (?1 IS NULL OR s.name = ?1)
               AND (?2 IS NULL OR a.start_time >= ?2)
               AND (?3 IS NULL OR a.start_time <= ?3)
             ORDER BY a.start_time",
        )?;
        let mut rows = stmt.query(params![sport, from_ts, to_ts])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let start_ts: i64 = row.get(1)?;
            let Some(start_time) = from_timestamp(start_ts) else {
                dlog!("bad start_time {start_ts} for activity {id}");
                continue;
            };
            out.push(Activity {
                id,
                start_time,
                sport: Sport {
                    id: row.get(2)?,
                    name: row.get(3)?,
                },
                laps: self.laps_for(id, false)?,
            });
        }
        Ok(out)
    }

    /// One activity with its full lap and trackpoint graph.
    pub fn load_activity(&self, id: i64) -> Result<Option<Activity>, ImportError> {
        let head = self
            .conn
            .query_row(
                "SELECT a.start_time, s.id, s.name
                 FROM activity a JOIN sport s ON s.id = a.sport_id
                 WHERE a.id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((start_ts, sport_id, sport_name)) = head else {
            return Ok(None);
        };
        let Some(start_time) = from_timestamp(start_ts) else {
            dlog!("bad start_time {start_ts} for activity {id}");
            return Ok(None);
        };
        Ok(Some(Activity {
            id,
            start_time,
            sport: Sport {
                id: sport_id,
                name: sport_name,
            },
            laps: self.laps_for(id, true)?,
        }))
    }

    /// Earliest and latest activity start times, optionally per sport.
    pub fn activity_date_range(
        &self,
        sport: Option<&str>,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, ImportError> {
        let bounds = self.conn.query_row(
            "SELECT MIN(a.start_time), MAX(a.start_time)
             FROM activity a JOIN sport s ON s.id = a.sport_id
             WHERE (?1 IS NULL OR s.name = ?1)",
            params![sport],
            |row| {
                Ok((
                    row.get::<_, Option<i64>>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                ))
            },
        )?;
        match bounds {
            (Some(min), Some(max)) => Ok(from_timestamp(min).zip(from_timestamp(max))),
            _ => Ok(None),
        }
    }

    /// Laps and trackpoints go with the activity via the cascade.
    pub fn delete_activity(&mut self, id: i64) -> Result<bool, ImportError> {
        let deleted = self.conn.execute("DELETE FROM activity WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    fn laps_for(&self, activity_id: i64, with_points: bool) -> Result<Vec<Lap>, ImportError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, duration_s, distance_m, max_speed_m_s,
                    calories, max_heart_rate, avg_heart_rate
             FROM lap WHERE activity_id = ?1 ORDER BY id",
        )?;
        let mut rows = stmt.query([activity_id])?;

        let mut laps = Vec::new();
        while let Some(row) = rows.next()? {
            let lap_id: i64 = row.get(0)?;
            let start_ts: i64 = row.get(1)?;
            let Some(start_time) = from_timestamp(start_ts) else {
                dlog!("bad start_time {start_ts} for lap {lap_id}");
                continue;
            };
            laps.push(Lap {
                start_time,
                duration_s: row.get(2)?,
                distance_m: row.get(3)?,
                max_speed_m_s: row.get(4)?,
                calories: row.get(5)?,
                max_heart_rate: row.get(6)?,
                avg_heart_rate: row.get(7)?,
                trackpoints: if with_points {
                    self.trackpoints_for(lap_id)?
                } else {
                    Vec::new()
                },
            });
        }
        Ok(laps)
    }

    fn trackpoints_for(&self, lap_id: i64) -> Result<Vec<Trackpoint>, ImportError> {
        let mut stmt = self.conn.prepare(
            "SELECT time, latitude, longitude, altitude_m, distance_m, heart_rate
             FROM trackpoint WHERE lap_id = ?1 ORDER BY id",
        )?;
        let mut rows = stmt.query([lap_id])?;

        let mut points = Vec::new();
        while let Some(row) = rows.next()? {
            let ts: i64 = row.get(0)?;
            let Some(time) = from_timestamp(ts) else {
                dlog!("bad time {ts} for trackpoint in lap {lap_id}");
                continue;
            };
            points.push(Trackpoint {
                time,
                latitude: row.get(1)?,
                longitude: row.get(2)?,
                altitude_m: row.get(3)?,
                distance_m: row.get(4)?,
                heart_rate: row.get(5)?,
            });
        }
        Ok(points)
    }
}

fn ensure_schema(conn: &Connection) -> Result<(), ImportError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS sport (
          id    INTEGER PRIMARY KEY,
          name  TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS activity (
          id          INTEGER PRIMARY KEY,
          start_time  INTEGER NOT NULL UNIQUE,
          sport_id    INTEGER NOT NULL REFERENCES sport(id)
        );

        CREATE INDEX IF NOT EXISTS activity_start_time_idx ON activity (start_time);

        CREATE TABLE IF NOT EXISTS lap (
          id              INTEGER PRIMARY KEY,
          activity_id     INTEGER NOT NULL REFERENCES activity(id) ON DELETE CASCADE,
          start_time      INTEGER NOT NULL,
          duration_s      REAL NOT NULL,
          distance_m      REAL NOT NULL,
          max_speed_m_s   REAL NOT NULL,
          calories        INTEGER,
          max_heart_rate  INTEGER,
          avg_heart_rate  INTEGER
        );

        CREATE TABLE IF NOT EXISTS trackpoint (
          id          INTEGER PRIMARY KEY,
          lap_id      INTEGER NOT NULL REFERENCES lap(id) ON DELETE CASCADE,
          time        INTEGER NOT NULL,
          latitude    REAL,
          longitude   REAL,
          altitude_m  REAL,
          distance_m  REAL,
          heart_rate  INTEGER
        );

        CREATE TABLE IF NOT EXISTS import_record (
          source_type  TEXT NOT NULL DEFAULT 'file',
          identifier   TEXT NOT NULL PRIMARY KEY
        );
        ",
    )?;
    Ok(())
}

fn seed_sports(conn: &Connection) -> Result<(), ImportError> {
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO sport (name) VALUES (?1)")?;
    for name in CANONICAL_SPORTS {
        stmt.execute([name])?;
    }
    Ok(())
}

fn insert_activity(
    tx: &Transaction<'_>,
    sport: &Sport,
    activity: &ParsedActivity,
) -> Result<i64, ImportError> {
    tx.execute(
        "INSERT INTO activity (start_time, sport_id) VALUES (?1, ?2)",
        params![timestamp(activity.start_time), sport.id],
    )?;
    let activity_id = tx.last_insert_rowid();

    let mut lap_stmt = tx.prepare(
        "INSERT INTO lap (activity_id, start_time, duration_s, distance_m, max_speed_m_s,
                          calories, max_heart_rate, avg_heart_rate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    let mut point_stmt = tx.prepare(
        "INSERT INTO trackpoint (lap_id, time, latitude, longitude, altitude_m, distance_m, heart_rate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    for lap in &activity.laps {
        lap_stmt.execute(params![
            activity_id,
            timestamp(lap.start_time),
            lap.duration_s,
            lap.distance_m,
            lap.max_speed_m_s,
            lap.calories,
            lap.max_heart_rate,
            lap.avg_heart_rate,
        ])?;
        let lap_id = tx.last_insert_rowid();
        for p in &lap.trackpoints {
            point_stmt.execute(params![
                lap_id,
                timestamp(p.time),
                p.latitude,
                p.longitude,
                p.altitude_m,
                p.distance_m,
                p.heart_rate,
            ])?;
        }
    }

    Ok(activity_id)
}

fn timestamp(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp()
}

fn from_timestamp(ts: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcx;
    use chrono::NaiveDate;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn parsed_activity(start: NaiveDateTime) -> ParsedActivity {
        ParsedActivity {
            sport_label: "running".to_string(),
            start_time: start,
            laps: vec![Lap {
                start_time: start,
                duration_s: 600.0,
                distance_m: 1500.0,
                max_speed_m_s: 3.5,
                calories: Some(120),
                max_heart_rate: Some(170),
                avg_heart_rate: Some(150),
                trackpoints: vec![
                    Trackpoint {
                        time: start,
                        latitude: Some(44.6),
                        longitude: Some(-63.5),
                        altitude_m: Some(20.0),
                        distance_m: Some(0.0),
                        heart_rate: Some(120),
                    },
                    Trackpoint {
                        time: start + chrono::Duration::seconds(10),
                        latitude: None,
                        longitude: None,
                        altitude_m: None,
                        distance_m: None,
                        heart_rate: None,
                    },
                ],
            }],
        }
    }

    fn running(store: &Store) -> Sport {
        match store.find_sport_like("running").unwrap() {
            SportMatch::Found(s) => s,
            other => panic!("unexpected match: {other:?}"),
        }
    }

    #[test]
    fn seeds_canonical_sports() {
        let store = Store::open_in_memory().unwrap();
        for name in CANONICAL_SPORTS {
            assert!(matches!(
                store.find_sport_like(name).unwrap(),
                SportMatch::Found(_)
            ));
        }
    }

    #[test]
    fn sport_lookup_distinguishes_missing_and_ambiguous() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(SportMatch::NotFound, store.find_sport_like("swimming").unwrap());
        // "ing" sits inside running, biking and walking.
        assert_eq!(SportMatch::Ambiguous(3), store.find_sport_like("ing").unwrap());
    }

    #[test]
    fn sport_lookup_is_case_sensitive() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(SportMatch::NotFound, store.find_sport_like("Running").unwrap());
    }

    #[test]
    fn saves_and_reloads_an_activity_graph() {
        let mut store = Store::open_in_memory().unwrap();
        let start = dt(2009, 2, 21, 15, 2, 21);
        let sport = running(&store);
        let ids = store
            .save_imported(
                &[(sport.clone(), parsed_activity(start))],
                &ImportRecord::for_file("2009-02-21-15-02-21"),
            )
            .unwrap();
        assert_eq!(1, ids.len());

        let loaded = store.load_activity(ids[0]).unwrap().unwrap();
        assert_eq!(start, loaded.start_time);
        assert_eq!("running", loaded.sport.name);
        assert_eq!(1, loaded.laps.len());
        assert_eq!(2, loaded.laps[0].trackpoints.len());
        assert_eq!(None, loaded.laps[0].trackpoints[1].latitude);
        assert!((loaded.distance_meters() - 1500.0).abs() < f64::EPSILON);

        let record = store
            .find_import_record("2009-02-21-15-02-21")
            .unwrap()
            .unwrap();
        assert_eq!("file", record.source_type);
    }

    #[test]
    fn duplicate_import_record_rolls_back_the_transaction() {
        let mut store = Store::open_in_memory().unwrap();
        let sport = running(&store);
        let record = ImportRecord::for_file("2009-02-21-15-02-21");
        store
            .save_imported(
                &[(sport.clone(), parsed_activity(dt(2009, 2, 21, 15, 2, 21)))],
                &record,
            )
            .unwrap();
        let err = store
            .save_imported(
                &[(sport, parsed_activity(dt(2009, 2, 22, 15, 2, 21)))],
                &record,
            )
            .unwrap_err();
        assert!(matches!(err, ImportError::Storage(_)), "{err}");
        // The second activity must not have been committed.
        assert_eq!(1, store.query_activities(None, None).unwrap().len());
    }

    #[test]
    fn duplicate_start_time_is_rejected() {
        let mut store = Store::open_in_memory().unwrap();
        let sport = running(&store);
        let start = dt(2009, 2, 21, 15, 2, 21);
        store
            .save_imported(
                &[(sport.clone(), parsed_activity(start))],
                &ImportRecord::for_file("a"),
            )
            .unwrap();
        let err = store
            .save_imported(&[(sport, parsed_activity(start))], &ImportRecord::for_file("b"))
            .unwrap_err();
        assert!(matches!(err, ImportError::Storage(_)), "{err}");
    }

    #[test]
    fn query_filters_by_sport_and_range() {
        let mut store = Store::open_in_memory().unwrap();
        let sport = running(&store);
        store
            .save_imported(
                &[
                    (sport.clone(), parsed_activity(dt(2009, 1, 10, 8, 0, 0))),
                    (sport.clone(), parsed_activity(dt(2009, 2, 10, 8, 0, 0))),
                    (sport, parsed_activity(dt(2009, 3, 10, 8, 0, 0))),
                ],
                &ImportRecord::for_file("batch"),
            )
            .unwrap();

        assert_eq!(3, store.query_activities(Some("running"), None).unwrap().len());
        assert_eq!(0, store.query_activities(Some("biking"), None).unwrap().len());

        let feb = store
            .query_activities(
                Some("running"),
                Some((dt(2009, 2, 1, 0, 0, 0), dt(2009, 2, 28, 23, 59, 59))),
            )
            .unwrap();
        assert_eq!(1, feb.len());
        assert_eq!(dt(2009, 2, 10, 8, 0, 0), feb[0].start_time);

        let range = store.activity_date_range(Some("running")).unwrap().unwrap();
        assert_eq!((dt(2009, 1, 10, 8, 0, 0), dt(2009, 3, 10, 8, 0, 0)), range);
        assert_eq!(None, store.activity_date_range(Some("biking")).unwrap());
    }

    #[test]
    fn results_come_back_ordered_by_start_time() {
        let mut store = Store::open_in_memory().unwrap();
        let sport = running(&store);
        store
            .save_imported(
                &[
                    (sport.clone(), parsed_activity(dt(2009, 3, 10, 8, 0, 0))),
                    (sport.clone(), parsed_activity(dt(2009, 1, 10, 8, 0, 0))),
                    (sport, parsed_activity(dt(2009, 2, 10, 8, 0, 0))),
                ],
                &ImportRecord::for_file("batch"),
            )
            .unwrap();
        let all = store.query_activities(None, None).unwrap();
        let starts: Vec<_> = all.iter().map(|a| a.start_time).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(sorted, starts);
    }

    #[test]
    fn delete_cascades_to_laps_and_trackpoints() {
        let mut store = Store::open_in_memory().unwrap();
        let sport = running(&store);
        let ids = store
            .save_imported(
                &[(sport, parsed_activity(dt(2009, 2, 21, 15, 2, 21)))],
                &ImportRecord::for_file("a"),
            )
            .unwrap();

        assert!(store.delete_activity(ids[0]).unwrap());
        assert!(store.load_activity(ids[0]).unwrap().is_none());
        let laps: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM lap", [], |r| r.get(0))
            .unwrap();
        let points: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM trackpoint", [], |r| r.get(0))
            .unwrap();
        assert_eq!(0, laps);
        assert_eq!(0, points);

        assert!(!store.delete_activity(ids[0]).unwrap());
    }

    #[test]
    fn parsed_sample_survives_a_round_trip() {
        let xml = r#"<TrainingCenterDatabase xmlns="urn:x"><Activities>
            <Activity Sport="Biking"><Id>2009-06-01T10:00:00Z</Id>
            <Lap StartTime="2009-06-01T10:00:00Z">
              <TotalTimeSeconds>1086.0</TotalTimeSeconds>
              <DistanceMeters>2540.0</DistanceMeters>
              <MaximumSpeed>4.1</MaximumSpeed>
            </Lap></Activity></Activities></TrainingCenterDatabase>"#;
        let parsed = tcx::parse_str(xml).unwrap();
        let mut store = Store::open_in_memory().unwrap();
        let sport = match store.find_sport_like("biking").unwrap() {
            SportMatch::Found(s) => s,
            other => panic!("unexpected match: {other:?}"),
        };
        let ids = store
            .save_imported(
                &[(sport, parsed[0].clone())],
                &ImportRecord::for_file("2009-06-01-10-00-00"),
            )
            .unwrap();
        let loaded = store.load_activity(ids[0]).unwrap().unwrap();
        assert_eq!("biking", loaded.sport.name);
        assert!((loaded.duration_seconds() - 1086.0).abs() < f64::EPSILON);
        assert_eq!(None, loaded.heart_rate_avg());
    }
}
