//! SQLite backend: one row per `(cell_id, date)`.

use log::debug;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use crate::{CacheError, CacheStore, Result};
use sw_core::observation::{CachedSeries, RawObservation};
use sw_utils::dates::{format_date, parse_iso_day};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS observations (
        cell_id TEXT NOT NULL,
        date TEXT NOT NULL,
        value REAL,
        secondary_value REAL,
        PRIMARY KEY (cell_id, date)
    );
    CREATE INDEX IF NOT EXISTS idx_obs_cell ON observations(cell_id);
"#;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    label: String,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
            label: path.display().to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
            label: ":memory:".to_string(),
        })
    }
}

type Row = (String, String, Option<f64>, Option<f64>);

fn to_observation(date: &str, value: Option<f64>, secondary_value: Option<f64>) -> Result<RawObservation> {
    let date = parse_iso_day(date).map_err(|_| CacheError::Date(date.to_string()))?;
    Ok(RawObservation::new(date, value).with_secondary(secondary_value))
}

impl CacheStore for SqliteStore {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn load(&self) -> Result<CachedSeries> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT cell_id, date, value, secondary_value
             FROM observations
             ORDER BY cell_id, date",
        )?;
        let rows = stmt
            .query_map([], |row| -> rusqlite::Result<Row> {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut series = CachedSeries::new();
        for (cell_id, date, value, secondary_value) in rows {
            series
                .entry(cell_id)
                .or_insert_with(Vec::new)
                .push(to_observation(&date, value, secondary_value)?);
        }
        Ok(series)
    }

    fn put_all(&self, series: &CachedSeries) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM observations", [])?;
        let mut count = 0usize;
        {
            let mut insert = tx.prepare(
                "INSERT OR REPLACE INTO observations (cell_id, date, value, secondary_value)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (cell_id, observations) in series {
                for o in observations {
                    insert.execute(params![
                        cell_id,
                        format_date(&o.date),
                        o.value,
                        o.secondary_value
                    ])?;
                    count += 1;
                }
            }
        }
        tx.commit()?;
        debug!("Cache {} updated with {} observations.", self.label, count);
        Ok(())
    }

    fn get(&self, cell_id: &str) -> Result<Vec<RawObservation>> {
        let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT date, value, secondary_value
             FROM observations
             WHERE cell_id = ?1
             ORDER BY date",
        )?;
        let rows = stmt
            .query_map(params![cell_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|(date, value, secondary_value)| to_observation(date, *value, *secondary_value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn sample() -> CachedSeries {
        let mut series = CachedSeries::new();
        series.insert(
            "sniardwy_3".into(),
            vec![
                RawObservation::new(day(1), Some(0.12)),
                RawObservation::new(day(4), None),
                RawObservation::new(day(9), Some(-0.03)),
            ],
        );
        series.insert(
            "bordeaux_0".into(),
            vec![RawObservation::new(day(2), Some(0.7)).with_secondary(Some(0.1))],
        );
        series
    }

    #[test]
    fn empty_database_loads_as_empty() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(store.get("sniardwy_3").unwrap().is_empty());
    }

    #[test]
    fn put_all_then_load() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put_all(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());

        let cell = store.get("sniardwy_3").unwrap();
        assert_eq!(cell.len(), 3);
        assert_eq!(cell[1].value, None);
        assert_eq!(cell[2].date, day(9));
    }

    #[test]
    fn put_all_replaces_previous_contents() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put_all(&sample()).unwrap();

        let mut smaller = CachedSeries::new();
        smaller.insert("bordeaux_0".into(), vec![RawObservation::new(day(5), Some(0.4))]);
        store.put_all(&smaller).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["bordeaux_0"][0].date, day(5));
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data_cache.sqlite");
        SqliteStore::open(&path).unwrap().put_all(&sample()).unwrap();
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), sample());
    }
}
