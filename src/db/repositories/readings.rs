use anyhow::{bail, Result};
use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::{
    helpers::{parse_activity, parse_datetime, to_i64, to_u32, to_u64},
    Database,
};
use crate::models::{Reading, ReadingForm, StoredReading};

fn row_to_stored_reading(row: &Row) -> Result<StoredReading> {
    let elapsed_ms: i64 = row.get("elapsed_ms")?;
    let started_at: String = row.get("started_at")?;
    let ended_at: String = row.get("ended_at")?;
    let activity: String = row.get("activity")?;
    let person_count: i64 = row.get("person_count")?;
    let production_quantity: i64 = row.get("production_quantity")?;
    let rating: i64 = row.get("rating")?;
    let recorded_at: String = row.get("recorded_at")?;

    Ok(StoredReading {
        id: row.get("id")?,
        process_id: row.get("process_id")?,
        subprocess_id: row.get("subprocess_id")?,
        reading: Reading {
            elapsed_ms: to_u64(elapsed_ms, "elapsed_ms")?,
            started_at: parse_datetime(&started_at, "started_at")?,
            ended_at: parse_datetime(&ended_at, "ended_at")?,
            formatted_time: row.get("formatted_time")?,
            should_persist: true,
        },
        form: ReadingForm {
            activity: parse_activity(&activity)?,
            person_count: to_u32(person_count, "person_count")?,
            production_quantity: to_u32(production_quantity, "production_quantity")?,
            rating: to_u32(rating, "rating")?,
            remarks: row.get("remarks")?,
        },
        recorded_at: parse_datetime(&recorded_at, "recorded_at")?,
    })
}

impl Database {
    pub async fn insert_reading(
        &self,
        process_id: &str,
        subprocess_id: &str,
        reading: &Reading,
        form: &ReadingForm,
    ) -> Result<()> {
        if !reading.should_persist {
            bail!("display-only reading cannot be recorded");
        }

        let process_id = process_id.to_string();
        let subprocess_id = subprocess_id.to_string();
        let reading = reading.clone();
        let form = form.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO readings (
                    id,
                    process_id,
                    subprocess_id,
                    elapsed_ms,
                    started_at,
                    ended_at,
                    formatted_time,
                    activity,
                    person_count,
                    production_quantity,
                    rating,
                    remarks,
                    recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    Uuid::new_v4().to_string(),
                    process_id,
                    subprocess_id,
                    to_i64(reading.elapsed_ms)?,
                    reading.started_at.to_rfc3339(),
                    reading.ended_at.to_rfc3339(),
                    reading.formatted_time,
                    form.activity.as_str(),
                    form.person_count,
                    form.production_quantity,
                    form.rating,
                    form.remarks,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_readings_for_process(&self, process_id: &str) -> Result<Vec<StoredReading>> {
        let process_id = process_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, process_id, subprocess_id, elapsed_ms, started_at, ended_at,
                        formatted_time, activity, person_count, production_quantity, rating,
                        remarks, recorded_at
                 FROM readings
                 WHERE process_id = ?1
                 ORDER BY recorded_at ASC, rowid ASC",
            )?;

            let mut rows = stmt.query(params![process_id])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(row_to_stored_reading(row)?);
            }
            Ok(readings)
        })
        .await
    }
}
