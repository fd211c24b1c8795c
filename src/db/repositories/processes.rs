use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    helpers::{parse_datetime, to_u32},
    Database,
};
use crate::models::{Process, Subprocess};
use crate::sequence::SequenceState;

fn row_to_subprocess(row: &Row) -> Result<Subprocess> {
    let position: i64 = row.get("position")?;
    Ok(Subprocess {
        id: row.get("id")?,
        process_id: row.get("process_id")?,
        name: row.get("name")?,
        position: to_u32(position, "position")?,
    })
}

impl Database {
    pub async fn insert_process(&self, name: &str) -> Result<Process> {
        let now = Utc::now();
        let process = Process {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            subprocesses: Vec::new(),
            sequence: SequenceState::default(),
            created_at: now,
            updated_at: now,
        };

        let record = process.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO processes (id, name, sequence_enabled, sequence_index, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.name,
                    record.sequence.enabled,
                    record.sequence.current_index,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?;

        Ok(process)
    }

    pub async fn insert_subprocess(&self, process_id: &str, name: &str) -> Result<Subprocess> {
        let process_id = process_id.to_string();
        let name = name.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM processes WHERE id = ?1",
                    params![process_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(anyhow!("process {process_id} not found"));
            }

            let next_position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM subprocesses WHERE process_id = ?1",
                params![process_id],
                |row| row.get(0),
            )?;

            let now = Utc::now().to_rfc3339();
            let subprocess = Subprocess {
                id: Uuid::new_v4().to_string(),
                process_id: process_id.clone(),
                name,
                position: to_u32(next_position, "position")?,
            };

            tx.execute(
                "INSERT INTO subprocesses (id, process_id, name, position, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    subprocess.id,
                    subprocess.process_id,
                    subprocess.name,
                    next_position,
                    now,
                ],
            )?;
            tx.execute(
                "UPDATE processes SET updated_at = ?1 WHERE id = ?2",
                params![now, process_id],
            )?;

            tx.commit()?;
            Ok(subprocess)
        })
        .await
    }

    /// Remove a step. Its readings stay; the stored sequence index is left
    /// as-is and healed on next load.
    pub async fn delete_subprocess(&self, process_id: &str, subprocess_id: &str) -> Result<()> {
        let process_id = process_id.to_string();
        let subprocess_id = subprocess_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "DELETE FROM subprocesses WHERE id = ?1 AND process_id = ?2",
                params![subprocess_id, process_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Subprocess not found"));
            }

            conn.execute(
                "UPDATE processes SET updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), process_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn load_process(&self, process_id: &str) -> Result<Process> {
        let process_id = process_id.to_string();
        self.execute(move |conn| {
            let header = conn
                .query_row(
                    "SELECT id, name, sequence_enabled, sequence_index, created_at, updated_at
                     FROM processes
                     WHERE id = ?1",
                    params![process_id],
                    |row| {
                        Ok((
                            row.get::<_, String>("id")?,
                            row.get::<_, String>("name")?,
                            row.get::<_, bool>("sequence_enabled")?,
                            row.get::<_, i64>("sequence_index")?,
                            row.get::<_, String>("created_at")?,
                            row.get::<_, String>("updated_at")?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, name, enabled, current_index, created_at, updated_at)) = header else {
                return Err(anyhow!("process {process_id} not found"));
            };

            let mut stmt = conn.prepare(
                "SELECT id, process_id, name, position
                 FROM subprocesses
                 WHERE process_id = ?1
                 ORDER BY position ASC",
            )?;
            let mut rows = stmt.query(params![id])?;
            let mut subprocesses = Vec::new();
            while let Some(row) = rows.next()? {
                subprocesses.push(row_to_subprocess(row)?);
            }

            Ok(Process {
                id,
                name,
                subprocesses,
                sequence: SequenceState {
                    enabled,
                    current_index,
                },
                created_at: parse_datetime(&created_at, "created_at")?,
                updated_at: parse_datetime(&updated_at, "updated_at")?,
            })
        })
        .await
    }

    pub async fn update_sequence_state(
        &self,
        process_id: &str,
        state: SequenceState,
    ) -> Result<()> {
        let process_id = process_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE processes
                 SET sequence_enabled = ?1,
                     sequence_index = ?2,
                     updated_at = ?3
                 WHERE id = ?4",
                params![
                    state.enabled,
                    state.current_index,
                    Utc::now().to_rfc3339(),
                    process_id,
                ],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Process not found"));
            }
            Ok(())
        })
        .await
    }
}
