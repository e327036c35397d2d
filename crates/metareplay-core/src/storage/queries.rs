use super::models::*;
use super::mutation::MutationOp;
use super::sqlite::Database;
use crate::error;
use crate::paths;
use rusqlite::{params, OptionalExtension, Result, Row};
use tracing::debug;

const FILE_COLUMNS: &str = "path, is_dir, length, modification_time, access_time, \
                            owner, owner_group, permission, block_replication";

fn file_from_row(row: &Row<'_>) -> Result<FileRecord> {
    Ok(FileRecord {
        path: row.get(0)?,
        is_dir: row.get(1)?,
        length: row.get(2)?,
        modification_time: row.get(3)?,
        access_time: row.get(4)?,
        owner: row.get(5)?,
        group: row.get(6)?,
        permission: row.get(7)?,
        replication: row.get(8)?,
    })
}

/// A `file_diff` row before its codes and JSON parameters are decoded.
struct DiffRow {
    id: i64,
    diff_type: i64,
    src: String,
    parameters: String,
    state: i64,
    create_time: i64,
}

fn diff_row(row: &Row<'_>) -> Result<DiffRow> {
    Ok(DiffRow {
        id: row.get(0)?,
        diff_type: row.get(1)?,
        src: row.get(2)?,
        parameters: row.get(3)?,
        state: row.get(4)?,
        create_time: row.get(5)?,
    })
}

impl DiffRow {
    fn decode(self) -> error::Result<FileDiff> {
        let diff_type = FileDiffType::from_i64(self.diff_type)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(1, self.diff_type))?;
        let state = FileDiffState::from_i64(self.state)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, self.state))?;
        Ok(FileDiff {
            id: self.id,
            diff_type,
            src: self.src,
            parameters: DiffParameters::from_json(&self.parameters)?,
            state,
            create_time: self.create_time,
        })
    }
}

fn decode_diffs(rows: Vec<DiffRow>) -> error::Result<Vec<FileDiff>> {
    rows.into_iter().map(DiffRow::decode).collect()
}

impl Database {
    // ── Files ────────────────────────────────────────────────────

    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM file WHERE path = ?1", FILE_COLUMNS),
                params![path],
                file_from_row,
            )
            .optional()
    }

    /// Every row whose path starts with `prefix`, in no particular order.
    pub fn get_files_by_prefix(&self, prefix: &str) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {} FROM file WHERE substr(path, 1, ?1) = ?2",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![prefix.chars().count() as i64, prefix], file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Same as `get_files_by_prefix`, sorted by path so a directory precedes its contents.
    pub fn get_files_by_prefix_ordered(&self, prefix: &str) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "SELECT {} FROM file WHERE substr(path, 1, ?1) = ?2 ORDER BY path ASC",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![prefix.chars().count() as i64, prefix], file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn insert_file(&self, file: &FileRecord) -> Result<()> {
        self.connection().execute(
            &format!(
                "INSERT INTO file ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                FILE_COLUMNS
            ),
            params![
                file.path,
                file.is_dir,
                file.length,
                file.modification_time,
                file.access_time,
                file.owner,
                file.group,
                file.permission,
                file.replication,
            ],
        )?;
        Ok(())
    }

    /// Remove the rows at `path` from the file, state and small-file tables together.
    pub fn delete_file_by_path(&self, path: &str) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let touched = self.execute_in(&tx, &[MutationOp::DeleteByPath(path.to_string())])?;
        tx.commit()?;
        Ok(touched)
    }

    pub fn count_files(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM file", [], |row| row.get(0))
    }

    // ── Side Partitions ──────────────────────────────────────────

    pub fn insert_file_state(&self, state: &FileState) -> Result<()> {
        self.connection().execute(
            "INSERT OR REPLACE INTO file_state (path, type, stage) VALUES (?1, ?2, ?3)",
            params![state.path, state.state_type, state.stage],
        )?;
        Ok(())
    }

    pub fn get_file_state(&self, path: &str) -> Result<Option<FileState>> {
        self.connection()
            .query_row(
                "SELECT path, type, stage FROM file_state WHERE path = ?1",
                params![path],
                |row| {
                    Ok(FileState {
                        path: row.get(0)?,
                        state_type: row.get(1)?,
                        stage: row.get(2)?,
                    })
                },
            )
            .optional()
    }

    pub fn insert_small_file(&self, small_file: &SmallFileRecord) -> Result<()> {
        self.connection().execute(
            "INSERT OR REPLACE INTO small_file \
             (path, container_file_path, container_offset, length) VALUES (?1, ?2, ?3, ?4)",
            params![
                small_file.path,
                small_file.container_path,
                small_file.offset,
                small_file.length
            ],
        )?;
        Ok(())
    }

    pub fn get_small_file(&self, path: &str) -> Result<Option<SmallFileRecord>> {
        self.connection()
            .query_row(
                "SELECT path, container_file_path, container_offset, length \
                 FROM small_file WHERE path = ?1",
                params![path],
                |row| {
                    Ok(SmallFileRecord {
                        path: row.get(0)?,
                        container_path: row.get(1)?,
                        offset: row.get(2)?,
                        length: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    // ── Backup Mappings ──────────────────────────────────────────

    /// Register a mapping; an identical (src, dest) pair is kept as is.
    pub fn insert_backup_mapping(&self, mapping: &BackupMapping) -> Result<i64> {
        let mapping = mapping.normalized();
        self.connection().execute(
            "INSERT OR IGNORE INTO backup_file (src, dest) VALUES (?1, ?2)",
            params![mapping.src, mapping.dest],
        )?;
        self.connection().query_row(
            "SELECT rid FROM backup_file WHERE src = ?1 AND dest = ?2",
            params![mapping.src, mapping.dest],
            |row| row.get(0),
        )
    }

    pub fn list_backup_mappings(&self) -> Result<Vec<BackupMapping>> {
        let mut stmt = self
            .connection()
            .prepare_cached("SELECT rid, src, dest FROM backup_file ORDER BY src, rid")?;
        let mappings = stmt
            .query_map([], |row| {
                Ok(BackupMapping {
                    rid: row.get(0)?,
                    src: row.get(1)?,
                    dest: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(mappings)
    }

    /// Remove all mappings for a source root. Returns how many were removed.
    pub fn delete_backup_mapping(&self, src: &str) -> Result<usize> {
        self.connection().execute(
            "DELETE FROM backup_file WHERE src = ?1",
            params![paths::with_trailing_slash(src)],
        )
    }

    pub fn src_in_backup(&self, path: &str) -> Result<bool> {
        Ok(self
            .list_backup_mappings()?
            .iter()
            .any(|mapping| mapping.covers(path)))
    }

    /// Mappings whose source root is `path` or one of its ancestors.
    pub fn get_backup_mappings_by_src(&self, path: &str) -> Result<Vec<BackupMapping>> {
        Ok(self
            .list_backup_mappings()?
            .into_iter()
            .filter(|mapping| mapping.covers(path))
            .collect())
    }

    // ── File Diffs ───────────────────────────────────────────────

    pub fn insert_file_diff(&self, diff: &FileDiff) -> error::Result<i64> {
        insert_diff_on(self.connection(), diff)
    }

    pub fn get_file_diffs(&self, offset: i64, limit: i64) -> error::Result<Vec<FileDiff>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT did, diff_type, src, parameters, state, create_time \
             FROM file_diff ORDER BY did ASC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![limit, offset], diff_row)?
            .collect::<Result<Vec<_>>>()?;
        decode_diffs(rows)
    }

    pub fn get_file_diffs_by_state(&self, state: FileDiffState) -> error::Result<Vec<FileDiff>> {
        let mut stmt = self.connection().prepare_cached(
            "SELECT did, diff_type, src, parameters, state, create_time \
             FROM file_diff WHERE state = ?1 ORDER BY did ASC",
        )?;
        let rows = stmt
            .query_map(params![state.as_i64()], diff_row)?
            .collect::<Result<Vec<_>>>()?;
        decode_diffs(rows)
    }

    pub fn update_file_diff_state(&self, id: i64, state: FileDiffState) -> Result<bool> {
        let updated = self.connection().execute(
            "UPDATE file_diff SET state = ?1 WHERE did = ?2",
            params![state.as_i64(), id],
        )?;
        Ok(updated > 0)
    }

    pub fn count_file_diffs(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM file_diff", [], |row| row.get(0))
    }

    // ── Batches ──────────────────────────────────────────────────

    /// Execute a mutation batch as one transaction.
    pub fn execute_mutations(&self, ops: &[MutationOp]) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let touched = self.execute_in(&tx, ops)?;
        tx.commit()?;
        debug!("Executed {} mutation ops ({} rows)", ops.len(), touched);
        Ok(touched)
    }

    /// Execute a mutation batch and append diffs in the same transaction.
    pub fn commit_batch(&self, ops: &[MutationOp], diffs: &[FileDiff]) -> error::Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let touched = self.execute_in(&tx, ops)?;
        for diff in diffs {
            insert_diff_on(&tx, diff)?;
        }
        tx.commit()?;
        debug!(
            "Committed {} mutation ops ({} rows) with {} file diffs",
            ops.len(),
            touched,
            diffs.len()
        );
        Ok(touched)
    }
}

fn insert_diff_on(conn: &rusqlite::Connection, diff: &FileDiff) -> error::Result<i64> {
    let parameters = diff.parameters.to_json()?;
    conn.execute(
        "INSERT INTO file_diff (diff_type, src, parameters, state, create_time) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            diff.diff_type.as_i64(),
            diff.src,
            parameters,
            diff.state.as_i64(),
            diff.create_time
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
