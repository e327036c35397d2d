//! Interfaces the translator and applier consume, and their SQLite implementations.

use crate::error::Result;
use crate::storage::models::{BackupMapping, FileDiff, FileRecord};
use crate::storage::{Database, Dialect, MutationOp};

/// Path-keyed replica of the source filesystem's metadata.
pub trait MetadataReplica {
    fn get_by_path(&self, path: &str) -> Result<Option<FileRecord>>;
    fn get_by_prefix(&self, prefix: &str) -> Result<Vec<FileRecord>>;
    fn get_by_prefix_ordered(&self, prefix: &str) -> Result<Vec<FileRecord>>;
    fn insert(&self, record: &FileRecord) -> Result<()>;
    /// Removes the path from every partition.
    fn delete_by_path(&self, path: &str) -> Result<()>;
    fn execute(&self, ops: &[MutationOp]) -> Result<()>;

    /// Engine the store renders `execute` batches for.
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

pub trait BackupRegistry {
    fn is_under_backup_source(&self, path: &str) -> Result<bool>;
    fn mappings_for_source(&self, path: &str) -> Result<Vec<BackupMapping>>;
}

pub trait DiffLog {
    fn append(&self, diff: &FileDiff) -> Result<()>;
}

/// Everything the applier needs from one backing store.
pub trait MetaStore: MetadataReplica + BackupRegistry + DiffLog {
    /// Submit a mutation batch together with its diffs. The default is not
    /// atomic: a failed append leaves the mutations in place.
    fn commit(&self, ops: &[MutationOp], diffs: &[FileDiff]) -> Result<()> {
        self.execute(ops)?;
        for diff in diffs {
            self.append(diff)?;
        }
        Ok(())
    }
}

impl MetadataReplica for Database {
    fn get_by_path(&self, path: &str) -> Result<Option<FileRecord>> {
        Ok(self.get_file(path)?)
    }

    fn get_by_prefix(&self, prefix: &str) -> Result<Vec<FileRecord>> {
        Ok(self.get_files_by_prefix(prefix)?)
    }

    fn get_by_prefix_ordered(&self, prefix: &str) -> Result<Vec<FileRecord>> {
        Ok(self.get_files_by_prefix_ordered(prefix)?)
    }

    fn insert(&self, record: &FileRecord) -> Result<()> {
        Ok(self.insert_file(record)?)
    }

    fn delete_by_path(&self, path: &str) -> Result<()> {
        self.delete_file_by_path(path)?;
        Ok(())
    }

    fn execute(&self, ops: &[MutationOp]) -> Result<()> {
        self.execute_mutations(ops)?;
        Ok(())
    }
}

impl BackupRegistry for Database {
    fn is_under_backup_source(&self, path: &str) -> Result<bool> {
        Ok(self.src_in_backup(path)?)
    }

    fn mappings_for_source(&self, path: &str) -> Result<Vec<BackupMapping>> {
        Ok(self.get_backup_mappings_by_src(path)?)
    }
}

impl DiffLog for Database {
    fn append(&self, diff: &FileDiff) -> Result<()> {
        self.insert_file_diff(diff)?;
        Ok(())
    }
}

impl MetaStore for Database {
    fn commit(&self, ops: &[MutationOp], diffs: &[FileDiff]) -> Result<()> {
        self.commit_batch(ops, diffs)?;
        Ok(())
    }
}
