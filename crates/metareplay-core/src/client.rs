use crate::error::{Error, Result};
use crate::platform;
use crate::storage::models::FileRecord;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;

/// Authoritative status of a path on the source filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub is_dir: bool,
    pub length: i64,
    pub modification_time: i64,
    pub access_time: i64,
    pub owner: String,
    pub group: String,
    pub permission: i32,
    pub replication: i32,
}

impl FileStatus {
    pub fn into_record(self, path: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            is_dir: self.is_dir,
            length: self.length,
            modification_time: self.modification_time,
            access_time: self.access_time,
            owner: self.owner,
            group: self.group,
            permission: self.permission,
            replication: self.replication,
        }
    }
}

/// Looks up current status on the source filesystem.
///
/// `Ok(None)` means the path does not exist (any more); errors are reserved
/// for the client itself failing.
pub trait FileStatusClient {
    fn file_info(&self, path: &str) -> Result<Option<FileStatus>>;
}

/// Fixed set of statuses keyed by absolute path.
impl FileStatusClient for HashMap<String, FileStatus> {
    fn file_info(&self, path: &str) -> Result<Option<FileStatus>> {
        Ok(self.get(path).cloned())
    }
}

/// Serves statuses from a local directory mounted as the source root.
pub struct LocalFsClient {
    root: PathBuf,
}

impl LocalFsClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn to_millis(time: io::Result<SystemTime>) -> i64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl FileStatusClient for LocalFsClient {
    fn file_info(&self, path: &str) -> Result<Option<FileStatus>> {
        let local = self.resolve(path);
        let metadata = match fs::metadata(&local) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!("No local file for {} at {}", path, local.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::Client(format!(
                    "Error getting metadata for {}: {}",
                    local.display(),
                    e
                )))
            }
        };

        let ownership = platform::get_ownership(&metadata);
        let is_dir = metadata.is_dir();
        Ok(Some(FileStatus {
            is_dir,
            length: if is_dir { 0 } else { metadata.len() as i64 },
            modification_time: to_millis(metadata.modified()),
            access_time: to_millis(metadata.accessed()),
            owner: ownership.owner,
            group: ownership.group,
            permission: ownership.permission,
            replication: 1,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_local_client_reports_files_and_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("backup/sub")).unwrap();
        fs::write(dir.path().join("backup/a.txt"), b"0123456789").unwrap();

        let client = LocalFsClient::new(dir.path());

        let file = client.file_info("/backup/a.txt").unwrap().unwrap();
        assert!(!file.is_dir);
        assert_eq!(file.length, 10);
        assert_eq!(file.replication, 1);
        assert!(file.modification_time > 0);

        let sub = client.file_info("/backup/sub").unwrap().unwrap();
        assert!(sub.is_dir);
        assert_eq!(sub.length, 0);

        assert_eq!(client.file_info("/backup/missing").unwrap(), None);
    }

    #[test]
    fn test_into_record_keeps_every_field() {
        let status = FileStatus {
            is_dir: false,
            length: 42,
            modification_time: 1,
            access_time: 2,
            owner: "hdfs".to_string(),
            group: "supergroup".to_string(),
            permission: 0o644,
            replication: 3,
        };
        let record = status.into_record("/x");
        assert_eq!(record.path, "/x");
        assert_eq!(record.length, 42);
        assert_eq!(record.group, "supergroup");
        assert_eq!(record.replication, 3);
    }
}
