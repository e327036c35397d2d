use crate::paths;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// One row of the `file` table. Files and directories share the path keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub is_dir: bool,
    pub length: i64,
    pub modification_time: i64,
    pub access_time: i64,
    pub owner: String,
    pub group: String,
    pub permission: i32,
    pub replication: i32,
}

/// Per-file processing state, keyed by the same path as its `FileRecord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub path: String,
    pub state_type: i32,
    pub stage: i32,
}

/// A small file packed into a container file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmallFileRecord {
    pub path: String,
    pub container_path: String,
    pub offset: i64,
    pub length: i64,
}

/// A registered backup source and where it is mirrored to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackupMapping {
    #[serde(default)]
    pub rid: i64,
    pub src: String,
    pub dest: String,
}

impl BackupMapping {
    /// Both roots are stored with a trailing slash.
    pub fn new(src: &str, dest: &str) -> Self {
        Self {
            rid: 0,
            src: paths::with_trailing_slash(src),
            dest: paths::with_trailing_slash(dest),
        }
    }

    pub fn normalized(&self) -> Self {
        Self {
            rid: self.rid,
            ..Self::new(&self.src, &self.dest)
        }
    }

    pub fn covers(&self, path: &str) -> bool {
        paths::is_under(path, &self.src)
    }

    /// Maps a source path onto the destination root.
    pub fn map_path(&self, path: &str) -> Option<String> {
        let src = paths::with_trailing_slash(&self.src);
        let dest = paths::with_trailing_slash(&self.dest);
        paths::replace_prefix(path, &src, &dest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileDiffType {
    Append,
    Rename,
    Delete,
    Metadata,
}

impl FileDiffType {
    pub fn as_i64(self) -> i64 {
        match self {
            FileDiffType::Append => 0,
            FileDiffType::Rename => 1,
            FileDiffType::Delete => 2,
            FileDiffType::Metadata => 3,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(FileDiffType::Append),
            1 => Some(FileDiffType::Rename),
            2 => Some(FileDiffType::Delete),
            3 => Some(FileDiffType::Metadata),
            _ => None,
        }
    }
}

impl fmt::Display for FileDiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileDiffType::Append => "APPEND",
            FileDiffType::Rename => "RENAME",
            FileDiffType::Delete => "DELETE",
            FileDiffType::Metadata => "METADATA",
        };
        f.write_str(name)
    }
}

/// Progress of a diff through the backup pipeline. The applier only writes `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDiffState {
    Pending,
    Applied,
    Failed,
}

impl FileDiffState {
    pub fn as_i64(self) -> i64 {
        match self {
            FileDiffState::Pending => 0,
            FileDiffState::Applied => 1,
            FileDiffState::Failed => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(FileDiffState::Pending),
            1 => Some(FileDiffState::Applied),
            2 => Some(FileDiffState::Failed),
            _ => None,
        }
    }
}

/// Named string parameters of a diff, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffParameters(Vec<(String, String)>);

impl DiffParameters {
    pub fn insert(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let map: Map<String, Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        serde_json::to_string(&map)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let map: Map<String, Value> = serde_json::from_str(json)?;
        Ok(Self(
            map.into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect(),
        ))
    }
}

/// Renders as command-line style arguments: `-offset 0 -length 10`.
impl fmt::Display for DiffParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "-{} {}", k, v)?;
        }
        Ok(())
    }
}

/// A derived change record for the backup pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub id: i64,
    pub diff_type: FileDiffType,
    pub src: String,
    pub parameters: DiffParameters,
    pub state: FileDiffState,
    pub create_time: i64,
}

impl FileDiff {
    pub fn new(diff_type: FileDiffType, src: &str) -> Self {
        Self {
            id: 0,
            diff_type,
            src: src.to_string(),
            parameters: DiffParameters::default(),
            state: FileDiffState::Pending,
            create_time: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl ToString) -> Self {
        self.parameters.insert(key, value);
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_mapping_normalizes_and_maps() {
        let mapping = BackupMapping::new("/backup", "hdfs://nn:9000/mirror");
        assert_eq!(mapping.src, "/backup/");
        assert_eq!(mapping.dest, "hdfs://nn:9000/mirror/");
        assert!(mapping.covers("/backup"));
        assert!(mapping.covers("/backup/a/b.txt"));
        assert!(!mapping.covers("/backup2/a"));
        assert_eq!(
            mapping.map_path("/backup/a/b.txt").as_deref(),
            Some("hdfs://nn:9000/mirror/a/b.txt")
        );
        assert_eq!(mapping.map_path("/elsewhere/x"), None);
    }

    #[test]
    fn test_diff_parameters_keep_insertion_order() {
        let diff = FileDiff::new(FileDiffType::Append, "/backup/a.txt")
            .with_param("offset", 0)
            .with_param("length", 10)
            .with_param("mtime", 1700000000000_i64);
        let keys: Vec<&str> = diff.parameters.keys().collect();
        assert_eq!(keys, vec!["offset", "length", "mtime"]);
        assert_eq!(diff.parameters.to_string(), "-offset 0 -length 10 -mtime 1700000000000");

        let json = diff.parameters.to_json().unwrap();
        assert_eq!(json, r#"{"offset":"0","length":"10","mtime":"1700000000000"}"#);
        assert_eq!(DiffParameters::from_json(&json).unwrap(), diff.parameters);
    }

    #[test]
    fn test_diff_parameters_insert_replaces_existing_key() {
        let mut params = DiffParameters::default();
        params.insert("dest", "/a");
        params.insert("dest", "/b");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("dest"), Some("/b"));
    }

    #[test]
    fn test_diff_type_codes() {
        for t in [
            FileDiffType::Append,
            FileDiffType::Rename,
            FileDiffType::Delete,
            FileDiffType::Metadata,
        ] {
            assert_eq!(FileDiffType::from_i64(t.as_i64()), Some(t));
        }
        assert_eq!(FileDiffType::from_i64(42), None);
        assert_eq!(FileDiffType::Delete.to_string(), "DELETE");
    }
}
