use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;

/// A change notification from the source filesystem's event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Create {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inode_type: Option<InodeType>,
    },
    Close {
        path: String,
        file_size: i64,
        timestamp: i64,
    },
    Rename {
        src_path: String,
        dst_path: String,
        #[serde(default)]
        timestamp: i64,
    },
    MetadataUpdate {
        path: String,
        change: MetadataChange,
    },
    Append {
        path: String,
    },
    Unlink {
        path: String,
        #[serde(default)]
        timestamp: i64,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Create { .. } => "CREATE",
            Event::Close { .. } => "CLOSE",
            Event::Rename { .. } => "RENAME",
            Event::MetadataUpdate { .. } => "METADATA",
            Event::Append { .. } => "APPEND",
            Event::Unlink { .. } => "UNLINK",
        }
    }

    /// The path the event is about; the source path for renames.
    pub fn path(&self) -> &str {
        match self {
            Event::Create { path, .. }
            | Event::Close { path, .. }
            | Event::MetadataUpdate { path, .. }
            | Event::Append { path }
            | Event::Unlink { path, .. } => path,
            Event::Rename { src_path, .. } => src_path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InodeType {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XAttr {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl fmt::Display for XAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)?;
        if let Some(value) = &self.value {
            write!(f, "={}", value)?;
        }
        Ok(())
    }
}

/// What a metadata update changed. Times of zero mean "not set".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetadataChange {
    Times {
        #[serde(default)]
        mtime: i64,
        #[serde(default)]
        atime: i64,
    },
    Owner {
        owner: Option<String>,
        group: Option<String>,
    },
    Perms {
        permission: u16,
    },
    Replication {
        replication: i32,
    },
    Xattrs {
        #[serde(default)]
        xattrs: Vec<XAttr>,
    },
    Acls {
        #[serde(default)]
        entries: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Times,
    Owner,
    Perms,
    Replication,
    Xattrs,
    Acls,
}

impl MetadataChange {
    pub fn kind(&self) -> MetadataKind {
        match self {
            MetadataChange::Times { .. } => MetadataKind::Times,
            MetadataChange::Owner { .. } => MetadataKind::Owner,
            MetadataChange::Perms { .. } => MetadataKind::Perms,
            MetadataChange::Replication { .. } => MetadataKind::Replication,
            MetadataChange::Xattrs { .. } => MetadataKind::Xattrs,
            MetadataChange::Acls { .. } => MetadataKind::Acls,
        }
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetadataKind::Times => "TIMES",
            MetadataKind::Owner => "OWNER",
            MetadataKind::Perms => "PERMS",
            MetadataKind::Replication => "REPLICATION",
            MetadataKind::Xattrs => "XATTRS",
            MetadataKind::Acls => "ACLS",
        };
        f.write_str(name)
    }
}

/// Parse one event per line; blank lines are skipped.
pub fn read_events<R: BufRead>(reader: R) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event = serde_json::from_str(trimmed)
            .map_err(|e| Error::InvalidEvent(format!("line {}: {}", index + 1, e)))?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_events_parses_every_kind() {
        let input = r#"
{"type":"create","path":"/backup/a.txt","inode_type":"file"}
{"type":"close","path":"/backup/a.txt","file_size":25,"timestamp":1700000000000}
{"type":"rename","src_path":"/backup/a.txt","dst_path":"/backup/b.txt"}

{"type":"metadata_update","path":"/backup/b.txt","change":{"kind":"times","mtime":5,"atime":6}}
{"type":"metadata_update","path":"/backup/b.txt","change":{"kind":"owner","owner":"hdfs"}}
{"type":"append","path":"/backup/b.txt"}
{"type":"unlink","path":"/backup/b.txt","timestamp":7}
"#;
        let events = read_events(input.as_bytes()).unwrap();
        assert_eq!(events.len(), 7);
        assert_eq!(
            events[0],
            Event::Create {
                path: "/backup/a.txt".to_string(),
                inode_type: Some(InodeType::File),
            }
        );
        assert_eq!(
            events[4],
            Event::MetadataUpdate {
                path: "/backup/b.txt".to_string(),
                change: MetadataChange::Owner {
                    owner: Some("hdfs".to_string()),
                    group: None,
                },
            }
        );
        let kinds: Vec<&str> = events.iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec!["CREATE", "CLOSE", "RENAME", "METADATA", "METADATA", "APPEND", "UNLINK"]
        );
        assert_eq!(events[2].path(), "/backup/a.txt");
    }

    #[test]
    fn test_read_events_reports_line_number() {
        let input = "{\"type\":\"append\",\"path\":\"/a\"}\n{\"type\":\"bogus\"}\n";
        let err = read_events(input.as_bytes()).unwrap_err();
        match err {
            Error::InvalidEvent(msg) => assert!(msg.starts_with("line 2:"), "{}", msg),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_metadata_kind_display() {
        let change = MetadataChange::Xattrs { xattrs: Vec::new() };
        assert_eq!(change.kind(), MetadataKind::Xattrs);
        assert_eq!(change.kind().to_string(), "XATTRS");
    }
}
