//! Replica reads that see the mutations already queued in the current batch.
//!
//! Queued ops are replayed in memory over the stored rows they could touch, so
//! a Close after a Create in the same batch sees the created length and a
//! second Close sees the first one's.

use crate::error::Result;
use crate::paths;
use crate::storage::models::FileRecord;
use crate::storage::MutationOp;
use crate::store::MetadataReplica;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Filter {
    Exact(String),
    Prefix(String),
}

impl Filter {
    fn matches(&self, path: &str) -> bool {
        match self {
            Filter::Exact(p) => path == p,
            Filter::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct PendingOps {
    ops: Vec<MutationOp>,
}

impl PendingOps {
    pub(super) fn extend(&mut self, ops: &[MutationOp]) {
        self.ops.extend_from_slice(ops);
    }

    pub(super) fn get_by_path<S: MetadataReplica>(
        &self,
        store: &S,
        path: &str,
    ) -> Result<Option<FileRecord>> {
        if self.ops.is_empty() {
            return store.get_by_path(path);
        }
        Ok(self
            .resolve(store, Filter::Exact(path.to_string()))?
            .into_iter()
            .next())
    }

    /// Rows under `prefix`, ascending by path.
    pub(super) fn get_by_prefix_ordered<S: MetadataReplica>(
        &self,
        store: &S,
        prefix: &str,
    ) -> Result<Vec<FileRecord>> {
        if self.ops.is_empty() {
            return store.get_by_prefix_ordered(prefix);
        }
        self.resolve(store, Filter::Prefix(prefix.to_string()))
    }

    fn resolve<S: MetadataReplica>(&self, store: &S, filter: Filter) -> Result<Vec<FileRecord>> {
        let mut rows: BTreeMap<String, FileRecord> = BTreeMap::new();
        for origin in self.origins(&filter) {
            let fetched: Vec<FileRecord> = match &origin {
                Filter::Exact(path) => store.get_by_path(path)?.into_iter().collect(),
                Filter::Prefix(prefix) => store.get_by_prefix(prefix)?,
            };
            for record in fetched {
                rows.insert(record.path.clone(), record);
            }
        }

        for op in &self.ops {
            replay(&mut rows, op);
        }

        Ok(rows
            .into_values()
            .filter(|record| filter.matches(&record.path))
            .collect())
    }

    /// Every stored location whose rows the queued rewrites could carry into
    /// `filter`, plus `filter` itself.
    fn origins(&self, filter: &Filter) -> Vec<Filter> {
        let mut filters = vec![filter.clone()];
        for op in self.ops.iter().rev() {
            let MutationOp::RewritePrefix {
                from,
                to,
                descendants,
            } = op
            else {
                continue;
            };
            let from = paths::strip_trailing_slash(from);
            let to = paths::strip_trailing_slash(to);
            let from_prefix = paths::with_trailing_slash(from);
            let to_prefix = paths::with_trailing_slash(to);

            let mut carried = Vec::new();
            for current in &filters {
                match current {
                    Filter::Exact(path) => {
                        if path == to {
                            carried.push(Filter::Exact(from.to_string()));
                        } else if let Some(rest) =
                            path.strip_prefix(&to_prefix).filter(|_| *descendants)
                        {
                            carried.push(Filter::Exact(format!("{}{}", from_prefix, rest)));
                        }
                    }
                    Filter::Prefix(prefix) => {
                        if to.starts_with(prefix.as_str()) {
                            carried.push(Filter::Exact(from.to_string()));
                            if *descendants {
                                carried.push(Filter::Prefix(from_prefix.clone()));
                            }
                        } else if let Some(rest) =
                            prefix.strip_prefix(&to_prefix).filter(|_| *descendants)
                        {
                            carried.push(Filter::Prefix(format!("{}{}", from_prefix, rest)));
                        }
                    }
                }
            }
            for origin in carried {
                if !filters.contains(&origin) {
                    filters.push(origin);
                }
            }
        }
        filters
    }
}

/// Applies one op to rows keyed by path, the same way its statements would.
fn replay(rows: &mut BTreeMap<String, FileRecord>, op: &MutationOp) {
    match op {
        MutationOp::Insert(record) => {
            rows.insert(record.path.clone(), record.clone());
        }
        MutationOp::DeleteByPath(path) => {
            rows.remove(path);
        }
        MutationOp::DeleteByPrefix(prefix) => {
            rows.retain(|path, _| !path.starts_with(prefix.as_str()));
        }
        MutationOp::RewritePrefix {
            from,
            to,
            descendants,
        } => {
            let from = paths::strip_trailing_slash(from);
            let to = paths::strip_trailing_slash(to);
            let from_prefix = paths::with_trailing_slash(from);
            let to_prefix = paths::with_trailing_slash(to);

            rows.remove(to);
            if *descendants {
                rows.retain(|path, _| !path.starts_with(&to_prefix));
            }
            if let Some(mut record) = rows.remove(from) {
                record.path = to.to_string();
                rows.insert(record.path.clone(), record);
            }
            if *descendants {
                let moved: Vec<String> = rows
                    .keys()
                    .filter(|path| path.starts_with(&from_prefix))
                    .cloned()
                    .collect();
                for old in moved {
                    if let Some(mut record) = rows.remove(&old) {
                        if let Some(new_path) = paths::replace_prefix(&old, &from_prefix, &to_prefix) {
                            record.path = new_path;
                            rows.insert(record.path.clone(), record);
                        }
                    }
                }
            }
        }
        MutationOp::UpdateFields { path, fields } => {
            if let Some(record) = rows.get_mut(path) {
                for field in fields {
                    field.apply_to(record);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, FieldUpdate};

    fn file(path: &str, length: i64, is_dir: bool) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            is_dir,
            length,
            modification_time: 0,
            access_time: 0,
            owner: "hdfs".to_string(),
            group: "supergroup".to_string(),
            permission: 0o644,
            replication: 1,
        }
    }

    fn paths_of(records: &[FileRecord]) -> Vec<&str> {
        records.iter().map(|r| r.path.as_str()).collect()
    }

    #[test]
    fn test_empty_overlay_reads_the_store() {
        let db = Database::open_in_memory().unwrap();
        db.insert_file(&file("/a", 3, false)).unwrap();
        let pending = PendingOps::default();
        assert_eq!(pending.get_by_path(&db, "/a").unwrap().unwrap().length, 3);
    }

    #[test]
    fn test_queued_insert_and_update_are_visible() {
        let db = Database::open_in_memory().unwrap();
        let mut pending = PendingOps::default();
        pending.extend(&[
            MutationOp::DeleteByPath("/a".to_string()),
            MutationOp::Insert(file("/a", 10, false)),
            MutationOp::UpdateFields {
                path: "/a".to_string(),
                fields: vec![FieldUpdate::Length(25)],
            },
        ]);
        assert_eq!(pending.get_by_path(&db, "/a").unwrap().unwrap().length, 25);
        assert_eq!(db.get_file("/a").unwrap(), None, "nothing written");
    }

    #[test]
    fn test_rename_then_recreate_keeps_both() {
        let db = Database::open_in_memory().unwrap();
        db.insert_file(&file("/logs/app.log", 5, false)).unwrap();
        let mut pending = PendingOps::default();
        pending.extend(&[
            MutationOp::RewritePrefix {
                from: "/logs/app.log".to_string(),
                to: "/logs/app.log.1".to_string(),
                descendants: false,
            },
            MutationOp::DeleteByPath("/logs/app.log".to_string()),
            MutationOp::Insert(file("/logs/app.log", 0, false)),
        ]);

        assert_eq!(pending.get_by_path(&db, "/logs/app.log").unwrap().unwrap().length, 0);
        assert_eq!(pending.get_by_path(&db, "/logs/app.log.1").unwrap().unwrap().length, 5);
    }

    #[test]
    fn test_prefix_reads_follow_directory_moves() {
        let db = Database::open_in_memory().unwrap();
        for record in [
            file("/src", 0, true),
            file("/src/a", 1, false),
            file("/src/sub", 0, true),
            file("/src/sub/b", 2, false),
            file("/dst/stale", 9, false),
        ] {
            db.insert_file(&record).unwrap();
        }
        let mut pending = PendingOps::default();
        pending.extend(&[MutationOp::RewritePrefix {
            from: "/src".to_string(),
            to: "/dst".to_string(),
            descendants: true,
        }]);

        let moved = pending.get_by_prefix_ordered(&db, "/dst/").unwrap();
        assert_eq!(paths_of(&moved), vec!["/dst/a", "/dst/sub", "/dst/sub/b"]);
        let nested = pending.get_by_prefix_ordered(&db, "/dst/sub/").unwrap();
        assert_eq!(paths_of(&nested), vec!["/dst/sub/b"]);
        assert!(pending.get_by_path(&db, "/src/a").unwrap().is_none());
        assert_eq!(pending.get_by_path(&db, "/dst/sub/b").unwrap().unwrap().length, 2);
    }

    #[test]
    fn test_deletes_hide_stored_rows() {
        let db = Database::open_in_memory().unwrap();
        db.insert_file(&file("/d", 0, true)).unwrap();
        db.insert_file(&file("/d/x", 1, false)).unwrap();
        let mut pending = PendingOps::default();
        pending.extend(&[
            MutationOp::DeleteByPath("/d".to_string()),
            MutationOp::DeleteByPrefix("/d/".to_string()),
        ]);
        assert!(pending.get_by_path(&db, "/d").unwrap().is_none());
        assert!(pending.get_by_prefix_ordered(&db, "/d/").unwrap().is_empty());
    }
}
