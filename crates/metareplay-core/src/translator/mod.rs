//! Turns one feed event into replica mutations and backup diffs.
//!
//! The translator reads the replica and backup registry and hands every
//! mutation back to the applier for batching. One translator serves one batch:
//! its reads see the ops it has already queued.

mod delete_diff;
mod overlay;

use crate::client::{FileStatus, FileStatusClient};
use crate::error::Result;
use crate::event::{Event, MetadataChange};
use crate::paths;
use crate::storage::models::{FileDiff, FileDiffType, FileRecord};
use crate::storage::{FieldUpdate, MutationOp};
use crate::store::{BackupRegistry, MetadataReplica};
use overlay::PendingOps;
use tracing::{debug, trace, warn};

pub use delete_diff::collapses_to_root;

/// Output of translating one event.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Translation {
    pub ops: Vec<MutationOp>,
    pub diffs: Vec<FileDiff>,
}

pub struct EventTranslator<'a, C, S> {
    client: &'a C,
    store: &'a S,
    pending: PendingOps,
}

impl<'a, C, S> EventTranslator<'a, C, S>
where
    C: FileStatusClient,
    S: MetadataReplica + BackupRegistry,
{
    pub fn new(client: &'a C, store: &'a S) -> Self {
        Self {
            client,
            store,
            pending: PendingOps::default(),
        }
    }

    /// Translate the next event of the batch. Later calls read the replica as
    /// if the ops returned so far had been executed.
    pub fn translate(&mut self, event: &Event) -> Result<Translation> {
        let mut out = Translation::default();
        match event {
            Event::Create { path, inode_type } => {
                trace!("event type: CREATE, path: {}, inode: {:?}", path, inode_type);
                self.on_create(path, &mut out)?;
            }
            Event::Close {
                path,
                file_size,
                timestamp,
            } => {
                trace!("event type: CLOSE, path: {}", path);
                self.on_close(path, *file_size, *timestamp, &mut out)?;
            }
            Event::Rename {
                src_path, dst_path, ..
            } => {
                trace!("event type: RENAME, src path: {}, dest path: {}", src_path, dst_path);
                self.on_rename(src_path, dst_path, &mut out)?;
            }
            Event::MetadataUpdate { path, change } => {
                trace!("event type: METADATA ({}), path: {}", change.kind(), path);
                self.on_metadata_update(path, change, &mut out)?;
            }
            Event::Append { path } => {
                // Progress is reconciled when the file is closed.
                trace!("event type: APPEND, path: {}", path);
            }
            Event::Unlink { path, .. } => {
                trace!("event type: UNLINK, path: {}", path);
                self.on_unlink(path, &mut out)?;
            }
        }
        self.pending.extend(&out.ops);
        Ok(out)
    }

    fn record_at(&self, path: &str) -> Result<Option<FileRecord>> {
        self.pending.get_by_path(self.store, path)
    }

    fn in_backup(&self, path: &str) -> Result<bool> {
        self.store.is_under_backup_source(path)
    }

    fn on_create(&self, path: &str, out: &mut Translation) -> Result<()> {
        let Some(status) = self.client.file_info(path)? else {
            debug!("Can not get file status for {}", path);
            return Ok(());
        };
        let record = status.into_record(path);

        if !record.is_dir && self.in_backup(path)? {
            // "-length 0" tells the copier to create an empty file.
            out.diffs.push(
                FileDiff::new(FileDiffType::Append, path)
                    .with_param("offset", 0)
                    .with_param("length", record.length)
                    .with_param("mtime", record.modification_time)
                    .with_param("owner", &record.owner)
                    .with_param("group", &record.group)
                    .with_param("permission", record.permission)
                    .with_param("replication", record.replication),
            );
        }

        out.ops.push(MutationOp::DeleteByPath(path.to_string()));
        out.ops.push(MutationOp::Insert(record));
        Ok(())
    }

    fn on_close(
        &self,
        path: &str,
        new_len: i64,
        timestamp: i64,
        out: &mut Translation,
    ) -> Result<()> {
        if self.in_backup(path)? {
            let curr_len = self
                .record_at(path)?
                .map(|record| record.length)
                .unwrap_or(0);
            if curr_len != new_len {
                out.diffs.push(
                    FileDiff::new(FileDiffType::Append, path)
                        .with_param("offset", curr_len)
                        .with_param("length", new_len - curr_len),
                );
            }
        }

        out.ops.push(MutationOp::UpdateFields {
            path: path.to_string(),
            fields: vec![
                FieldUpdate::Length(new_len),
                FieldUpdate::ModificationTime(timestamp),
            ],
        });
        Ok(())
    }

    fn on_rename(&self, src: &str, dst: &str, out: &mut Translation) -> Result<()> {
        let status = self.client.file_info(dst)?;
        if status.is_none() {
            debug!("Get rename dest status failed, {} -> {}", src, dst);
        }
        let existing = self.record_at(src)?;

        match (self.in_backup(src)?, self.in_backup(dst)?) {
            (true, true) => {
                out.diffs.push(
                    FileDiff::new(FileDiffType::Rename, src).with_param("dest", dst),
                );
            }
            (true, false) => self.delete_diffs_for_path(src, &mut out.diffs)?,
            (false, true) => {
                self.entering_backup_diffs(src, dst, existing.as_ref(), status.as_ref(), out)?
            }
            (false, false) => {}
        }

        match existing {
            Some(record) => {
                out.ops.push(MutationOp::RewritePrefix {
                    from: src.to_string(),
                    to: dst.to_string(),
                    descendants: record.is_dir,
                });
                if let Some(status) = status {
                    out.ops.push(MutationOp::UpdateFields {
                        path: dst.to_string(),
                        fields: status_fields(status),
                    });
                }
            }
            None => {
                if let Some(status) = status {
                    out.ops.push(MutationOp::Insert(status.into_record(dst)));
                }
            }
        }
        Ok(())
    }

    /// An object moved from outside any backup source into one: everything it
    /// contains has to be copied in full.
    fn entering_backup_diffs(
        &self,
        src: &str,
        dst: &str,
        existing: Option<&FileRecord>,
        status: Option<&FileStatus>,
        out: &mut Translation,
    ) -> Result<()> {
        let (is_dir, length) = match (existing, status) {
            (Some(record), _) => (record.is_dir, record.length),
            (None, Some(status)) => (status.is_dir, status.length),
            (None, None) => {
                debug!("Nothing known about {} renamed into backup as {}", src, dst);
                return Ok(());
            }
        };

        if !is_dir {
            out.diffs.push(
                FileDiff::new(FileDiffType::Append, dst)
                    .with_param("offset", 0)
                    .with_param("length", length),
            );
            return Ok(());
        }

        let src_prefix = paths::with_trailing_slash(src);
        let dst_prefix = paths::with_trailing_slash(dst);
        for file in self.pending.get_by_prefix_ordered(self.store, &src_prefix)? {
            if file.is_dir {
                continue;
            }
            let Some(target) = paths::replace_prefix(&file.path, &src_prefix, &dst_prefix) else {
                continue;
            };
            out.diffs.push(
                FileDiff::new(FileDiffType::Append, &target)
                    .with_param("offset", 0)
                    .with_param("length", file.length),
            );
        }
        Ok(())
    }

    fn on_metadata_update(
        &self,
        path: &str,
        change: &MetadataChange,
        out: &mut Translation,
    ) -> Result<()> {
        let mut fields = Vec::new();
        let mut diff = FileDiff::new(FileDiffType::Metadata, path);

        match change {
            MetadataChange::Times { mtime, atime } => {
                if *mtime > 0 {
                    fields.push(FieldUpdate::ModificationTime(*mtime));
                    diff.parameters.insert("mtime", mtime);
                }
                // Access times are not mirrored to backups.
                if *atime > 0 {
                    fields.push(FieldUpdate::AccessTime(*atime));
                }
            }
            MetadataChange::Owner { owner, group } => {
                if let Some(owner) = owner {
                    fields.push(FieldUpdate::Owner(owner.clone()));
                    diff.parameters.insert("owner", owner);
                }
                if let Some(group) = group {
                    fields.push(FieldUpdate::Group(group.clone()));
                }
            }
            MetadataChange::Perms { permission } => {
                fields.push(FieldUpdate::Permission(i32::from(*permission)));
                diff.parameters.insert("permission", permission);
            }
            MetadataChange::Replication { replication } => {
                fields.push(FieldUpdate::Replication(*replication));
                diff.parameters.insert("replication", replication);
            }
            MetadataChange::Xattrs { xattrs } => {
                for xattr in xattrs {
                    debug!("xattr on {}: {}", path, xattr);
                }
                return Ok(());
            }
            MetadataChange::Acls { entries } => {
                debug!("{} acl entries changed on {}", entries.len(), path);
                return Ok(());
            }
        }

        if !diff.parameters.is_empty() && self.in_backup(path)? {
            out.diffs.push(diff);
        }
        if !fields.is_empty() {
            out.ops.push(MutationOp::UpdateFields {
                path: path.to_string(),
                fields,
            });
        }
        Ok(())
    }

    fn on_unlink(&self, path: &str, out: &mut Translation) -> Result<()> {
        if paths::is_root(path) {
            warn!("Deleting root directory!!!");
            self.delete_diffs_for_path(paths::ROOT, &mut out.diffs)?;
            out.ops.push(MutationOp::DeleteByPrefix(paths::ROOT.to_string()));
            return Ok(());
        }

        // Replica paths never carry a trailing slash.
        let path = paths::strip_trailing_slash(path);
        let Some(record) = self.record_at(path)? else {
            debug!("Unlinked path {} not in replica", path);
            return Ok(());
        };

        self.delete_diffs_for_path(path, &mut out.diffs)?;
        out.ops.push(MutationOp::DeleteByPath(path.to_string()));
        if record.is_dir {
            out.ops
                .push(MutationOp::DeleteByPrefix(paths::with_trailing_slash(path)));
        }
        Ok(())
    }
}

fn status_fields(status: FileStatus) -> Vec<FieldUpdate> {
    vec![
        FieldUpdate::Length(status.length),
        FieldUpdate::ModificationTime(status.modification_time),
        FieldUpdate::AccessTime(status.access_time),
        FieldUpdate::Owner(status.owner),
        FieldUpdate::Group(status.group),
        FieldUpdate::Permission(status.permission),
        FieldUpdate::Replication(status.replication),
    ]
}
