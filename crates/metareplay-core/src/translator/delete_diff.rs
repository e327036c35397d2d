//! DELETE diff derivation for unlinks and for renames that leave backup scope.

use super::EventTranslator;
use crate::client::FileStatusClient;
use crate::error::Result;
use crate::paths;
use crate::storage::models::{BackupMapping, FileDiff, FileDiffType};
use crate::store::{BackupRegistry, MetadataReplica};
use tracing::{debug, error};
use url::Url;

/// Whether a mapped destination is the root of its filesystem, either plain
/// `/` or a bare `scheme://host[:port][/]`. A relative path is never a root.
pub fn collapses_to_root(dest_path: &str) -> Result<bool, url::ParseError> {
    if dest_path.starts_with('/') {
        return Ok(dest_path == paths::ROOT);
    }
    match Url::parse(dest_path) {
        Ok(url) => Ok(matches!(url.path(), "" | "/")),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(false),
        Err(e) => Err(e),
    }
}

impl<'a, C, S> EventTranslator<'a, C, S>
where
    C: FileStatusClient,
    S: MetadataReplica + BackupRegistry,
{
    /// Emit DELETE diffs for `path` against every backup mapping covering it.
    pub(super) fn delete_diffs_for_path(&self, path: &str, diffs: &mut Vec<FileDiff>) -> Result<()> {
        let path_with_slash = paths::with_trailing_slash(path);
        if !self.store.is_under_backup_source(&path_with_slash)? {
            return Ok(());
        }

        for mapping in self.store.mappings_for_source(&path_with_slash)? {
            let Some(dest_path) = mapping.map_path(&path_with_slash) else {
                continue;
            };
            match collapses_to_root(&dest_path) {
                Ok(true) => self.expand_root_collapse(&mapping, &path_with_slash, diffs)?,
                Ok(false) => diffs.push(
                    FileDiff::new(FileDiffType::Delete, paths::strip_trailing_slash(path))
                        .with_param("dest", paths::strip_trailing_slash(&dest_path)),
                ),
                Err(e) => {
                    error!(
                        "Skipping delete diff for {} -> {}: bad destination: {}",
                        path, dest_path, e
                    );
                }
            }
        }
        Ok(())
    }

    /// The destination root itself cannot be deleted, so delete every entry
    /// under `dir` instead, one diff per top-most entry.
    fn expand_root_collapse(
        &self,
        mapping: &BackupMapping,
        dir: &str,
        diffs: &mut Vec<FileDiff>,
    ) -> Result<()> {
        let entries = self.top_level_entries_under(dir)?;
        debug!(
            "Destination of {} is a filesystem root, emitting {} delete diffs",
            dir,
            entries.len()
        );
        for src in entries {
            let Some(dest) = mapping.map_path(&src) else {
                continue;
            };
            diffs.push(FileDiff::new(FileDiffType::Delete, &src).with_param("dest", dest));
        }
        Ok(())
    }

    /// Paths under `dir`, skipping anything inside a directory already listed.
    fn top_level_entries_under(&self, dir: &str) -> Result<Vec<String>> {
        let dir = paths::with_trailing_slash(dir);
        let mut entries = Vec::new();
        let mut listed_dirs: Vec<String> = Vec::new();

        // Ascending order puts every directory before its contents.
        for record in self.pending.get_by_prefix_ordered(self.store, &dir)? {
            if listed_dirs
                .iter()
                .any(|listed| record.path.starts_with(listed.as_str()))
            {
                continue;
            }
            if record.is_dir {
                listed_dirs.push(paths::with_trailing_slash(&record.path));
            }
            entries.push(record.path);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_paths() {
        assert_eq!(collapses_to_root("/"), Ok(true));
        assert_eq!(collapses_to_root("/dest/"), Ok(false));
        assert_eq!(collapses_to_root("/dest/dir"), Ok(false));
    }

    #[test]
    fn test_uri_roots() {
        assert_eq!(collapses_to_root("hdfs://backup-nn:9000"), Ok(true));
        assert_eq!(collapses_to_root("hdfs://backup-nn:9000/"), Ok(true));
        assert_eq!(collapses_to_root("hdfs://backup-nn:9000/mirror/"), Ok(false));
        assert_eq!(collapses_to_root("file:///"), Ok(true));
    }

    #[test]
    fn test_relative_destination_is_not_a_root() {
        assert_eq!(collapses_to_root("relative/dest/"), Ok(false));
        assert_eq!(collapses_to_root("backup-dir"), Ok(false));
    }

    #[test]
    fn test_malformed_destination() {
        assert!(collapses_to_root("hdfs://bad host:9000/").is_err());
        assert!(collapses_to_root("hdfs://backup-nn:99999/").is_err());
    }
}
