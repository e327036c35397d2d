use super::Ownership;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

/// Numeric uid/gid; name resolution is left to the consumer.
pub fn get_ownership(metadata: &Metadata) -> Ownership {
    Ownership {
        owner: metadata.uid().to_string(),
        group: metadata.gid().to_string(),
        permission: (metadata.mode() & 0o7777) as i32,
    }
}
