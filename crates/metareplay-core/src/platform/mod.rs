#[cfg(unix)]
pub mod unix;

use std::fs::Metadata;

/// Owner, group and permission bits as the replica records them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub owner: String,
    pub group: String,
    pub permission: i32,
}

#[cfg(unix)]
pub fn get_ownership(metadata: &Metadata) -> Ownership {
    unix::get_ownership(metadata)
}

#[cfg(not(unix))]
pub fn get_ownership(metadata: &Metadata) -> Ownership {
    let permission = if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    };
    Ownership {
        owner: String::new(),
        group: String::new(),
        permission,
    }
}
