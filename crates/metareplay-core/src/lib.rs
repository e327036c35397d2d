pub mod applier;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod paths;
pub mod platform;
pub mod storage;
pub mod store;
pub mod translator;

pub use applier::{ApplyReport, DiffDelivery, EventApplier};
pub use client::{FileStatus, FileStatusClient, LocalFsClient};
pub use config::AppConfig;
pub use error::Error;
pub use event::{Event, MetadataChange};
pub use store::{BackupRegistry, DiffLog, MetaStore, MetadataReplica};
pub use translator::{EventTranslator, Translation};
