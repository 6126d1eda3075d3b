//! Lifecycle management of the n8n container
//!
//! [`AppManager`] drives every operation against an injected [`Engine`]:
//! status inspection, the local image inventory, volume backups, upgrades
//! with checkpoint-based recovery, rollback and start/stop/restart.
//! [`DockerEngine`] is the bollard implementation of the engine.

pub mod backup;
pub mod checkpoint;
pub mod docker;
pub mod engine;
mod error;
pub mod images;
pub mod manager;
pub mod progress;
pub mod resolve;
pub mod rollback;
pub mod status;
pub mod upgrade;

pub use backup::backup_filename;
pub use checkpoint::{CheckpointStore, UpgradeCheckpoint, UpgradeLock, UpgradeStage};
pub use docker::DockerEngine;
pub use engine::{
    ContainerDetails, ContainerSpec, Engine, EngineState, HelperSpec, ImageDetails, MountInfo, MountKind, StatsSample,
};
pub use manager::AppManager;
pub use progress::{NoProgress, ProgressSink};
pub use resolve::{LabelStrategy, SiblingTagStrategy, VersionResolver, VersionStrategy};
pub use rollback::select_rollback_target;
pub use status::{cpu_percent, memory_percent};
pub use upgrade::RecoveryOutcome;
