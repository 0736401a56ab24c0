//! Mocks and fixtures shared by the Braid test suites.

mod agents;
mod nodes;
mod repository;
mod tools;

pub use agents::StaticAgent;
pub use nodes::{fail_node, pause_node, set_node, CountingNode};
pub use repository::RecordingRepository;
pub use tools::{EchoTool, FailingTool, SlowTool};

use std::path::PathBuf;

/// Unique SQLite path under the system temp dir.
pub fn temp_db_path() -> PathBuf {
    std::env::temp_dir().join(format!("braid-test-{}.db", uuid::Uuid::new_v4()))
}

/// Temp directory removed on drop.
pub fn temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("create temp dir")
}
