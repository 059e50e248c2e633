#![forbid(unsafe_code)]

//! Level Save Runtime
//!
//! Ties `blb-core` to a running editor: one background writer per editor,
//! a callback queue back to the owning thread, and the mounted file.
//!
//! # Key Components
//!
//! - [`PersistenceService`] - save/autosave/export requests and graph edits
//! - [`MainThreadDispatcher`] - FIFO of callbacks drained once per tick
//! - [`FileDirectory`] - project directory, temp files, the mount and cursor
//! - [`EditSession`] - dirty tracking, edit batches, autosave timing
//! - [`SaveConfig`] - limits and paths, loadable from TOML or JSON
//!
//! # Threading
//! Only [`PersistenceService::tick`] applies worker results, and it runs on
//! the thread that owns the service. The worker never touches the mount.

pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod pipeline;
pub mod session;
pub mod status;

pub use config::{ConfigError, SaveConfig};
pub use directory::{FileDirectory, FileEntry, FileInfo};
pub use dispatcher::MainThreadDispatcher;
pub use pipeline::{LevelEditor, PendingSave, PersistenceService, SaveOutcome, SaveRequest};
pub use session::EditSession;
pub use status::{Status, StatusLevel, StatusSink};
