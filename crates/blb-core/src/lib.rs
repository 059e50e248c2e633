#![forbid(unsafe_code)]

//! Level Save Core
//!
//! Storage model for the level editor's save files: a linear chain of
//! manual saves, each stored as a tile delta against the previous one, with
//! autosaves hanging off individual manual saves.
//!
//! # Key Components
//!
//! - [`Version`] - `(manual, auto)` identifier with newest-first ordering
//! - [`TileDelta`], [`diff`], [`flatten`] - the delta engine
//! - [`FileData`] - the version graph; every mutation returns a new value
//! - [`format`] - `.blb` framing (JSON header line + gzip or plain body)
//!
//! # How it fits in the system
//! This crate is pure and synchronous. `blb-runtime` owns threads, mounts
//! and the save pipeline; `blb-inspect` uses this crate directly to work on
//! files offline.

pub mod delta;
pub mod error;
pub mod format;
pub mod graph;
pub mod level;
pub mod tile;
pub mod version;

pub use delta::{DeltaAccumulator, TileDelta, diff, flatten, replay};
pub use error::{BlbError, ErrorKind, FormatError, Result};
pub use format::{
    DecodedFile, FormatWarning, decode, decode_with_tag, encode, read_file, read_file_with_tag,
    staging_path, write_file,
};
pub use graph::{EntryKind, Reconstructed};
pub use level::{
    EDITOR_VERSION_TAG, FileData, FileHeader, LevelData, LevelMeta, Thumbnail, file_time_now,
    file_time_to_datetime,
};
pub use tile::{Direction, Grid, Position, Tile, TileState, grid_of, sorted_tiles};
pub use version::{ParseVersionError, Version};
