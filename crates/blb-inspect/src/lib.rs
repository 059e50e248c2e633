#![forbid(unsafe_code)]

//! Command-line inspection of `.blb` level files.
//!
//! Read-only commands (`header`, `versions`, `show`, `validate`) never
//! touch the file. `export`, `extract` and `flatten` write a new file;
//! `promote` and `delete` rewrite the input unless `-o` is given.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;

pub use cli::{run, run_from_env};
pub use error::{InspectError, Result};
