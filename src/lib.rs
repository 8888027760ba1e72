//! dirwatch library
//!
//! Watches directories and runs templated shell commands when files in them
//! change.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod observability;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
