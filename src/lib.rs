pub mod archive;
pub mod cli;
pub mod config;
pub mod coverage;
pub mod db;
pub mod distance;
pub mod error;
pub mod index;
pub mod monitor;
pub mod provider;
pub mod utils;
pub mod vector;

pub use archive::{Archive, ArchiveBuilder};
pub use config::Opts;
pub use error::{Error, Result};
