pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod matching;
pub mod persistence;
pub mod service;
pub mod store;
pub mod sync;
pub mod test_utils;
pub mod types;

pub use error::{ContactError, ErrorKind, Result};
