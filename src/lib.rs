pub mod ci;
pub mod config;
pub mod cross_request;
pub mod domain;
pub mod error;
pub mod gate;
pub mod git;
pub mod logging;
pub mod patch;
pub mod release;
pub mod translations;
pub mod ui;

pub use error::{ReleaseError, Result};
