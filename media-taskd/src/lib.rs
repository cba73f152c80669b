//! media-taskd library crate.
//!
//! A background media task service: it accepts thumbnail and lowres proxy
//! jobs over HTTP, queues them by priority, runs a bounded number of ffmpeg
//! processes at once and reports progress back to the request server.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod pipeline;
pub mod shares;
pub mod status;
pub mod utils;

pub use error::{Error, Result};
