//! Satellite LED controller.
//!
//! Receives scoring-platform webhooks, keeps per-satellite solved and
//! transmission-window state on disk, and continuously renders that state
//! onto an addressable LED strip.

pub mod config;
pub mod error;
pub mod led;
pub mod logging;
pub mod model;
pub mod render;
pub mod server;
