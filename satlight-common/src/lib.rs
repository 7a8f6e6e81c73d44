//! Wire types shared between the satellite LED controller and its clients.

pub mod types;

pub use types::*;
