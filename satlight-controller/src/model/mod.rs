///! Satellite state engine
///!
///! - `SatelliteTable`: shared solved/window state, persisted on every mutation
///! - `StateStore`: JSON snapshot on disk
///! - `PatternResolver`: (solved, transmitting) -> `Pattern`

mod types;
pub use types::*;

pub mod window;
pub use window::{TimeWindow, TIMESTAMP_FORMAT, parse_timestamp};

mod store;
pub use store::StateStore;

mod table;
pub use table::{SatelliteTable, local_now};

mod pattern;
pub use pattern::{Palette, Pattern, PatternResolver, scale};
