//! Configuration data structures for simulation setups.

mod model;
mod settings;

pub use model::{BreakpointScope, InitialGenealogy, Model};
pub use settings::{Settings, SettingsError};
