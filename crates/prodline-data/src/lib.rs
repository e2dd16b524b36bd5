//! Prodline Data -- loads production line descriptions from RON, TOML or
//! JSON files and builds ready-to-run coordinators.

pub mod loader;

pub use loader::{DataLoadError, Format, build_coordinator, load_line, load_pipeline};
