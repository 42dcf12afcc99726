//! Engine configuration.
//!
//! Settings are consumed, never written: the host application owns the
//! file. See [`Settings`] for the layout and `load.rs` for the
//! resolution order.

mod load;
mod schema;

#[cfg(test)]
mod tests;

pub use load::{default_config_path, resolve_config_path};
pub use schema::{CacheSettings, LibrarySettings, LoopModeSetting, PlaybackSettings, Settings};
