//! Core library for the Ambience randomized sound player.
//!
//! The crate sequences an external audio engine: asset files are preloaded
//! into the engine sandbox, the engine is bootstrapped, every asset becomes a
//! sound, and a loop driver plays random sounds at a fixed cadence until it is
//! cancelled. Mixing and everything else audible happens inside the engine
//! backend behind [`engine::SoundSystem`].

pub mod assets;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod driver;
pub mod engine;
pub mod error;
pub mod playback;
pub mod registry;

pub use assets::{preload_assets, AssetCatalog, STANDARD_ASSETS};
pub use bootstrap::bootstrap;
pub use config::{AppConfig, AssetConfig, EngineConfig, PlayErrorPolicy, PlaybackConfig};
pub use context::{preload_hook, ready_hook, AudioContext};
pub use driver::{DriverReport, IndexPicker, LoopDriver};
pub use engine::{
    simulated::{SimulatedRuntime, SimulatedSystem},
    AudioRuntime, ChannelHandle, EngineCode, SoundHandle, SoundSystem,
};
pub use error::{AmbienceError, Result};
pub use playback::PlaybackController;
pub use registry::SoundRegistry;
