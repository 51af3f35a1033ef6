use std::path::Path;

use crate::{
    assets::{preload_assets, AssetCatalog},
    bootstrap::{bootstrap, release_after_failure},
    config::{AppConfig, EngineConfig},
    engine::{AudioRuntime, ChannelHandle, SoundSystem},
    error::check,
    playback::PlaybackController,
    registry::SoundRegistry,
    Result,
};

/// Runs before the engine exists: mounts the catalog into the runtime sandbox.
pub fn preload_hook<R: AudioRuntime>(
    runtime: &mut R,
    catalog: &AssetCatalog,
    base: &Path,
) -> Result<()> {
    preload_assets(runtime, catalog, base)
}

/// Runs once the runtime is available: bootstraps the engine and loads every
/// sound of the catalog.
pub fn ready_hook<R: AudioRuntime>(
    runtime: &mut R,
    catalog: &AssetCatalog,
    config: &EngineConfig,
) -> Result<AudioContext<R::System>> {
    let mut system = bootstrap(runtime, config)?;
    let sounds = match SoundRegistry::load(&mut system, catalog) {
        Ok(sounds) => sounds,
        Err(err) => {
            release_after_failure(&mut system);
            return Err(err);
        }
    };

    Ok(AudioContext {
        system,
        catalog: catalog.clone(),
        sounds,
        playback: PlaybackController::new(),
        released: false,
    })
}

/// Owns the engine instance together with everything scoped to it.
pub struct AudioContext<S: SoundSystem> {
    system: S,
    catalog: AssetCatalog,
    sounds: SoundRegistry,
    playback: PlaybackController,
    released: bool,
}

impl<S: SoundSystem> AudioContext<S> {
    /// Preloads the standard catalog and brings the engine up.
    pub fn start<R>(runtime: &mut R, config: &AppConfig) -> Result<Self>
    where
        R: AudioRuntime<System = S>,
    {
        let catalog = AssetCatalog::standard();
        preload_hook(runtime, &catalog, &config.assets.base_path)?;
        ready_hook(runtime, &catalog, &config.engine)
    }

    /// Starts the sound at `index` and makes its channel current.
    pub fn play(&mut self, index: usize) -> Result<ChannelHandle> {
        self.playback.play(&mut self.system, &self.sounds, index)
    }

    /// Lets the engine deliver pending channel callbacks.
    pub fn update(&mut self) -> Result<()> {
        check("System::update", self.system.update())
    }

    pub fn current_channel(&self) -> Result<Option<ChannelHandle>> {
        self.playback.current_channel()
    }

    pub fn sound_count(&self) -> usize {
        self.sounds.len()
    }

    pub fn sound_name(&self, index: usize) -> Option<&str> {
        self.catalog.files().get(index).map(String::as_str)
    }

    pub fn sounds(&self) -> &SoundRegistry {
        &self.sounds
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    /// Releases the engine instance. Later calls are no-ops.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }

        self.released = true;
        tracing::info!("releasing engine");
        check("System::release", self.system.release())
    }
}

impl<S: SoundSystem> Drop for AudioContext<S> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(err) = self.shutdown() {
                tracing::warn!(%err, "engine release failed during drop");
            }
        }
    }
}

impl<S: SoundSystem> std::fmt::Debug for AudioContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioContext")
            .field("sounds", &self.sounds.len())
            .field("released", &self.released)
            .finish()
    }
}
