use crate::{
    assets::AssetCatalog,
    engine::{CreateSoundInfo, SoundHandle, SoundMode, SoundSystem},
    error::check,
    AmbienceError, Result,
};

/// Tag attached to every sound the registry creates.
pub const SOUND_USER_DATA: u64 = 12345;

/// Loaded sounds, indexed by their position in the asset catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoundRegistry {
    sounds: Vec<SoundHandle>,
}

impl SoundRegistry {
    /// Creates one non-looping sound per catalog entry. Any failure discards
    /// the whole registry.
    pub fn load<S: SoundSystem>(system: &mut S, catalog: &AssetCatalog) -> Result<Self> {
        tracing::info!(count = catalog.len(), "loading sounds");
        let info = CreateSoundInfo {
            user_data: SOUND_USER_DATA,
        };

        let mut sounds = Vec::with_capacity(catalog.len());
        for (index, name) in catalog.files().iter().enumerate() {
            let path = crate::engine::sandbox_path(catalog.folder(), name);
            let handle = check(
                "System::createSound",
                system.create_sound(&path, SoundMode::LoopOff, &info),
            )?;
            tracing::debug!(index, %path, "sound loaded");
            sounds.push(handle);
        }

        Ok(Self { sounds })
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<SoundHandle> {
        self.sounds.get(index).copied()
    }

    /// Looks up a sound, rejecting indices outside the registry.
    pub fn require(&self, index: usize) -> Result<SoundHandle> {
        self.get(index).ok_or(AmbienceError::SoundIndexOutOfRange {
            index,
            len: self.len(),
        })
    }

    pub fn handles(&self) -> &[SoundHandle] {
        &self.sounds
    }
}
