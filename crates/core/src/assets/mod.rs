use std::path::Path;

use crate::{
    engine::{sandbox_path, AudioRuntime},
    error::check,
    AmbienceError, Result,
};

/// Sandbox folder the assets are mounted into.
pub const MOUNT_FOLDER: &str = "/";

/// The sounds shipped with the player, in playback index order.
pub const STANDARD_ASSETS: [&str; 5] = [
    "flow-water.wav",
    "water-flow(1).wav",
    "water-flow(2).wav",
    "waterfall.wav",
    "watertap.wav",
];

/// Ordered, immutable list of sound files mounted into the engine sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetCatalog {
    folder: String,
    files: Vec<String>,
}

impl Default for AssetCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl AssetCatalog {
    /// The fixed five-file water catalog.
    pub fn standard() -> Self {
        Self {
            folder: MOUNT_FOLDER.to_string(),
            files: STANDARD_ASSETS.iter().map(|name| name.to_string()).collect(),
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path the engine resolves the asset at `index` under.
    pub fn sandbox_path(&self, index: usize) -> Option<String> {
        self.files
            .get(index)
            .map(|name| sandbox_path(&self.folder, name))
    }
}

/// Registers every catalog entry with the runtime's read-only sandbox.
///
/// Must run before the engine is initialized. The sources are read from
/// `base`, which has to be an existing directory.
pub fn preload_assets<R: AudioRuntime>(
    runtime: &mut R,
    catalog: &AssetCatalog,
    base: &Path,
) -> Result<()> {
    if !base.is_dir() {
        return Err(AmbienceError::MountPoint(base.to_path_buf()));
    }

    tracing::info!(base = %base.display(), files = catalog.len(), "preloading assets");

    for name in catalog.files() {
        let source = base.join(name);
        tracing::debug!(%name, source = %source.display(), "preloading asset");
        check(
            "FS::createPreloadedFile",
            runtime.preload_file(catalog.folder(), name, &source, true, false),
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        simulated::{EngineCall, Operation, SimulatedRuntime},
        EngineCode,
    };

    #[test]
    fn standard_catalog_has_five_ordered_entries() {
        let catalog = AssetCatalog::standard();

        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.files()[0], "flow-water.wav");
        assert_eq!(catalog.files()[4], "watertap.wav");
        assert_eq!(catalog.sandbox_path(1).as_deref(), Some("/water-flow(1).wav"));
        assert_eq!(catalog.sandbox_path(5), None);
    }

    #[test]
    fn registers_every_asset_read_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in STANDARD_ASSETS {
            std::fs::write(dir.path().join(name), b"RIFF").unwrap();
        }

        let mut runtime = SimulatedRuntime::new();
        let probe = runtime.probe();
        preload_assets(&mut runtime, &AssetCatalog::standard(), dir.path()).unwrap();

        let calls = probe.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(
            calls[2],
            EngineCall::PreloadFile {
                path: "/water-flow(2).wav".to_string(),
                can_read: true,
                can_write: false,
            }
        );
    }

    #[test]
    fn missing_mount_point_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nowhere");
        let mut runtime = SimulatedRuntime::new();
        let probe = runtime.probe();

        let err = preload_assets(&mut runtime, &AssetCatalog::standard(), &missing).unwrap_err();

        assert!(matches!(err, AmbienceError::MountPoint(_)));
        assert_eq!(probe.count(Operation::PreloadFile), 0);
    }

    #[test]
    fn missing_asset_surfaces_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("flow-water.wav"), b"RIFF").unwrap();

        let mut runtime = SimulatedRuntime::new();
        let err = preload_assets(&mut runtime, &AssetCatalog::standard(), dir.path()).unwrap_err();

        assert_eq!(err.engine_code(), Some(EngineCode::FileNotFound.code()));
        assert!(format!("{err}").contains("File not found"));
    }
}
