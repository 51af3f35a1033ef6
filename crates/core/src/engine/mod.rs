//! Boundary to the external audio engine.
//!
//! Mixing, resampling and channel virtualization live entirely inside the
//! engine. This module only describes the calls the player makes and the
//! status codes the engine answers with. Two backends are provided: a headless
//! [`simulated`] engine and, behind the `kira` feature, a real output engine.

use std::{fmt, path::Path, sync::Arc};

#[cfg(feature = "kira")]
pub mod kira;
pub mod simulated;

/// Result of a single engine call.
pub type EngineResult<T> = std::result::Result<T, EngineCode>;

/// Non-success status codes returned by engine calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineCode {
    ChannelAlloc,
    FileNotFound,
    Format,
    Initialized,
    Internal,
    InvalidHandle,
    InvalidParam,
    Memory,
    Output,
    Uninitialized,
}

impl EngineCode {
    /// Numeric status code, stable across backends.
    pub fn code(self) -> u32 {
        match self {
            Self::ChannelAlloc => 5,
            Self::FileNotFound => 18,
            Self::Format => 19,
            Self::Initialized => 32,
            Self::Internal => 28,
            Self::InvalidHandle => 30,
            Self::InvalidParam => 31,
            Self::Memory => 38,
            Self::Output => 51,
            Self::Uninitialized => 69,
        }
    }

    /// Human readable description of the status.
    pub fn describe(self) -> &'static str {
        match self {
            Self::ChannelAlloc => "Error trying to allocate a channel.",
            Self::FileNotFound => "File not found.",
            Self::Format => "Unsupported file or audio format.",
            Self::Initialized => "Cannot call this command after System::init.",
            Self::Internal => "An error occurred that wasn't supposed to.",
            Self::InvalidHandle => "An invalid object handle was used.",
            Self::InvalidParam => "An invalid parameter was passed to this function.",
            Self::Memory => "Not enough memory or resources.",
            Self::Output => "Error initializing output device.",
            Self::Uninitialized => "This command failed because System::init was not called.",
        }
    }
}

impl fmt::Display for EngineCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {}", self.code())
    }
}

/// Opaque reference to a loaded sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundHandle(pub(crate) u32);

/// Opaque reference to one playback instance of a sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandle(pub(crate) u32);

impl ChannelHandle {
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

/// Channel group a sound may be routed to. `None` means the master group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelGroupHandle(pub u32);

/// Initialization flags passed to [`SoundSystem::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitFlags(u32);

impl InitFlags {
    pub const NORMAL: Self = Self(0);

    pub fn bits(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeakerMode {
    #[default]
    Default,
    Mono,
    Stereo,
}

/// Playback mode requested when a sound is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoundMode {
    #[default]
    LoopOff,
    LoopNormal,
}

/// Extra information attached to a sound at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreateSoundInfo {
    pub user_data: u64,
}

/// Description of an output driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub name: String,
    pub sample_rate: u32,
    pub speaker_mode: SpeakerMode,
    pub speaker_channels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    Channel,
    ChannelGroup,
}

/// Kind of notification a channel callback receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackType {
    End,
    VirtualVoice,
    SyncPoint,
    Occlusion,
}

/// Notification delivered to a channel callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEvent {
    pub channel: ChannelHandle,
    pub control: ControlType,
    pub kind: CallbackType,
}

impl ChannelEvent {
    pub fn new(channel: ChannelHandle, kind: CallbackType) -> Self {
        Self {
            channel,
            control: ControlType::Channel,
            kind,
        }
    }
}

/// Callback registered on a channel. Engines invoke it from inside
/// [`SoundSystem::update`] on the calling thread.
pub type ChannelCallback = Arc<dyn Fn(&ChannelEvent) -> EngineResult<()> + Send + Sync>;

/// Module level engine services that exist before any engine instance.
pub trait AudioRuntime {
    type System: SoundSystem;

    /// Makes `source` readable by the engine as `folder` + `name`.
    fn preload_file(
        &mut self,
        folder: &str,
        name: &str,
        source: &Path,
        can_read: bool,
        can_write: bool,
    ) -> EngineResult<()>;

    /// Creates the engine instance. A runtime hands out exactly one.
    fn create_system(&mut self) -> EngineResult<Self::System>;
}

/// The engine instance. All sounds and channels are scoped to it.
pub trait SoundSystem {
    /// Sets the mixer block length in samples and the number of blocks.
    fn set_dsp_buffer_size(&mut self, length: u32, count: u32) -> EngineResult<()>;

    fn driver_info(&self, driver: usize) -> EngineResult<DriverInfo>;

    fn set_software_format(
        &mut self,
        sample_rate: u32,
        speaker_mode: SpeakerMode,
        raw_speakers: u32,
    ) -> EngineResult<()>;

    fn init(&mut self, max_channels: u32, flags: InitFlags) -> EngineResult<()>;

    fn create_sound(
        &mut self,
        path: &str,
        mode: SoundMode,
        info: &CreateSoundInfo,
    ) -> EngineResult<SoundHandle>;

    fn play_sound(
        &mut self,
        sound: SoundHandle,
        group: Option<ChannelGroupHandle>,
        paused: bool,
    ) -> EngineResult<ChannelHandle>;

    fn set_channel_callback(
        &mut self,
        channel: ChannelHandle,
        callback: ChannelCallback,
    ) -> EngineResult<()>;

    fn set_channel_paused(&mut self, channel: ChannelHandle, paused: bool) -> EngineResult<()>;

    /// Stops a channel and frees it. Its callback is dropped without an `End`
    /// notification.
    fn stop_channel(&mut self, channel: ChannelHandle) -> EngineResult<()>;

    /// Advances engine bookkeeping and delivers pending channel callbacks.
    fn update(&mut self) -> EngineResult<()>;

    fn release(&mut self) -> EngineResult<()>;
}

/// Invokes a channel callback, logging failures the engine would ignore.
pub(crate) fn deliver(callback: &ChannelCallback, event: ChannelEvent) {
    if let Err(code) = callback(&event) {
        tracing::warn!(channel = %event.channel, %code, "channel callback reported failure");
    }
}

/// Joins a sandbox folder and a file name into the path engines resolve.
pub fn sandbox_path(folder: &str, name: &str) -> String {
    if folder.ends_with('/') {
        format!("{folder}{name}")
    } else {
        format!("{folder}/{name}")
    }
}
