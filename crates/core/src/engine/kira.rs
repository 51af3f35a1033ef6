//! Audible backend built on `kira`, rendering through `cpal`.
//!
//! Driver 0 is the host's default output device, which is also the device the
//! mixer opens. `kira` renders at the device's native rate, so matching the
//! software format never inserts a resampler.

use std::{
    collections::{BTreeMap, HashMap},
    io::Cursor,
    path::Path,
    sync::Arc,
    time::Duration,
};

use cpal::{
    traits::{DeviceTrait, HostTrait},
    BufferSize,
};
use kira::{
    backend::cpal::{CpalBackend, CpalBackendSettings},
    sound::{
        static_sound::{StaticSoundData, StaticSoundHandle},
        PlaybackState,
    },
    track::MainTrackBuilder,
    AudioManager, AudioManagerSettings, Tween,
};

use super::{
    deliver, sandbox_path, AudioRuntime, CallbackType, ChannelCallback, ChannelEvent,
    ChannelGroupHandle, ChannelHandle, CreateSoundInfo, DriverInfo, EngineCode, EngineResult,
    InitFlags, SoundHandle, SoundMode, SoundSystem, SpeakerMode,
};

fn immediate() -> Tween {
    Tween {
        duration: Duration::ZERO,
        ..Default::default()
    }
}

/// Runtime half of the `kira` backend: owns the preloaded file contents.
#[derive(Debug, Default)]
pub struct KiraRuntime {
    sandbox: HashMap<String, Arc<[u8]>>,
    system_created: bool,
}

impl KiraRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioRuntime for KiraRuntime {
    type System = KiraSystem;

    fn preload_file(
        &mut self,
        folder: &str,
        name: &str,
        source: &Path,
        can_read: bool,
        _can_write: bool,
    ) -> EngineResult<()> {
        if !can_read {
            return Err(EngineCode::InvalidParam);
        }

        let bytes = std::fs::read(source).map_err(|error| {
            tracing::debug!(source = %source.display(), %error, "preload source unreadable");
            EngineCode::FileNotFound
        })?;
        self.sandbox
            .insert(sandbox_path(folder, name), Arc::from(bytes));
        Ok(())
    }

    fn create_system(&mut self) -> EngineResult<KiraSystem> {
        if self.system_created {
            return Err(EngineCode::Initialized);
        }

        self.system_created = true;
        Ok(KiraSystem {
            sandbox: std::mem::take(&mut self.sandbox),
            buffer_frames: 1024,
            software_rate: None,
            manager: None,
            sounds: Vec::new(),
            channels: BTreeMap::new(),
            next_channel: 0,
            released: false,
        })
    }
}

struct KiraChannel {
    handle: StaticSoundHandle,
    callback: Option<ChannelCallback>,
}

/// Engine instance of the `kira` backend.
pub struct KiraSystem {
    sandbox: HashMap<String, Arc<[u8]>>,
    buffer_frames: u32,
    software_rate: Option<u32>,
    manager: Option<AudioManager<CpalBackend>>,
    sounds: Vec<StaticSoundData>,
    channels: BTreeMap<ChannelHandle, KiraChannel>,
    next_channel: u32,
    released: bool,
}

impl KiraSystem {
    fn live(&self) -> EngineResult<()> {
        match self.released {
            true => Err(EngineCode::InvalidHandle),
            false => Ok(()),
        }
    }

    fn before_init(&self) -> EngineResult<()> {
        self.live()?;
        match self.manager {
            Some(_) => Err(EngineCode::Initialized),
            None => Ok(()),
        }
    }

    fn manager(&mut self) -> EngineResult<&mut AudioManager<CpalBackend>> {
        self.live()?;
        self.manager.as_mut().ok_or(EngineCode::Uninitialized)
    }

    fn channel(&mut self, channel: ChannelHandle) -> EngineResult<&mut KiraChannel> {
        self.live()?;
        self.channels
            .get_mut(&channel)
            .ok_or(EngineCode::InvalidHandle)
    }
}

impl SoundSystem for KiraSystem {
    fn set_dsp_buffer_size(&mut self, length: u32, count: u32) -> EngineResult<()> {
        self.before_init()?;
        if length == 0 || count == 0 {
            return Err(EngineCode::InvalidParam);
        }

        // cpal takes a single period size; the block count has no equivalent.
        self.buffer_frames = length;
        Ok(())
    }

    fn driver_info(&self, driver: usize) -> EngineResult<DriverInfo> {
        self.live()?;
        if driver != 0 {
            return Err(EngineCode::InvalidParam);
        }

        let device = cpal::default_host()
            .default_output_device()
            .ok_or(EngineCode::Output)?;
        let config = device.default_output_config().map_err(|error| {
            tracing::warn!(%error, "cannot query output configuration");
            EngineCode::Output
        })?;
        let speaker_mode = match config.channels() {
            1 => SpeakerMode::Mono,
            2 => SpeakerMode::Stereo,
            _ => SpeakerMode::Default,
        };

        Ok(DriverInfo {
            name: device.name().unwrap_or_else(|_| "default output".to_string()),
            sample_rate: config.sample_rate().0,
            speaker_mode,
            speaker_channels: config.channels(),
        })
    }

    fn set_software_format(
        &mut self,
        sample_rate: u32,
        _speaker_mode: SpeakerMode,
        _raw_speakers: u32,
    ) -> EngineResult<()> {
        self.before_init()?;
        if sample_rate == 0 {
            return Err(EngineCode::InvalidParam);
        }

        self.software_rate = Some(sample_rate);
        Ok(())
    }

    fn init(&mut self, max_channels: u32, _flags: InitFlags) -> EngineResult<()> {
        self.before_init()?;
        if max_channels == 0 {
            return Err(EngineCode::InvalidParam);
        }

        let settings = AudioManagerSettings::<CpalBackend> {
            main_track_builder: MainTrackBuilder::new().sound_capacity(max_channels as usize),
            backend_settings: CpalBackendSettings {
                buffer_size: BufferSize::Fixed(self.buffer_frames),
                ..Default::default()
            },
            ..Default::default()
        };
        let manager = AudioManager::<CpalBackend>::new(settings).map_err(|error| {
            tracing::warn!(%error, "cannot open audio output");
            EngineCode::Output
        })?;

        tracing::debug!(
            sample_rate = ?self.software_rate,
            buffer_frames = self.buffer_frames,
            "kira manager started"
        );
        self.manager = Some(manager);
        Ok(())
    }

    fn create_sound(
        &mut self,
        path: &str,
        mode: SoundMode,
        _info: &CreateSoundInfo,
    ) -> EngineResult<SoundHandle> {
        self.manager()?;
        let bytes = self
            .sandbox
            .get(path)
            .cloned()
            .ok_or(EngineCode::FileNotFound)?;
        let data = StaticSoundData::from_cursor(Cursor::new(bytes)).map_err(|error| {
            tracing::warn!(%path, %error, "cannot decode sound");
            EngineCode::Format
        })?;
        let data = match mode {
            SoundMode::LoopOff => data,
            SoundMode::LoopNormal => data.loop_region(..),
        };

        let handle = SoundHandle(self.sounds.len() as u32);
        self.sounds.push(data);
        Ok(handle)
    }

    fn play_sound(
        &mut self,
        sound: SoundHandle,
        group: Option<ChannelGroupHandle>,
        paused: bool,
    ) -> EngineResult<ChannelHandle> {
        if group.is_some() {
            return Err(EngineCode::InvalidHandle);
        }
        let data = self
            .sounds
            .get(sound.0 as usize)
            .cloned()
            .ok_or(EngineCode::InvalidHandle)?;

        let mut handle = self
            .manager()?
            .play(data)
            .map_err(|_| EngineCode::ChannelAlloc)?;
        if paused {
            handle.pause(immediate());
        }

        let channel = ChannelHandle(self.next_channel);
        self.next_channel += 1;
        self.channels.insert(
            channel,
            KiraChannel {
                handle,
                callback: None,
            },
        );
        Ok(channel)
    }

    fn set_channel_callback(
        &mut self,
        channel: ChannelHandle,
        callback: ChannelCallback,
    ) -> EngineResult<()> {
        self.channel(channel)?.callback = Some(callback);
        Ok(())
    }

    fn set_channel_paused(&mut self, channel: ChannelHandle, paused: bool) -> EngineResult<()> {
        let entry = self.channel(channel)?;
        if paused {
            entry.handle.pause(immediate());
        } else {
            entry.handle.resume(immediate());
        }
        Ok(())
    }

    fn stop_channel(&mut self, channel: ChannelHandle) -> EngineResult<()> {
        self.live()?;
        let mut entry = self
            .channels
            .remove(&channel)
            .ok_or(EngineCode::InvalidHandle)?;
        entry.handle.stop(immediate());
        Ok(())
    }

    fn update(&mut self) -> EngineResult<()> {
        self.live()?;

        let ended: Vec<ChannelHandle> = self
            .channels
            .iter()
            .filter(|(_, channel)| channel.handle.state() == PlaybackState::Stopped)
            .map(|(handle, _)| *handle)
            .collect();

        for handle in ended {
            if let Some(KiraChannel {
                callback: Some(callback),
                ..
            }) = self.channels.remove(&handle)
            {
                deliver(&callback, ChannelEvent::new(handle, CallbackType::End));
            }
        }

        Ok(())
    }

    fn release(&mut self) -> EngineResult<()> {
        self.live()?;
        self.released = true;
        self.channels.clear();
        self.sounds.clear();
        self.manager = None;
        Ok(())
    }
}

impl std::fmt::Debug for KiraSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KiraSystem")
            .field("buffer_frames", &self.buffer_frames)
            .field("software_rate", &self.software_rate)
            .field("initialized", &self.manager.is_some())
            .field("sounds", &self.sounds.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}
