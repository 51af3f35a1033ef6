//! Headless engine that keeps channel bookkeeping without producing sound.
//!
//! Sounds are decoded far enough to know their length, channels advance on
//! tokio's clock while unpaused, and `End` callbacks fire from
//! [`SoundSystem::update`] once a non-looping sound runs out. Every call is
//! recorded and any operation can be scripted to fail, so the same engine backs
//! the `silent` command line backend and the test suite.

use std::{
    collections::{BTreeMap, HashMap},
    io::Cursor,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::time::Instant;

use super::{
    deliver, sandbox_path, AudioRuntime, CallbackType, ChannelCallback, ChannelEvent,
    ChannelGroupHandle, ChannelHandle, CreateSoundInfo, DriverInfo, EngineCode, EngineResult,
    InitFlags, SoundHandle, SoundMode, SoundSystem, SpeakerMode,
};

const DEFAULT_OUTPUT_RATE: u32 = 48_000;

/// Engine operation, used to script failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PreloadFile,
    CreateSystem,
    SetDspBufferSize,
    DriverInfo,
    SetSoftwareFormat,
    Init,
    CreateSound,
    PlaySound,
    SetChannelCallback,
    SetChannelPaused,
    StopChannel,
    Update,
    Release,
}

/// One recorded engine call. `update` is not recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    PreloadFile { path: String, can_read: bool, can_write: bool },
    CreateSystem,
    SetDspBufferSize { length: u32, count: u32 },
    DriverInfo { driver: usize },
    SetSoftwareFormat { sample_rate: u32 },
    Init { max_channels: u32 },
    CreateSound { path: String, user_data: u64 },
    PlaySound { sound: SoundHandle, paused: bool },
    SetChannelCallback { channel: ChannelHandle },
    SetChannelPaused { channel: ChannelHandle, paused: bool },
    StopChannel { channel: ChannelHandle },
    Release,
}

impl EngineCall {
    pub fn operation(&self) -> Operation {
        match self {
            Self::PreloadFile { .. } => Operation::PreloadFile,
            Self::CreateSystem => Operation::CreateSystem,
            Self::SetDspBufferSize { .. } => Operation::SetDspBufferSize,
            Self::DriverInfo { .. } => Operation::DriverInfo,
            Self::SetSoftwareFormat { .. } => Operation::SetSoftwareFormat,
            Self::Init { .. } => Operation::Init,
            Self::CreateSound { .. } => Operation::CreateSound,
            Self::PlaySound { .. } => Operation::PlaySound,
            Self::SetChannelCallback { .. } => Operation::SetChannelCallback,
            Self::SetChannelPaused { .. } => Operation::SetChannelPaused,
            Self::StopChannel { .. } => Operation::StopChannel,
            Self::Release => Operation::Release,
        }
    }
}

#[derive(Default)]
struct Shared {
    calls: Vec<EngineCall>,
    failures: HashMap<Operation, EngineCode>,
    sandbox: HashMap<String, Arc<[u8]>>,
    live_channels: usize,
}

impl Shared {
    /// Records the call and returns the scripted failure for it, if any.
    fn attempt(&mut self, call: EngineCall) -> EngineResult<()> {
        let operation = call.operation();
        self.calls.push(call);
        match self.failures.get(&operation) {
            Some(code) => Err(*code),
            None => Ok(()),
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> EngineResult<MutexGuard<'_, Shared>> {
    shared.lock().map_err(|_| EngineCode::Internal)
}

/// Read-only view on a simulated engine used to inspect and script it.
#[derive(Clone, Default)]
pub struct SimulatedProbe {
    shared: Arc<Mutex<Shared>>,
}

impl SimulatedProbe {
    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.shared
            .lock()
            .map(|shared| shared.calls.clone())
            .unwrap_or_default()
    }

    /// Number of recorded calls of the given operation.
    pub fn count(&self, operation: Operation) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Makes every later call of `operation` fail with `code`.
    pub fn fail_on(&self, operation: Operation, code: EngineCode) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.failures.insert(operation, code);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.failures.clear();
        }
    }

    /// Channels that are currently playing or paused.
    pub fn live_channels(&self) -> usize {
        self.shared
            .lock()
            .map(|shared| shared.live_channels)
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for SimulatedProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedProbe").finish()
    }
}

/// Runtime half of the simulated engine: owns the sandbox.
#[derive(Debug)]
pub struct SimulatedRuntime {
    probe: SimulatedProbe,
    output_rate: u32,
    system_created: bool,
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRuntime {
    pub fn new() -> Self {
        Self::with_output_rate(DEFAULT_OUTPUT_RATE)
    }

    /// Creates a runtime whose only output driver reports `output_rate`.
    pub fn with_output_rate(output_rate: u32) -> Self {
        Self {
            probe: SimulatedProbe::default(),
            output_rate,
            system_created: false,
        }
    }

    pub fn probe(&self) -> SimulatedProbe {
        self.probe.clone()
    }
}

impl AudioRuntime for SimulatedRuntime {
    type System = SimulatedSystem;

    fn preload_file(
        &mut self,
        folder: &str,
        name: &str,
        source: &Path,
        can_read: bool,
        can_write: bool,
    ) -> EngineResult<()> {
        let path = sandbox_path(folder, name);
        let mut shared = lock(&self.probe.shared)?;
        shared.attempt(EngineCall::PreloadFile {
            path: path.clone(),
            can_read,
            can_write,
        })?;

        if !can_read {
            return Err(EngineCode::InvalidParam);
        }

        let bytes = std::fs::read(source).map_err(|error| {
            tracing::debug!(source = %source.display(), %error, "preload source unreadable");
            EngineCode::FileNotFound
        })?;
        shared.sandbox.insert(path, Arc::from(bytes));
        Ok(())
    }

    fn create_system(&mut self) -> EngineResult<SimulatedSystem> {
        lock(&self.probe.shared)?.attempt(EngineCall::CreateSystem)?;
        if self.system_created {
            return Err(EngineCode::Initialized);
        }

        self.system_created = true;
        Ok(SimulatedSystem::new(self.probe.clone(), self.output_rate))
    }
}

struct LoadedSound {
    length: Duration,
    mode: SoundMode,
}

struct Channel {
    sound: SoundHandle,
    paused: bool,
    position: Duration,
    last_tick: Instant,
    callback: Option<ChannelCallback>,
}

impl Channel {
    fn settle(&mut self, now: Instant) {
        if !self.paused {
            self.position += now.saturating_duration_since(self.last_tick);
        }
        self.last_tick = now;
    }
}

/// Engine instance of the simulated backend.
pub struct SimulatedSystem {
    probe: SimulatedProbe,
    output_rate: u32,
    dsp_buffer: (u32, u32),
    software_rate: Option<u32>,
    max_channels: Option<u32>,
    released: bool,
    sounds: Vec<LoadedSound>,
    channels: BTreeMap<ChannelHandle, Channel>,
    next_channel: u32,
}

impl SimulatedSystem {
    fn new(probe: SimulatedProbe, output_rate: u32) -> Self {
        Self {
            probe,
            output_rate,
            dsp_buffer: (1024, 4),
            software_rate: None,
            max_channels: None,
            released: false,
            sounds: Vec::new(),
            channels: BTreeMap::new(),
            next_channel: 0,
        }
    }

    pub fn probe(&self) -> SimulatedProbe {
        self.probe.clone()
    }

    /// Mixer sample rate, set by `set_software_format` or the output default.
    pub fn software_rate(&self) -> u32 {
        self.software_rate.unwrap_or(self.output_rate)
    }

    pub fn dsp_buffer(&self) -> (u32, u32) {
        self.dsp_buffer
    }

    pub fn is_initialized(&self) -> bool {
        self.max_channels.is_some()
    }

    fn attempt(&self, call: EngineCall) -> EngineResult<()> {
        if self.released {
            return Err(EngineCode::InvalidHandle);
        }
        lock(&self.probe.shared)?.attempt(call)
    }

    fn before_init(&self) -> EngineResult<()> {
        match self.max_channels {
            Some(_) => Err(EngineCode::Initialized),
            None => Ok(()),
        }
    }

    fn after_init(&self) -> EngineResult<u32> {
        self.max_channels.ok_or(EngineCode::Uninitialized)
    }

    fn sync_live_channels(&self) {
        if let Ok(mut shared) = self.probe.shared.lock() {
            shared.live_channels = self.channels.len();
        }
    }
}

impl SoundSystem for SimulatedSystem {
    fn set_dsp_buffer_size(&mut self, length: u32, count: u32) -> EngineResult<()> {
        self.attempt(EngineCall::SetDspBufferSize { length, count })?;
        self.before_init()?;
        if length == 0 || count == 0 {
            return Err(EngineCode::InvalidParam);
        }

        self.dsp_buffer = (length, count);
        Ok(())
    }

    fn driver_info(&self, driver: usize) -> EngineResult<DriverInfo> {
        self.attempt(EngineCall::DriverInfo { driver })?;
        if driver != 0 {
            return Err(EngineCode::InvalidParam);
        }

        Ok(DriverInfo {
            name: "Simulated output".to_string(),
            sample_rate: self.output_rate,
            speaker_mode: SpeakerMode::Stereo,
            speaker_channels: 2,
        })
    }

    fn set_software_format(
        &mut self,
        sample_rate: u32,
        _speaker_mode: SpeakerMode,
        _raw_speakers: u32,
    ) -> EngineResult<()> {
        self.attempt(EngineCall::SetSoftwareFormat { sample_rate })?;
        self.before_init()?;
        if sample_rate == 0 {
            return Err(EngineCode::InvalidParam);
        }

        self.software_rate = Some(sample_rate);
        Ok(())
    }

    fn init(&mut self, max_channels: u32, _flags: InitFlags) -> EngineResult<()> {
        self.attempt(EngineCall::Init { max_channels })?;
        self.before_init()?;
        if max_channels == 0 {
            return Err(EngineCode::InvalidParam);
        }

        self.max_channels = Some(max_channels);
        Ok(())
    }

    fn create_sound(
        &mut self,
        path: &str,
        mode: SoundMode,
        info: &CreateSoundInfo,
    ) -> EngineResult<SoundHandle> {
        self.attempt(EngineCall::CreateSound {
            path: path.to_string(),
            user_data: info.user_data,
        })?;
        self.after_init()?;

        let bytes = lock(&self.probe.shared)?
            .sandbox
            .get(path)
            .cloned()
            .ok_or(EngineCode::FileNotFound)?;
        let length = wav_length(&bytes)?;

        let handle = SoundHandle(self.sounds.len() as u32);
        self.sounds.push(LoadedSound { length, mode });
        Ok(handle)
    }

    fn play_sound(
        &mut self,
        sound: SoundHandle,
        group: Option<ChannelGroupHandle>,
        paused: bool,
    ) -> EngineResult<ChannelHandle> {
        self.attempt(EngineCall::PlaySound { sound, paused })?;
        let max_channels = self.after_init()?;
        if group.is_some() || self.sounds.get(sound.0 as usize).is_none() {
            return Err(EngineCode::InvalidHandle);
        }
        if self.channels.len() >= max_channels as usize {
            return Err(EngineCode::ChannelAlloc);
        }

        let handle = ChannelHandle(self.next_channel);
        self.next_channel += 1;
        self.channels.insert(
            handle,
            Channel {
                sound,
                paused,
                position: Duration::ZERO,
                last_tick: Instant::now(),
                callback: None,
            },
        );
        self.sync_live_channels();
        Ok(handle)
    }

    fn set_channel_callback(
        &mut self,
        channel: ChannelHandle,
        callback: ChannelCallback,
    ) -> EngineResult<()> {
        self.attempt(EngineCall::SetChannelCallback { channel })?;
        let entry = self
            .channels
            .get_mut(&channel)
            .ok_or(EngineCode::InvalidHandle)?;
        entry.callback = Some(callback);
        Ok(())
    }

    fn set_channel_paused(&mut self, channel: ChannelHandle, paused: bool) -> EngineResult<()> {
        self.attempt(EngineCall::SetChannelPaused { channel, paused })?;
        let entry = self
            .channels
            .get_mut(&channel)
            .ok_or(EngineCode::InvalidHandle)?;
        entry.settle(Instant::now());
        entry.paused = paused;
        Ok(())
    }

    fn stop_channel(&mut self, channel: ChannelHandle) -> EngineResult<()> {
        self.attempt(EngineCall::StopChannel { channel })?;
        self.channels
            .remove(&channel)
            .ok_or(EngineCode::InvalidHandle)?;
        self.sync_live_channels();
        Ok(())
    }

    fn update(&mut self) -> EngineResult<()> {
        if self.released {
            return Err(EngineCode::InvalidHandle);
        }
        if let Some(code) = lock(&self.probe.shared)?.failures.get(&Operation::Update) {
            return Err(*code);
        }

        let now = Instant::now();
        let mut ended = Vec::new();
        for (handle, channel) in &mut self.channels {
            channel.settle(now);
            let sound = &self.sounds[channel.sound.0 as usize];
            if sound.mode == SoundMode::LoopOff && channel.position >= sound.length {
                ended.push(*handle);
            }
        }

        for handle in ended {
            if let Some(channel) = self.channels.remove(&handle) {
                self.sync_live_channels();
                if let Some(callback) = channel.callback {
                    deliver(&callback, ChannelEvent::new(handle, CallbackType::End));
                }
            }
        }

        Ok(())
    }

    fn release(&mut self) -> EngineResult<()> {
        self.attempt(EngineCall::Release)?;
        self.released = true;
        self.channels.clear();
        self.sounds.clear();
        self.sync_live_channels();
        Ok(())
    }
}

impl std::fmt::Debug for SimulatedSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSystem")
            .field("output_rate", &self.output_rate)
            .field("software_rate", &self.software_rate)
            .field("max_channels", &self.max_channels)
            .field("sounds", &self.sounds.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}

fn wav_length(bytes: &[u8]) -> EngineResult<Duration> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|_| EngineCode::Format)?;
    let sample_rate = reader.spec().sample_rate;
    if sample_rate == 0 {
        return Err(EngineCode::Format);
    }

    Ok(Duration::from_secs_f64(
        f64::from(reader.duration()) / f64::from(sample_rate),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Encodes a mono 16-bit WAV file of the given length.
    pub(crate) fn wav_bytes(sample_rate: u32, millis: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..(sample_rate as u64 * millis as u64 / 1000) {
                writer.write_sample(0_i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn initialized_with_sound(millis: u32) -> (SimulatedSystem, SoundHandle, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tone.wav");
        std::fs::write(&source, wav_bytes(8_000, millis)).unwrap();

        let mut runtime = SimulatedRuntime::new();
        runtime
            .preload_file("/", "tone.wav", &source, true, false)
            .unwrap();
        let mut system = runtime.create_system().unwrap();
        system.init(4, InitFlags::NORMAL).unwrap();
        let sound = system
            .create_sound("/tone.wav", SoundMode::LoopOff, &CreateSoundInfo::default())
            .unwrap();
        (system, sound, dir)
    }

    #[test]
    fn hands_out_a_single_system() {
        let mut runtime = SimulatedRuntime::new();
        assert!(runtime.create_system().is_ok());
        assert_eq!(runtime.create_system().unwrap_err(), EngineCode::Initialized);
    }

    #[test]
    fn configuration_is_rejected_after_init() {
        let mut system = SimulatedRuntime::new().create_system().unwrap();
        system.init(8, InitFlags::NORMAL).unwrap();

        assert_eq!(
            system.set_dsp_buffer_size(2048, 2).unwrap_err(),
            EngineCode::Initialized
        );
        assert_eq!(
            system
                .set_software_format(44_100, SpeakerMode::Default, 0)
                .unwrap_err(),
            EngineCode::Initialized
        );
        assert_eq!(
            system.init(8, InitFlags::NORMAL).unwrap_err(),
            EngineCode::Initialized
        );
    }

    #[test]
    fn sounds_require_preloaded_files() {
        let mut system = SimulatedRuntime::new().create_system().unwrap();
        let info = CreateSoundInfo::default();
        assert_eq!(
            system
                .create_sound("/missing.wav", SoundMode::LoopOff, &info)
                .unwrap_err(),
            EngineCode::Uninitialized
        );

        system.init(8, InitFlags::NORMAL).unwrap();
        assert_eq!(
            system
                .create_sound("/missing.wav", SoundMode::LoopOff, &info)
                .unwrap_err(),
            EngineCode::FileNotFound
        );
    }

    #[test]
    fn rejects_data_that_is_not_wav() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("noise.wav");
        std::fs::write(&source, b"not a wav file").unwrap();

        let mut runtime = SimulatedRuntime::new();
        runtime
            .preload_file("/", "noise.wav", &source, true, false)
            .unwrap();
        let mut system = runtime.create_system().unwrap();
        system.init(8, InitFlags::NORMAL).unwrap();

        assert_eq!(
            system
                .create_sound("/noise.wav", SoundMode::LoopOff, &CreateSoundInfo::default())
                .unwrap_err(),
            EngineCode::Format
        );
    }

    #[test]
    fn scripted_failures_are_recorded() {
        let mut runtime = SimulatedRuntime::new();
        let probe = runtime.probe();
        probe.fail_on(Operation::CreateSystem, EngineCode::Memory);

        assert_eq!(runtime.create_system().unwrap_err(), EngineCode::Memory);
        assert_eq!(probe.calls(), vec![EngineCall::CreateSystem]);

        probe.clear_failures();
        assert!(runtime.create_system().is_ok());
    }

    #[test]
    fn channel_handles_are_never_reused() {
        let (mut system, sound, _dir) = initialized_with_sound(100);
        let first = system.play_sound(sound, None, true).unwrap();
        let second = system.play_sound(sound, None, true).unwrap();

        assert_ne!(first, second);
        assert_eq!(system.probe().live_channels(), 2);
    }

    #[test]
    fn channel_allocation_is_bounded_by_max_channels() {
        let (mut system, sound, _dir) = initialized_with_sound(100);
        for _ in 0..4 {
            system.play_sound(sound, None, true).unwrap();
        }

        assert_eq!(
            system.play_sound(sound, None, true).unwrap_err(),
            EngineCode::ChannelAlloc
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fires_end_once_when_a_sound_runs_out() {
        let (mut system, sound, _dir) = initialized_with_sound(100);
        let ended = Arc::new(AtomicUsize::new(0));
        let counter = ended.clone();
        let callback: ChannelCallback = Arc::new(move |event: &ChannelEvent| {
            if event.kind == CallbackType::End {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });

        let channel = system.play_sound(sound, None, true).unwrap();
        system.set_channel_callback(channel, callback).unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        system.update().unwrap();
        assert_eq!(ended.load(Ordering::SeqCst), 0, "paused channels do not advance");

        system.set_channel_paused(channel, false).unwrap();
        tokio::time::advance(Duration::from_millis(50)).await;
        system.update().unwrap();
        assert_eq!(ended.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(60)).await;
        system.update().unwrap();
        system.update().unwrap();
        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert_eq!(
            system.set_channel_paused(channel, true).unwrap_err(),
            EngineCode::InvalidHandle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_channels_never_report_an_end() {
        let (mut system, sound, _dir) = initialized_with_sound(100);
        let ended = Arc::new(AtomicUsize::new(0));
        let counter = ended.clone();
        let callback: ChannelCallback = Arc::new(move |_: &ChannelEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let channel = system.play_sound(sound, None, false).unwrap();
        system.set_channel_callback(channel, callback).unwrap();
        system.stop_channel(channel).unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        system.update().unwrap();

        assert_eq!(ended.load(Ordering::SeqCst), 0);
        assert_eq!(system.probe().live_channels(), 0);
        assert_eq!(
            system.stop_channel(channel).unwrap_err(),
            EngineCode::InvalidHandle
        );
    }

    #[test]
    fn released_systems_reject_calls() {
        let (mut system, sound, _dir) = initialized_with_sound(100);
        system.release().unwrap();

        assert_eq!(
            system.play_sound(sound, None, false).unwrap_err(),
            EngineCode::InvalidHandle
        );
        assert_eq!(system.update().unwrap_err(), EngineCode::InvalidHandle);
    }
}
