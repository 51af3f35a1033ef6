use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    engine::{
        CallbackType, ChannelCallback, ChannelEvent, ChannelHandle, EngineResult, SoundSystem,
    },
    error::check,
    registry::SoundRegistry,
    AmbienceError, Result,
};

type CurrentChannel = Arc<Mutex<Option<ChannelHandle>>>;

/// Starts sounds and tracks the most recently started channel.
///
/// Only one channel is tracked at a time. The engine may still be mixing
/// earlier channels; they are simply no longer referenced here.
#[derive(Debug, Clone, Default)]
pub struct PlaybackController {
    current: CurrentChannel,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plays the sound at `index` on a fresh channel and makes it current.
    ///
    /// The channel is created paused, gets the end-of-playback callback, and is
    /// then unpaused. Returns once playback has been started. If the channel
    /// cannot be started it is stopped again and the current channel is kept.
    pub fn play<S: SoundSystem>(
        &self,
        system: &mut S,
        sounds: &SoundRegistry,
        index: usize,
    ) -> Result<ChannelHandle> {
        let sound = sounds.require(index)?;

        let channel = check("System::playSound", system.play_sound(sound, None, true))?;
        if let Err(err) = self.start(system, channel) {
            if let Err(code) = system.stop_channel(channel) {
                tracing::warn!(%channel, %code, "cannot stop channel after failed start");
            }
            return Err(err);
        }
        *self.lock()? = Some(channel);

        tracing::debug!(index, %channel, "playing sound");
        Ok(channel)
    }

    fn start<S: SoundSystem>(&self, system: &mut S, channel: ChannelHandle) -> Result<()> {
        check(
            "Channel::setCallback",
            system.set_channel_callback(channel, self.channel_callback()),
        )?;
        check("Channel::setPaused", system.set_channel_paused(channel, false))
    }

    /// The channel started by the last `play`, unless it has ended since.
    pub fn current_channel(&self) -> Result<Option<ChannelHandle>> {
        Ok(*self.lock()?)
    }

    /// Callback handed to the engine for every channel this controller starts.
    pub fn channel_callback(&self) -> ChannelCallback {
        let current = self.current.clone();
        Arc::new(move |event: &ChannelEvent| on_channel_event(&current, event))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<ChannelHandle>>> {
        self.current
            .lock()
            .map_err(|_| AmbienceError::LockPoisoned("current channel"))
    }
}

/// Clears the current channel when a channel ends. Other notifications are
/// acknowledged and ignored.
fn on_channel_event(
    current: &Mutex<Option<ChannelHandle>>,
    event: &ChannelEvent,
) -> EngineResult<()> {
    if event.kind == CallbackType::End {
        tracing::info!(channel = %event.channel, "channel ended");
        match current.lock() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    Ok(())
}
