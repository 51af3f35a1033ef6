use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{PlayErrorPolicy, PlaybackConfig},
    context::AudioContext,
    engine::SoundSystem,
    AmbienceError, Result,
};

/// Uniform random choice of a sound index in `[0, len)`.
#[derive(Debug)]
pub struct IndexPicker {
    rng: StdRng,
    len: usize,
}

impl IndexPicker {
    pub fn new(len: usize, seed: Option<u64>) -> Result<Self> {
        if len == 0 {
            return Err(AmbienceError::Config(
                "cannot pick from an empty sound registry".to_string(),
            ));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { rng, len })
    }

    pub fn pick(&mut self) -> usize {
        self.rng.gen_range(0..self.len)
    }
}

/// Outcome of a loop run that ended through cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    pub plays: usize,
    pub failed_plays: usize,
}

/// Plays a random sound, waits a fixed interval, and repeats until cancelled.
///
/// The interval does not depend on how long a sound lasts, so sounds overlap
/// freely. While waiting, the engine is pumped so end-of-playback callbacks
/// keep arriving.
#[derive(Debug)]
pub struct LoopDriver {
    picker: IndexPicker,
    interval: Duration,
    update_interval: Duration,
    on_play_error: PlayErrorPolicy,
}

impl LoopDriver {
    /// Fails on a zero interval or update interval: waiting must always
    /// suspend so cancellation can be observed.
    pub fn new(sound_count: usize, config: &PlaybackConfig) -> Result<Self> {
        if config.interval_ms == 0 || config.update_interval_ms == 0 {
            return Err(AmbienceError::Config(
                "playback and update intervals must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            picker: IndexPicker::new(sound_count, config.seed)?,
            interval: config.interval(),
            update_interval: config.update_interval(),
            on_play_error: config.on_play_error,
        })
    }

    /// Runs the loop. Returns `Ok` once `cancel` fires, or the first error
    /// when the play error policy is [`PlayErrorPolicy::Halt`].
    pub async fn run<S: SoundSystem>(
        &mut self,
        context: &mut AudioContext<S>,
        cancel: &CancellationToken,
    ) -> Result<DriverReport> {
        let mut report = DriverReport::default();
        if cancel.is_cancelled() {
            return Ok(report);
        }

        self.play_next(context, &mut report)?;
        tracing::info!("sound started");

        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.play_next(context, &mut report)?;

            if cancel.is_cancelled() || !self.wait(context, cancel).await? {
                break;
            }
        }

        tracing::info!(
            plays = report.plays,
            failed = report.failed_plays,
            "playback loop cancelled"
        );
        Ok(report)
    }

    fn play_next<S: SoundSystem>(
        &mut self,
        context: &mut AudioContext<S>,
        report: &mut DriverReport,
    ) -> Result<()> {
        let index = self.picker.pick();
        match context.play(index) {
            Ok(channel) => {
                report.plays += 1;
                tracing::info!(
                    index,
                    sound = context.sound_name(index).unwrap_or_default(),
                    %channel,
                    "playing"
                );
                Ok(())
            }
            Err(err) => match self.on_play_error {
                PlayErrorPolicy::Halt => Err(err),
                PlayErrorPolicy::Skip => {
                    report.failed_plays += 1;
                    tracing::warn!(index, %err, "play failed, skipping");
                    Ok(())
                }
            },
        }
    }

    /// Sleeps for the interval while pumping the engine. Returns `false` when
    /// cancelled before the interval elapsed.
    async fn wait<S: SoundSystem>(
        &self,
        context: &mut AudioContext<S>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let deadline = Instant::now() + self.interval;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(true);
            }

            let tick = self.update_interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                _ = sleep(tick) => {}
            }
            context.update()?;
        }
    }
}
