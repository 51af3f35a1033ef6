use std::path::PathBuf;

use ambience_core::{
    AmbienceError, AppConfig, AudioContext, AudioRuntime, LoopDriver, PlayErrorPolicy,
    SimulatedRuntime, SoundSystem,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ambience_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            common,
            seed,
            interval_ms,
            skip_failed_plays,
        } => {
            let mut config = common.load_config()?;
            if seed.is_some() {
                config.playback.seed = seed;
            }
            if let Some(interval_ms) = interval_ms {
                config.playback.interval_ms = interval_ms;
            }
            if skip_failed_plays {
                config.playback.on_play_error = PlayErrorPolicy::Skip;
            }
            config.validate()?;

            match common.backend {
                Backend::Silent => run_play(SimulatedRuntime::new(), config).await,
                Backend::Kira => {
                    #[cfg(feature = "kira")]
                    return run_play(ambience_core::engine::kira::KiraRuntime::new(), config).await;
                    #[cfg(not(feature = "kira"))]
                    Err(AmbienceError::BackendUnavailable("kira".to_string()))
                }
            }
        }
        Commands::Check { common } => {
            let config = common.load_config()?;
            match common.backend {
                Backend::Silent => run_check(SimulatedRuntime::new(), &config),
                Backend::Kira => {
                    #[cfg(feature = "kira")]
                    return run_check(ambience_core::engine::kira::KiraRuntime::new(), &config);
                    #[cfg(not(feature = "kira"))]
                    Err(AmbienceError::BackendUnavailable("kira".to_string()))
                }
            }
        }
    }
}

async fn run_play<R: AudioRuntime>(mut runtime: R, config: AppConfig) -> ambience_core::Result<()> {
    tracing::info!(assets = %config.assets.base_path.display(), "starting playback loop");

    let mut context = AudioContext::start(&mut runtime, &config)?;
    let mut driver = LoopDriver::new(context.sound_count(), &config.playback)?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let outcome = driver.run(&mut context, &cancel).await;
    context.shutdown()?;

    let report = outcome?;
    tracing::info!(plays = report.plays, failed = report.failed_plays, "stopped");
    Ok(())
}

fn run_check<R: AudioRuntime>(mut runtime: R, config: &AppConfig) -> ambience_core::Result<()> {
    let mut context = AudioContext::start(&mut runtime, config)?;
    let driver = ambience_core::error::check(
        "System::getDriverInfo",
        context.system().driver_info(config.engine.driver),
    )?;

    tracing::info!(
        driver = %driver.name,
        sample_rate = driver.sample_rate,
        sounds = context.sound_count(),
        "engine ready"
    );
    context.shutdown()
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received terminate signal, shutting down"),
    }
    cancel.cancel();
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Plays random ambient sounds at a fixed cadence", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a random sound every interval until interrupted.
    Play {
        #[command(flatten)]
        common: CommonArgs,
        /// Seed for the random sound selection.
        #[arg(long)]
        seed: Option<u64>,
        /// Milliseconds between plays.
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Log failed plays and keep going instead of stopping.
        #[arg(long)]
        skip_failed_plays: bool,
    },
    /// Bring the engine up, load every sound, report, and exit.
    Check {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Directory holding the sound files.
    #[arg(short, long)]
    assets: Option<PathBuf>,
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Audio engine backend.
    #[arg(short, long, value_enum, default_value_t = Backend::default())]
    backend: Backend,
}

impl CommonArgs {
    fn load_config(&self) -> ambience_core::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        if let Some(assets) = &self.assets {
            config.assets.base_path = assets.clone();
        }
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Audible output through kira and cpal.
    Kira,
    /// Headless engine that tracks playback without producing sound.
    Silent,
}

impl Default for Backend {
    fn default() -> Self {
        if cfg!(feature = "kira") {
            Self::Kira
        } else {
            Self::Silent
        }
    }
}
