//! mxp-preview - command-line front end for the preview orchestrator
//!
//! Subcommands:
//! - `play`: render a session preview on the backend and play it on the output device
//! - `fetch`: save the rendered preview bytes unmodified
//! - `render`: play a preview through its effect chain offline into a WAV file
//! - `devices`: list output devices

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mxp_common::events::{EventBus, PreviewEvent, StopReason};
use mxp_preview::audio::output::list_devices;
use mxp_preview::audio::{write_wav, OfflineOutput};
use mxp_preview::client::RenderClient;
use mxp_preview::config::{Config, ConfigOverrides, LoggingConfig, TomlConfig};
use mxp_preview::options::{DelayConfig, FilterConfig, ReverbConfig};
use mxp_preview::{
    AudioPreviewOptions, EffectChainConfig, Format, OrchestratorSettings, PreviewOrchestrator,
    Quality,
};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for mxp-preview
#[derive(Parser, Debug)]
#[command(name = "mxp-preview")]
#[command(about = "Preview backend-rendered mixes with live effects and analysis")]
#[command(version)]
struct Cli {
    /// Config file (defaults to MXP_CONFIG, then the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render backend base URL
    #[arg(long, env = "MXP_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Output device name
    #[arg(long, env = "MXP_AUDIO_DEVICE")]
    device: Option<String>,

    /// HTTP request timeout in seconds (0 disables)
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render and play a session preview until it ends or Ctrl+C
    Play {
        session_id: String,

        #[command(flatten)]
        preview: PreviewArgs,

        /// Start position in seconds (restarts playback at the offset)
        #[arg(long)]
        seek: Option<f64>,

        /// Playback volume, 0.0-1.0
        #[arg(long)]
        volume: Option<f32>,

        /// Print analysis updates as JSON lines
        #[arg(long)]
        print_analysis: bool,
    },

    /// Save the rendered preview bytes to a file
    Fetch {
        session_id: String,

        #[command(flatten)]
        preview: PreviewArgs,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Render a preview through its effect chain into a WAV file
    Render {
        session_id: String,

        #[command(flatten)]
        preview: PreviewArgs,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,
    },

    /// List audio output devices
    Devices,
}

/// Preview request and effect options
#[derive(Args, Debug, Clone)]
struct PreviewArgs {
    /// Preview length in seconds
    #[arg(long)]
    duration: Option<f64>,

    #[arg(long, value_enum)]
    quality: Option<Quality>,

    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Reverb wet level 0-100 (enables reverb)
    #[arg(long)]
    reverb_amount: Option<f32>,

    /// Reverb decay in seconds
    #[arg(long, default_value_t = 2.0)]
    reverb_decay: f32,

    /// Delay time in milliseconds (enables delay)
    #[arg(long)]
    delay_time: Option<f32>,

    /// Delay feedback 0-100
    #[arg(long, default_value_t = 30.0)]
    delay_feedback: f32,

    /// Low-pass cutoff in Hz (enables filter)
    #[arg(long)]
    filter_frequency: Option<f32>,

    /// Filter resonance (Q)
    #[arg(long, default_value_t = 1.0)]
    filter_resonance: f32,
}

impl PreviewArgs {
    fn to_options(&self, config: &Config) -> AudioPreviewOptions {
        AudioPreviewOptions {
            duration: self.duration,
            quality: self.quality.unwrap_or(config.quality),
            format: self.format.unwrap_or(config.format),
            effects: EffectChainConfig {
                reverb: self.reverb_amount.map(|amount| ReverbConfig {
                    enabled: true,
                    amount,
                    decay: self.reverb_decay,
                }),
                delay: self.delay_time.map(|time| DelayConfig {
                    enabled: true,
                    time,
                    feedback: self.delay_feedback,
                }),
                filter: self.filter_frequency.map(|frequency| FilterConfig {
                    enabled: true,
                    frequency,
                    resonance: self.filter_resonance,
                }),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = mxp_common::config::resolve_config_file(
        cli.config.as_deref(),
        mxp_common::config::CONFIG_ENV_VAR,
    );
    let (toml_config, config_warning) = TomlConfig::load(config_path.as_deref());

    init_logging(&toml_config.logging)?;

    if let Some(warning) = config_warning {
        warn!("{}", warning);
    }
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let config = Config::resolve(
        toml_config,
        ConfigOverrides {
            api_base_url: cli.api_base_url.clone(),
            device: cli.device.clone(),
            request_timeout_secs: cli.timeout_secs,
        },
    );
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Command::Play {
            session_id,
            preview,
            seek,
            volume,
            print_analysis,
        } => {
            let options = preview.to_options(&config);
            run_play(&config, &session_id, &options, seek, volume, print_analysis).await
        }
        Command::Fetch {
            session_id,
            preview,
            output,
        } => {
            let options = preview.to_options(&config);
            run_fetch(&config, &session_id, &options, &output).await
        }
        Command::Render {
            session_id,
            preview,
            output,
            sample_rate,
        } => {
            let options = preview.to_options(&config);
            run_render(&config, &session_id, &options, &output, sample_rate).await
        }
        Command::Devices => {
            let devices = list_devices().context("Failed to enumerate output devices")?;
            if devices.is_empty() {
                println!("No output devices found");
            }
            for device in devices {
                println!("{}", device);
            }
            Ok(())
        }
    }
}

/// Initialize tracing; RUST_LOG overrides the configured level
fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "mxp_preview={level},mxp_common={level}",
            level = logging.level
        ))
    });

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

async fn run_play(
    config: &Config,
    session_id: &str,
    options: &AudioPreviewOptions,
    seek: Option<f64>,
    volume: Option<f32>,
    print_analysis: bool,
) -> Result<()> {
    let orchestrator =
        PreviewOrchestrator::from_config(config).context("Failed to create orchestrator")?;
    let mut events = orchestrator.subscribe();

    let info = orchestrator
        .play_preview(session_id, options)
        .await
        .with_context(|| format!("Failed to play preview for session '{}'", session_id))?;
    info!(
        "Playing {:.2}s preview ({}Hz, {} channels)",
        info.duration_secs, info.sample_rate, info.channels
    );

    if let Some(level) = volume {
        orchestrator.set_volume(level);
    }
    if let Some(offset) = seek {
        orchestrator.seek_to(offset).await.context("Seek failed")?;
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(PreviewEvent::PlaybackStopped { reason: StopReason::Ended, .. }) => {
                    info!("Preview finished");
                    break;
                }
                Ok(PreviewEvent::AnalysisUpdate { update, .. }) if print_analysis => {
                    match serde_json::to_string(&update) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Failed to serialize analysis: {}", e),
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event consumer lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    orchestrator.stop_preview();
    Ok(())
}

async fn run_fetch(
    config: &Config,
    session_id: &str,
    options: &AudioPreviewOptions,
    output: &std::path::Path,
) -> Result<()> {
    let orchestrator =
        PreviewOrchestrator::from_config(config).context("Failed to create orchestrator")?;
    let bytes = orchestrator
        .generate_preview(session_id, options)
        .await
        .with_context(|| format!("Failed to render preview for session '{}'", session_id))?;

    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

async fn run_render(
    config: &Config,
    session_id: &str,
    options: &AudioPreviewOptions,
    output: &std::path::Path,
    sample_rate: u32,
) -> Result<()> {
    let offline = OfflineOutput::new(sample_rate);
    let handle = offline.handle();

    let client = RenderClient::new(&config.api_base_url, config.request_timeout)
        .context("Failed to create render client")?;
    let mut settings = OrchestratorSettings {
        default_duration_secs: config.default_duration_secs,
        ..Default::default()
    };
    settings.analysis.enabled = false;

    let orchestrator = PreviewOrchestrator::new(
        client,
        Arc::new(offline.factory()),
        Arc::new(EventBus::new(config.event_capacity)),
        settings,
    );

    let info = orchestrator
        .play_preview(session_id, options)
        .await
        .with_context(|| format!("Failed to play preview for session '{}'", session_id))?;

    let frame_count = (info.duration_secs * info.sample_rate as f64).round() as usize;
    let frames = handle.render(frame_count);
    orchestrator.stop_preview();

    write_wav(output, &frames, sample_rate)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        "Rendered {:.2}s of session '{}' to {}",
        info.duration_secs,
        session_id,
        output.display()
    );
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
