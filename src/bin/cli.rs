//! CLI binary for voice2music.

use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use voice2music::credentials::{SecretRef, mask};
use voice2music::error::exit_codes;
use voice2music::playback::{ConsoleSelector, FixedSelector, TrackSelection, TrackSelector};
use voice2music::{
    GenerationMode, GenerationRequest, MusicApiClient, MusicConfig, MusicError, MusicModel,
    Pipeline, PipelineMode, PipelineReport, ProgressCallback, ProgressEvent, RunOptions,
    TaskHandle,
};

/// voice2music: turn a text prompt into music and play it.
#[derive(Parser)]
#[command(name = "v2m", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging, including raw API payloads.
    #[arg(long, global = true)]
    debug: bool,

    /// Also write a daily log file to the logs directory.
    #[arg(long, global = true)]
    log_file: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Generate music from a prompt, download it and play it.
    Generate(GenerateArgs),

    /// Continue waiting for a task submitted earlier.
    Resume {
        /// Task identifier printed by a previous run.
        task_id: String,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Show remaining API credits.
    Credits,

    /// Store the API key in the config file.
    Setup {
        /// API key; read from stdin when omitted.
        #[arg(long)]
        api_key: Option<String>,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Song description, or lyrics with --custom. Asked for when omitted.
    prompt: Option<String>,

    /// Treat the prompt as lyrics (requires --style and --title).
    #[arg(long)]
    custom: bool,

    /// Generate an instrumental track.
    #[arg(long)]
    instrumental: bool,

    /// Style tags, e.g. "acoustic folk".
    #[arg(long)]
    style: Option<String>,

    /// Song title.
    #[arg(long)]
    title: Option<String>,

    /// Generation model (V3_5, V4, V4_5).
    #[arg(long)]
    model: Option<MusicModel>,

    #[command(flatten)]
    delivery: DeliveryArgs,
}

#[derive(Args)]
struct DeliveryArgs {
    /// Download the tracks without playing them.
    #[arg(long, conflicts_with = "stream")]
    download_only: bool,

    /// Play stream URLs as soon as they appear instead of downloading.
    #[arg(long)]
    stream: bool,

    /// Do not start a player; just report the results.
    #[arg(long)]
    no_play: bool,

    /// Play without a menu: a track number or "all".
    #[arg(long, value_name = "N|all", value_parser = parse_play)]
    play: Option<TrackSelection>,

    /// Give up waiting after this many seconds.
    #[arg(long, value_name = "SECS")]
    max_wait: Option<u64>,

    /// Seconds between status checks.
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,
}

impl DeliveryArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            mode: if self.stream {
                PipelineMode::Stream
            } else {
                PipelineMode::Download
            },
            play: !(self.no_play || self.download_only),
        }
    }

    fn apply(&self, config: &mut MusicConfig) {
        if let Some(secs) = self.max_wait {
            config.poll.max_wait_secs = secs;
        }
        if let Some(secs) = self.interval {
            config.poll.interval_secs = secs;
        }
    }

    fn selector(&self) -> Box<dyn TrackSelector> {
        match self.play {
            Some(choice) => Box::new(FixedSelector::new([choice])),
            None if std::io::stdin().is_terminal() => Box::new(ConsoleSelector::stdio()),
            None => Box::new(FixedSelector::new([TrackSelection::All])),
        }
    }
}

fn parse_play(value: &str) -> Result<TrackSelection, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "a" | "all" => Ok(TrackSelection::All),
        n => match n.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(TrackSelection::One(n - 1)),
            _ => Err(format!("expected a track number or 'all', got '{value}'")),
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            let code = match e.downcast_ref::<MusicError>() {
                Some(err) => {
                    if let Some(body) = err.raw_body() {
                        eprintln!("API response: {body}");
                    }
                    for path in err.saved() {
                        eprintln!("Saved: {}", path.display());
                    }
                    print_unplayed(err.unplayed());
                    if let MusicError::TimeoutExceeded { task_id, .. } = err {
                        eprintln!("Check again later with: v2m resume {task_id}");
                    }
                    err.exit_code()
                }
                None => exit_codes::CONFIG,
            };
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(MusicConfig::default_config_path);
    let mut config = MusicConfig::load_or_default(&config_path).map_err(MusicError::from)?;
    config.apply_env_overrides();

    let _log_guard = init_tracing(cli.debug || config.debug, cli.log_file);
    info!(config = %config_path.display(), "voice2music v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Generate(args) => run_generate(config, args).await,
        Command::Resume { task_id, delivery } => run_resume(config, &task_id, &delivery).await,
        Command::Credits => run_credits(&config).await,
        Command::Setup { api_key } => run_setup(config, &config_path, api_key),
    }
}

/// Install the stderr subscriber and, optionally, a daily log file.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(
    debug: bool,
    log_file: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_filter = if debug {
        "voice2music=debug,v2m=debug,reqwest=info"
    } else {
        "voice2music=info,v2m=info,reqwest=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = if log_file {
        let appender =
            tracing_appender::rolling::daily(voice2music::app_dirs::logs_dir(), "v2m.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    guard
}

async fn run_generate(mut config: MusicConfig, args: GenerateArgs) -> anyhow::Result<()> {
    args.delivery.apply(&mut config);
    config.validate().map_err(MusicError::from)?;

    let prompt = match args.prompt {
        Some(prompt) => prompt,
        None => read_line("Enter music prompt: ")?,
    };
    let mut request = GenerationRequest::new(prompt)
        .with_instrumental(args.instrumental || config.generation.instrumental)
        .with_model(args.model.unwrap_or(config.generation.model));
    if args.custom {
        request = request.with_mode(GenerationMode::CustomLyrics);
    }
    if let Some(style) = args.style {
        request = request.with_style(style);
    }
    if let Some(title) = args.title {
        request = request.with_title(title);
    }

    let pipeline = Pipeline::from_config(&config).map_err(MusicError::from)?;
    let options = args.delivery.options();
    let mut selector = args.delivery.selector();
    let cancel = cancel_on_ctrl_c();
    let progress = CliProgress::new();
    let callback = progress.callback();

    println!("Generating music for: {}", request.prompt());
    let report = pipeline
        .run(&request, options, selector.as_mut(), &cancel, Some(&callback))
        .await;
    progress.finish();
    print_report(&report?);
    Ok(())
}

async fn run_resume(
    mut config: MusicConfig,
    task_id: &str,
    delivery: &DeliveryArgs,
) -> anyhow::Result<()> {
    delivery.apply(&mut config);
    config.validate().map_err(MusicError::from)?;

    let pipeline = Pipeline::from_config(&config).map_err(MusicError::from)?;
    let mut selector = delivery.selector();
    let cancel = cancel_on_ctrl_c();
    let progress = CliProgress::new();
    let callback = progress.callback();

    let task = TaskHandle::new(task_id);
    println!("Checking task {task}");
    let report = pipeline
        .resume(
            &task,
            delivery.options(),
            selector.as_mut(),
            &cancel,
            Some(&callback),
        )
        .await;
    progress.finish();
    print_report(&report?);
    Ok(())
}

async fn run_credits(config: &MusicConfig) -> anyhow::Result<()> {
    let client = MusicApiClient::from_config(&config.api).map_err(MusicError::from)?;
    let credits = client.credits().await.map_err(MusicError::from)?;
    println!("Remaining credits: {credits}");
    Ok(())
}

fn run_setup(
    mut config: MusicConfig,
    config_path: &Path,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let key = match api_key {
        Some(key) => key,
        None => read_line("API key: ")?,
    };
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("no API key given");
    }

    config.api.api_key = SecretRef::Literal {
        value: key.to_owned(),
    };
    config.save_to_file(config_path).map_err(MusicError::from)?;
    println!(
        "Saved API key {} to {}",
        mask(key),
        config_path.display()
    );
    Ok(())
}

fn read_line(prompt: &str) -> anyhow::Result<String> {
    print!("{prompt}");
    std::io::stdout().flush().context("writing prompt")?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading from stdin")?;
    Ok(line.trim().to_owned())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, cancelling...");
            cancel_clone.cancel();
        }
    });
    cancel
}

fn print_report(report: &PipelineReport) {
    println!();
    for file in &report.downloads {
        println!("Saved: {} ({} bytes)", file.path.display(), file.bytes);
    }
    if report.downloads.is_empty() {
        for track in &report.tracks {
            if let Some(url) = track.best_url() {
                println!("{}: {url}", track.title);
            }
        }
    }
    print_unplayed(&report.unplayed);
}

fn print_unplayed(locators: &[String]) {
    if locators.is_empty() {
        return;
    }
    println!("Not played (install mpv, vlc, mplayer or ffplay if none was found). Play manually:");
    for locator in locators {
        println!("  {locator}");
    }
}

// ── Progress rendering ────────────────────────────────────────────

/// Renders [`ProgressEvent`]s with an indicatif spinner and download bars.
struct CliProgress {
    state: std::sync::Arc<Mutex<Bars>>,
}

#[derive(Default)]
struct Bars {
    spinner: Option<ProgressBar>,
    download: Option<ProgressBar>,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            state: std::sync::Arc::new(Mutex::new(Bars::default())),
        }
    }

    fn callback(&self) -> ProgressCallback {
        let state = std::sync::Arc::clone(&self.state);
        Box::new(move |event| {
            let Ok(mut bars) = state.lock() else {
                return;
            };
            bars.handle(event);
        })
    }

    fn finish(&self) {
        if let Ok(mut bars) = self.state.lock() {
            if let Some(spinner) = bars.spinner.take() {
                spinner.finish_and_clear();
            }
            if let Some(bar) = bars.download.take() {
                bar.finish_and_clear();
            }
        }
    }
}

impl Bars {
    fn handle(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Submitted { task_id } => {
                println!("Task created: {task_id}");
                let spinner = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::with_template("  {spinner} {msg} [{elapsed}]") {
                    spinner.set_style(style);
                }
                spinner.set_message("waiting for generation");
                spinner.enable_steady_tick(Duration::from_millis(120));
                self.spinner = Some(spinner);
            }
            ProgressEvent::PollTick { tick, status, .. } => {
                let spinner = self.spinner.get_or_insert_with(|| {
                    let spinner = ProgressBar::new_spinner();
                    spinner.enable_steady_tick(Duration::from_millis(120));
                    spinner
                });
                spinner.set_message(format!("waiting for generation (check {tick}: {status})"));
            }
            ProgressEvent::DownloadStarted {
                title, total_bytes, ..
            } => {
                if let Some(spinner) = self.spinner.take() {
                    spinner.finish_and_clear();
                }
                let bar = ProgressBar::new(total_bytes.unwrap_or(0));
                if let Ok(style) = ProgressStyle::with_template(
                    "  {msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
                ) {
                    bar.set_style(style);
                }
                bar.set_message(title);
                self.download = Some(bar);
            }
            ProgressEvent::DownloadProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                if let Some(bar) = &self.download {
                    if let Some(total) = total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(bytes_downloaded);
                }
            }
            ProgressEvent::DownloadComplete { path, .. } => {
                if let Some(bar) = self.download.take() {
                    bar.finish_and_clear();
                }
                println!("  downloaded {}", path.display());
            }
            ProgressEvent::PlaybackStarted { player, locator } => {
                if let Some(spinner) = self.spinner.take() {
                    spinner.finish_and_clear();
                }
                println!("Playing {locator} with {player}");
            }
        }
    }
}
