use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use pdfcast::{
    BufferedBackend, Config, FileStorage, HttpClient, LibraryStore, NoopReporter, Overrides,
    PlayOutcome, PlaybackController, PlaybackState, ProgressEvent, ProgressReporter,
    ReqwestClient, SharedProgressReporter, UploadController, UploadFile, display_title,
    fetch_podcast, find_config_file, init_logging, load_config,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static UPLOAD: Emoji<'_, '_> = Emoji("📤 ", "[^] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PAUSE: Emoji<'_, '_> = Emoji("⏸️  ", "[=] ");
static STOP: Emoji<'_, '_> = Emoji("⏹️  ", "[.] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

/// Turn PDFs into podcasts on a conversion server and listen to them
#[derive(Parser, Debug)]
#[command(name = "pdfcast")]
#[command(about = "Turn PDFs into podcasts on a conversion server and listen to them")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Base URL of the conversion server [default: http://localhost:5000]
    #[arg(short, long, global = true, env = "PDFCAST_SERVER")]
    server: Option<String>,

    /// Directory holding the podcast library
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Path to TOML config file (overrides default search: ./pdfcast.toml, <config dir>/pdfcast/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Request timeout in seconds [default: 300]
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a PDF and add the generated podcast to the library
    Upload {
        /// PDF document to convert
        pdf: PathBuf,
    },

    /// List the podcasts in the library, oldest first
    List,

    /// Play a generated podcast headless: buffers it and shows a progress readout, no sound output (Ctrl-C stops)
    Play {
        /// Server-issued podcast filename, as shown by `list`
        filename: String,
    },

    /// Download a generated podcast to disk
    Fetch {
        /// Server-issued podcast filename, as shown by `list`
        filename: String,

        /// Output directory
        #[arg(default_value = ".")]
        output_dir: PathBuf,
    },

    /// Check that the conversion server is reachable
    Ping,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    main_bar: ProgressBar,
    fetch_bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            main_bar,
            fetch_bar: Mutex::new(None),
        }
    }

    fn get_or_create_fetch_bar(&self) -> ProgressBar {
        let mut slot = self.fetch_bar.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(bar) = slot.as_ref() {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(style);
        *slot = Some(bar.clone());
        bar
    }

    fn finish_fetch_bar(&self) {
        let mut slot = self.fetch_bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = slot.take() {
            bar.finish_and_clear();
        }
    }

    /// Bar tracking the playback position, in milliseconds
    fn playback_bar(&self, duration: Option<Duration>) -> ProgressBar {
        let bar = match duration {
            Some(duration) => {
                let style = ProgressStyle::default_bar()
                    .template("  {bar:30.magenta/blue} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▓░");
                let bar = ProgressBar::new(duration.as_millis() as u64);
                bar.set_style(style);
                bar
            }
            None => ProgressBar::new_spinner(),
        };
        self.multi.add(bar)
    }

    fn clear(&self) {
        self.main_bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::UploadStarted { file_name } => {
                self.main_bar
                    .set_message(format!("{UPLOAD}Converting {}", file_name.cyan()));
            }

            ProgressEvent::UploadSucceeded {
                podcast_filename,
                message,
                ..
            } => {
                self.clear();
                println!(
                    "{SUCCESS}{} {}",
                    display_title(&podcast_filename).bold().green(),
                    format!("({podcast_filename})").dimmed()
                );
                if let Some(message) = message {
                    println!("   {}", message.dimmed());
                }
            }

            ProgressEvent::UploadFailed { file_name, error } => {
                self.clear();
                println!("{FAILURE}{} - {}", file_name.red(), error.red());
            }

            ProgressEvent::PlaybackLoading { filename } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}Loading {}",
                    display_title(&filename).cyan()
                ));
            }

            ProgressEvent::PlaybackStarted { filename, .. }
            | ProgressEvent::PlaybackResumed { filename } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}Playing {}",
                    display_title(&filename).bold().green()
                ));
            }

            ProgressEvent::PlaybackPaused { filename } => {
                self.main_bar.set_message(format!(
                    "{PAUSE}Paused {}",
                    display_title(&filename).yellow()
                ));
            }

            ProgressEvent::PlaybackStopped { filename } => {
                self.clear();
                println!("{STOP}Stopped {}", display_title(&filename).yellow());
            }

            ProgressEvent::PlaybackFinished { filename } => {
                self.clear();
                println!(
                    "{PARTY}Finished {}",
                    display_title(&filename).bold().green()
                );
            }

            ProgressEvent::PlaybackFailed { filename, error } => {
                self.clear();
                println!(
                    "{FAILURE}{} - {}",
                    display_title(&filename).red(),
                    error.red()
                );
            }

            ProgressEvent::FetchStarting {
                filename,
                content_length,
            } => {
                self.main_bar
                    .set_message(format!("{DOWNLOAD}Fetching {}", filename.cyan()));
                let bar = self.get_or_create_fetch_bar();
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(truncate_title(&display_title(&filename), 40));
            }

            ProgressEvent::FetchProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                let bar = self.get_or_create_fetch_bar();
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::FetchCompleted {
                filename,
                bytes_downloaded,
                hash,
            } => {
                self.finish_fetch_bar();
                self.clear();
                println!(
                    "{SUCCESS}{} {} bytes {}",
                    filename.bold().green(),
                    bytes_downloaded.to_string().cyan(),
                    hash.dimmed()
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

async fn open_library(config: &Config) -> LibraryStore {
    let storage = Arc::new(FileStorage::new(&config.data_dir));
    LibraryStore::open(storage).await
}

async fn upload(
    client: ReqwestClient,
    config: &Config,
    reporter: SharedProgressReporter,
    pdf: PathBuf,
) -> Result<()> {
    if !pdf.is_file() {
        bail!("No such file: {}", pdf.display());
    }

    let library = open_library(config).await;
    let controller = UploadController::new(client, config.endpoints.clone(), library.clone(), reporter);

    let result = controller.upload(&UploadFile::pdf(&pdf)).await;
    library.flush().await;

    result.with_context(|| format!("Failed to convert {}", pdf.display()))?;
    Ok(())
}

async fn list(config: &Config, quiet: bool) -> Result<()> {
    let library = open_library(config).await;
    let podcasts = library.list();

    if podcasts.is_empty() {
        if !quiet {
            println!("{HEADPHONES}{}", "No podcasts yet. Upload a PDF to get started.".dimmed());
        }
        return Ok(());
    }

    for record in podcasts {
        let added = record
            .added_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{}  {}  {}",
            record.title().bold(),
            record.filename.cyan(),
            added.dimmed()
        );
    }
    Ok(())
}

async fn play(
    client: ReqwestClient,
    config: &Config,
    reporter: Option<Arc<IndicatifReporter>>,
    filename: &str,
) -> Result<()> {
    let shared: SharedProgressReporter = match &reporter {
        Some(reporter) => reporter.clone(),
        None => NoopReporter::shared(),
    };
    let controller = PlaybackController::new(
        BufferedBackend::new(client),
        config.endpoints.clone(),
        shared,
    );
    let mut updates = controller.subscribe();

    let outcome = controller
        .play(filename)
        .await
        .with_context(|| format!("Failed to play {filename}"))?;
    if outcome != PlayOutcome::Started {
        tracing::debug!(?outcome, "Play request did not start a new session");
    }

    let bar = reporter
        .as_ref()
        .map(|reporter| reporter.playback_bar(controller.snapshot().duration));

    let final_state = loop {
        let snapshot = updates.borrow_and_update().clone();

        if let Some(bar) = &bar {
            bar.set_position(snapshot.position.as_millis() as u64);
            let total = snapshot
                .duration
                .map(format_clock)
                .unwrap_or_else(|| "--:--".to_string());
            bar.set_message(format!("{} / {}", format_clock(snapshot.position), total));
        }

        if matches!(snapshot.state, PlaybackState::Stopped | PlaybackState::Idle) {
            break snapshot.state;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break PlaybackState::Idle;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.stop().await;
            }
        }
    };

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    controller.shutdown().await;

    if final_state == PlaybackState::Idle {
        bail!("Playback of {filename} ended with an error");
    }
    Ok(())
}

async fn fetch(
    client: ReqwestClient,
    config: &Config,
    reporter: SharedProgressReporter,
    filename: &str,
    output_dir: PathBuf,
    quiet: bool,
) -> Result<()> {
    let result = fetch_podcast(&client, &config.endpoints, filename, &output_dir, &reporter)
        .await
        .with_context(|| format!("Failed to fetch {filename}"))?;

    if !quiet {
        println!(
            "\n{FOLDER}Output: {}\n",
            result.path.display().to_string().cyan()
        );
    }
    Ok(())
}

async fn ping(client: ReqwestClient, config: &Config, quiet: bool) -> Result<()> {
    let url = config.endpoints.root_url();
    client
        .get_bytes(url.as_str())
        .await
        .with_context(|| format!("Server at {url} is not reachable"))?;

    if !quiet {
        println!("{SUCCESS}Server at {} is up", url.as_str().cyan());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    let file_config = match find_config_file(args.config.as_deref()) {
        Some(path) => Some(load_config(&path)?),
        None => None,
    };
    let overrides = Overrides {
        server: args.server.clone(),
        data_dir: args.data_dir.clone(),
        timeout_secs: args.timeout,
    };
    let config = Config::resolve(file_config, &overrides).context("Invalid configuration")?;
    tracing::debug!(?config, "Configuration resolved");

    let client =
        ReqwestClient::with_timeout(config.timeout).context("Failed to create HTTP client")?;

    // `list` prints plain lines only
    let reporter = if args.quiet || matches!(args.command, Command::List) {
        None
    } else {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "pdfcast".bold().magenta(),
            "- PDF to Podcast".dimmed()
        );
        Some(Arc::new(IndicatifReporter::new()))
    };
    let shared: SharedProgressReporter = match &reporter {
        Some(reporter) => reporter.clone(),
        None => NoopReporter::shared(),
    };

    let result = match args.command {
        Command::Upload { pdf } => upload(client, &config, shared, pdf).await,
        Command::List => list(&config, args.quiet).await,
        Command::Play { filename } => play(client, &config, reporter.clone(), &filename).await,
        Command::Fetch {
            filename,
            output_dir,
        } => fetch(client, &config, shared, &filename, output_dir, args.quiet).await,
        Command::Ping => ping(client, &config, args.quiet).await,
    };

    if let Some(reporter) = reporter {
        reporter.clear();
    }
    result
}
