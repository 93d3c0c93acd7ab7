use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use yt2pod::feed::feed_url;
use yt2pod::{
    Config, HistoryStore, NoopReporter, ProgressEvent, ProgressReporter, ReqwestClient, RunLock,
    RunSummary, SharedProgressReporter, ShowReport, SyncOptions, TranscodeOptions, YtDlpProvider,
    sync_all,
};

// Emoji with fallback for terminals without Unicode support
static TV: Emoji<'_, '_> = Emoji("📺 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static CLOCK: Emoji<'_, '_> = Emoji("⏰ ", "[-] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static ENCODE: Emoji<'_, '_> = Emoji("🎛️  ", "[e] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "[c] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Turn YouTube playlists into podcast feeds
#[derive(Parser, Debug)]
#[command(name = "yt2pod")]
#[command(about = "Turn YouTube playlists into podcast feeds")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    config: PathBuf,

    /// Only sync this show, ignoring its schedule
    #[arg(short, long, value_name = "ID")]
    show: Option<String>,

    /// Quiet mode - only warnings and errors, no progress output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode - debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Move an unreadable history file aside and start from an empty history
    #[arg(long)]
    recover_history: bool,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_bar = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {wide_msg}")
        {
            main_bar.set_style(style);
        }
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn bar(&self, download_id: usize) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(bar) = bars.get(&download_id) {
            return bar.clone();
        }

        let bar = self.multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::default_bar().template(&format!(
            "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
        )) {
            bar.set_style(style.progress_chars("█▓░"));
        }
        bars.insert(download_id, bar.clone());
        bar
    }

    fn remove_bar(&self, download_id: usize) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = bars.remove(&download_id) {
            bar.finish_and_clear();
        }
    }

    fn println(&self, line: String) {
        // Printing can only fail when the terminal is gone
        let _ = self.multi.println(line);
    }

    fn finish(&self) {
        self.main_bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ShowStarted { show_id, title } => {
                self.main_bar
                    .set_message(format!("{} {}", show_id.bold().magenta(), title.dimmed()));
            }

            ProgressEvent::ShowNotDue { show_id } => {
                self.println(format!("{CLOCK}{} not due yet", show_id.bold()));
            }

            ProgressEvent::ListingPlaylist { show_id, url } => {
                self.main_bar.set_message(format!(
                    "{SEARCH}{} listing {}",
                    show_id.bold().magenta(),
                    url.cyan()
                ));
            }

            ProgressEvent::PartialFilesCleanedUp { show_id, count } => {
                self.println(format!(
                    "{BROOM}{} removed {} interrupted download(s)",
                    show_id.bold(),
                    count.to_string().yellow()
                ));
            }

            ProgressEvent::PlanReady {
                show_id,
                listed,
                already_processed,
                to_fetch,
            } => {
                self.main_bar.set_message(format!(
                    "{} • {} listed, {} known, {} new",
                    show_id.bold().magenta(),
                    listed.to_string().cyan(),
                    already_processed.to_string().cyan(),
                    to_fetch.to_string().yellow()
                ));
            }

            ProgressEvent::FetchStarting {
                download_id,
                episode_title,
                episode_index,
                total_to_fetch,
                content_length,
            } => {
                let bar = self.bar(download_id);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(format!(
                    "[{}/{}] {}",
                    (episode_index + 1).to_string().cyan(),
                    total_to_fetch.to_string().cyan(),
                    truncate_title(&episode_title, 40)
                ));
            }

            ProgressEvent::FetchProgress {
                download_id,
                bytes_downloaded,
                total_bytes,
            } => {
                let bar = self.bar(download_id);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::Transcoding { download_id } => {
                let bar = self.bar(download_id);
                bar.set_message(format!("{ENCODE}{}", "encoding".dimmed()));
            }

            ProgressEvent::FetchCompleted {
                download_id,
                episode_title,
                ..
            } => {
                self.remove_bar(download_id);
                self.println(format!(
                    "  {SUCCESS}{}",
                    truncate_title(&episode_title, 60).green()
                ));
            }

            ProgressEvent::FetchFailed {
                download_id,
                episode_title,
                error,
            } => {
                self.remove_bar(download_id);
                self.println(format!(
                    "  {FAILURE}{} - {}",
                    truncate_title(&episode_title, 40).red(),
                    error.red()
                ));
            }

            ProgressEvent::FeedWritten {
                show_id,
                missing_audio,
                ..
            } => {
                if missing_audio > 0 {
                    self.println(format!(
                        "{FAILURE}{} {} recorded episode(s) have no audio file",
                        show_id.bold(),
                        missing_audio.to_string().yellow()
                    ));
                }
            }

            ProgressEvent::ShowFailed { show_id, error } => {
                self.println(format!("{FAILURE}{} {}", show_id.bold().red(), error.red()));
            }

            ProgressEvent::ShowCompleted {
                show_id,
                added,
                failed,
            } => {
                self.println(format!(
                    "{SUCCESS}{} {} added, {} failed",
                    show_id.bold().green(),
                    added.to_string().green().bold(),
                    if failed > 0 {
                        failed.to_string().red().bold()
                    } else {
                        failed.to_string().green()
                    }
                ));
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

fn print_summary(summary: &RunSummary, base_public_url: &Url) {
    println!("\n{}", "Summary:".bold());
    for (show_id, report) in &summary.shows {
        match report {
            ShowReport::NotDue => {
                println!("  {CLOCK}{} {}", show_id.bold(), "not due".dimmed());
            }
            ShowReport::Synced {
                added,
                failed,
                feed_error,
            } => {
                let url = feed_url(base_public_url, show_id)
                    .map(|u| u.to_string())
                    .unwrap_or_default();
                println!(
                    "  {SUCCESS}{} {} added  {}",
                    show_id.bold(),
                    added.to_string().green(),
                    url.cyan()
                );
                for (item_id, error) in failed {
                    println!("    {CROSS}{} - {}", item_id.yellow(), error.dimmed());
                }
                if let Some(error) = feed_error {
                    println!("    {CROSS}{} - {}", "feed".yellow(), error.red());
                }
            }
            ShowReport::Failed { error } => {
                println!("  {FAILURE}{} {}", show_id.bold().red(), error.red());
            }
        }
    }
    println!();
}

fn init_logging(args: &Args) {
    let default_level = if args.verbose {
        "yt2pod=debug"
    } else if args.quiet {
        "yt2pod=warn"
    } else {
        "yt2pod=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;
    if let Some(show_id) = &args.show {
        config.select_show(show_id)?;
    }

    let Some(_lock) = RunLock::try_acquire(&config.main.history_file)
        .context("Failed to take the run lock")?
    else {
        info!("Another run holds the lock, nothing to do");
        return Ok(());
    };

    let mut history = if args.recover_history {
        let (history, backup) = HistoryStore::load_or_set_aside(&config.main.history_file)
            .context("Failed to open history")?;
        if let Some(backup) = backup {
            warn!(backup = %backup.display(), "Corrupt history moved aside, starting empty");
        }
        history
    } else {
        HistoryStore::load(&config.main.history_file).context("Failed to open history")?
    };

    let client = ReqwestClient::new().context("Failed to create HTTP client")?;
    let transcode = TranscodeOptions {
        ffmpeg: config.main.ffmpeg.clone(),
        bitrate: config.main.audio_bitrate.clone(),
    };
    let provider = YtDlpProvider::new(client, config.main.yt_dlp.clone(), transcode)
        .with_listing_window(config.main.listing_window());

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            TV,
            "yt2pod".bold().magenta(),
            "- Playlists to Podcasts".dimmed()
        );
    }

    let terminal = (!args.quiet).then(|| Arc::new(IndicatifReporter::new()));
    let reporter: SharedProgressReporter = match &terminal {
        Some(terminal) => terminal.clone(),
        None => NoopReporter::shared(),
    };

    let options = SyncOptions {
        force: args.show.is_some(),
    };

    let summary = sync_all(&config, &provider, &mut history, Utc::now(), &options, &reporter)
        .await
        .context("Failed to persist history")?;

    if let Some(terminal) = terminal {
        terminal.finish();
        print_summary(&summary, &config.main.base_public_url);
    }

    info!(
        shows = summary.shows.len(),
        added = summary.added(),
        failures = summary.has_failures(),
        "Run complete"
    );

    Ok(())
}
