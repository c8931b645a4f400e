use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hondana_api::{AuthFlow, TrackEntry, TrackStatus, TrackerKind};
use hondana_core::config::AppConfig;
use hondana_runtime::{Runtime, RuntimeError, SyncOutcome};

#[derive(Parser)]
#[command(name = "hondana")]
#[command(about = "Sync manga reading progress to AniList and MyAnimeList")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List trackers and their login state
    Trackers,
    /// Log in to a tracker through the browser
    Login {
        tracker: TrackerKind,
        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Forget a tracker's stored session
    Logout { tracker: TrackerKind },
    /// Search a tracker's catalog
    Search {
        tracker: TrackerKind,
        query: String,
    },
    /// Show your library entry for a series
    Entry {
        tracker: TrackerKind,
        series_id: String,
    },
    /// Change fields of a library entry, creating it if needed
    Update {
        tracker: TrackerKind,
        series_id: String,
        #[arg(long, value_parser = parse_status)]
        status: Option<TrackStatus>,
        #[arg(long)]
        score: Option<f64>,
        #[arg(long)]
        progress: Option<u32>,
    },
    /// Link a local series to a tracker's series id
    Link {
        local_id: String,
        tracker: TrackerKind,
        series_id: String,
    },
    /// Remove a link
    Unlink {
        local_id: String,
        tracker: TrackerKind,
    },
    /// Show trackers linked to a local series
    Links { local_id: String },
    /// Report that a local series has been read up to a chapter
    Progress { local_id: String, chapter: u32 },
}

fn parse_status(s: &str) -> Result<TrackStatus, String> {
    TrackStatus::ALL
        .iter()
        .copied()
        .find(|status| status.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| {
            let names: Vec<_> = TrackStatus::ALL.iter().map(|s| s.as_str()).collect();
            format!("expected one of: {}", names.join(", "))
        })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: &AppConfig) -> Result<(), RuntimeError> {
    let runtime = Runtime::open(config)?;

    match command {
        Commands::Trackers => {
            for tracker in runtime.trackers().await? {
                let state = match (&tracker.username, tracker.authenticated) {
                    (Some(name), true) => format!("logged in as {name}"),
                    (None, true) => "logged in".to_string(),
                    (_, false) => "logged out".to_string(),
                };
                println!(
                    "{:<14} {:<24} {}",
                    tracker.kind.key(),
                    tracker.metadata.homepage_url,
                    state
                );
            }
        }
        Commands::Login {
            tracker,
            no_browser,
        } => {
            let request = runtime.begin_login(tracker).await;
            let prompt = match request.flow {
                AuthFlow::Implicit => "Paste the access_token from the redirect URL: ",
                AuthFlow::AuthorizationCode => "Paste the code from the redirect URL: ",
                AuthFlow::Unsupported => {
                    return Err(RuntimeError::Auth(format!(
                        "{tracker} does not support browser login"
                    )));
                }
            };

            println!("{}", request.url);
            if !no_browser {
                if let Err(e) = open::that(&request.url) {
                    tracing::warn!(error = %e, "could not open browser");
                }
            }

            let code = read_line(prompt, io::stdin().lock())?;
            match runtime.complete_login(tracker, &code).await? {
                Some(name) => println!("Logged in to {tracker} as {name}"),
                None => println!("Logged in to {tracker}"),
            }
        }
        Commands::Logout { tracker } => {
            runtime.logout(tracker).await?;
            println!("Logged out of {tracker}");
        }
        Commands::Search { tracker, query } => {
            let results = runtime.search(tracker, &query).await;
            if results.is_empty() {
                println!("No results.");
            }
            for series in results {
                println!("{:>8}  {}", series.id, series.title);
            }
        }
        Commands::Entry { tracker, series_id } => {
            match runtime.library_entry(tracker, &series_id).await {
                Some(entry) => print_entry(&entry),
                None => println!("No library entry."),
            }
        }
        Commands::Update {
            tracker,
            series_id,
            status,
            score,
            progress,
        } => {
            let entry = TrackEntry {
                status,
                score,
                progress,
                ..TrackEntry::for_series(series_id)
            };
            match runtime.update_entry(tracker, &entry).await {
                Some(saved) => print_entry(&saved),
                None => {
                    return Err(RuntimeError::Sync(format!(
                        "{tracker} rejected the update (see log for details)"
                    )));
                }
            }
        }
        Commands::Link {
            local_id,
            tracker,
            series_id,
        } => {
            runtime.link_series(&local_id, tracker, &series_id)?;
            println!("Linked {local_id} to {tracker} {series_id}");
        }
        Commands::Unlink { local_id, tracker } => {
            runtime.unlink_series(&local_id, tracker)?;
        }
        Commands::Links { local_id } => {
            for (tracker, series_id) in runtime.linked_series(&local_id)? {
                println!("{:<14} {}", tracker.key(), series_id);
            }
        }
        Commands::Progress { local_id, chapter } => {
            let outcomes = runtime.send_progress(&local_id, chapter).await?;
            if outcomes.is_empty() {
                println!("{local_id} is not linked to any tracker.");
            }
            for (tracker, outcome) in outcomes {
                let line = match outcome {
                    SyncOutcome::Updated { progress } => format!("updated to chapter {progress}"),
                    SyncOutcome::AlreadyCurrent { progress } => {
                        format!("already at chapter {progress}")
                    }
                    SyncOutcome::NotLoggedIn => "not logged in".to_string(),
                    SyncOutcome::Failed => "failed".to_string(),
                };
                println!("{:<14} {}", tracker.key(), line);
            }
        }
    }
    Ok(())
}

fn print_entry(entry: &TrackEntry) {
    println!("series:   {}", entry.series_id);
    if let Some(title) = &entry.title {
        println!("title:    {title}");
    }
    if let Some(status) = entry.status {
        println!("status:   {status}");
    }
    if let Some(progress) = entry.progress {
        println!("progress: {progress}");
    }
    if let Some(score) = entry.score {
        match entry.score_format {
            Some(format) => println!("score:    {score}/{}", format.max_score()),
            None => println!("score:    {score}"),
        }
    }
}

fn read_line(prompt: &str, mut input: impl BufRead) -> Result<String, RuntimeError> {
    print!("{prompt}");
    io::stdout()
        .flush()
        .map_err(|e| RuntimeError::Io(e.to_string()))?;
    let mut line = String::new();
    input
        .read_line(&mut line)
        .map_err(|e| RuntimeError::Io(e.to_string()))?;
    Ok(line.trim().to_string())
}
