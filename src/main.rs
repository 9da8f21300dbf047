//! TaskDash - dashboard client for backend filter tasks
//!
//! A CLI tool that submits a filter task to the backend, polls it until
//! it finishes and exports the returned records as charts or summaries.
//!
//! Exit codes:
//!   0 - Success (records received and exported)
//!   1 - Runtime error (connection, config, invalid arguments, etc.)
//!   3 - Task did not complete (failed, unknown, exhausted or cancelled)

mod analysis;
mod cli;
mod client;
mod config;
mod models;
mod report;
mod submission;
mod view;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use client::{spawn_poll, HttpTaskApi, PollEvent, Poller};
use config::{Config, DEFAULT_CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use models::ViewFilter;
use report::{ReportMetadata, SummaryReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use submission::FilterList;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use view::{screen_for, AppEvent, AppState, Screen, ViewSelection};

/// Exit code when polling ends without records.
const EXIT_TASK_INCOMPLETE: i32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load config before logging so `general.verbose` can pick the level
    let (mut config, origin) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(config.log_level(&args));

    info!("TaskDash v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    origin.log();

    match run_dashboard(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Dashboard failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .taskdash.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set the server, polling limits and chart options.");
    Ok(())
}

/// Initialize logging at `level`.
///
/// `RUST_LOG` overrides the level picked by `--verbose` / `--quiet` and the config.
fn init_logging(level: tracing::Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the submit → poll → export workflow. Returns the exit code.
async fn run_dashboard(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let api = Arc::new(
        HttpTaskApi::new(&config.server.base_url, config.request_timeout())
            .context("Failed to create HTTP client")?,
    );
    info!("Backend: {}", api.base_url());

    if args.list_fields {
        return handle_list_fields(api.as_ref()).await;
    }

    let filters = build_filters(&args)?;
    let selection = build_selection(&args, &config);

    // Step 1: Get a task id
    let task_id = match args.task {
        Some(ref task_id) => {
            println!("🔁 Resuming task: {}", task_id);
            task_id.clone()
        }
        None => {
            println!("📤 Submitting task with {} filters", filters.len());
            for filter in filters.as_slice() {
                println!("   - {}", filter);
            }
            submission::submit(api.as_ref(), filters.clone())
                .await
                .context("Failed to submit task")?
        }
    };

    // Step 2: Poll until the task settles
    let state = AppState::Idle.apply(AppEvent::Submitted(task_id.clone()));
    let poller = Poller::new(api.clone(), config.poll_policy());
    let state = wait_for_task(poller, &task_id, state, !args.quiet).await;

    // Step 3: Export
    let screen = screen_for(&state, &selection);
    let duration = start_time.elapsed().as_secs_f64();
    let output_path = PathBuf::from(&config.general.output);

    let metadata = ReportMetadata {
        server: config.server.base_url.clone(),
        task_id: Some(task_id),
        generated_at: Utc::now(),
        filters: filters.as_slice().to_vec(),
        duration_seconds: duration,
    };

    let output = match config.general.format {
        OutputFormat::Svg => report::export_screen(&screen),
        OutputFormat::Markdown => {
            report::generate_markdown_summary(&SummaryReport::new(metadata, &screen))
        }
        OutputFormat::Json => report::generate_json_summary(&SummaryReport::new(metadata, &screen))?,
    };

    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write output to {}", output_path.display()))?;

    print_summary(&screen, &output_path, duration);

    match screen {
        Screen::Dashboard(_) => Ok(0),
        _ => Ok(EXIT_TASK_INCOMPLETE),
    }
}

/// Handle --list-fields: print the backend's fields and exit.
async fn handle_list_fields(api: &HttpTaskApi) -> Result<i32> {
    let fields = submission::available_fields(api)
        .await
        .context("Failed to fetch fields")?;

    if fields.is_empty() {
        println!("   The backend offers no fields.");
    } else {
        println!("📋 {} fields available:\n", fields.len());
        for field in &fields {
            println!("   {}", field);
        }
    }

    Ok(0)
}

/// Collect --filter drafts, then apply --edit-filter edits in order.
fn build_filters(args: &Args) -> Result<FilterList> {
    let mut filters = FilterList::new();

    for (index, draft) in args.filters.iter().enumerate() {
        filters
            .add(draft.clone())
            .with_context(|| format!("Invalid filter #{}", index))?;
    }

    for edit in &args.edits {
        filters
            .apply_edit(edit.clone())
            .with_context(|| format!("Invalid edit of filter #{}", edit.index))?;
    }

    Ok(filters)
}

fn build_selection(args: &Args, config: &Config) -> ViewSelection {
    ViewSelection {
        group_field: config.chart.group_field.clone(),
        filter: ViewFilter {
            year: args.year.clone(),
            field_value: args.field_value.clone(),
            start_date: args.start_date.clone(),
            end_date: args.end_date.clone(),
        },
    }
}

/// Drive the poll to completion, feeding its progress into `state`.
///
/// Ctrl-C cancels the poll; the state then ends up `Failed`.
async fn wait_for_task(
    poller: Poller<HttpTaskApi>,
    task_id: &str,
    mut state: AppState,
    show_progress: bool,
) -> AppState {
    let spinner = show_progress.then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message(format!("Waiting for task {}", task_id));
        pb
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_poll(poller, task_id.to_string(), move |event| {
        let _ = tx.send(event);
    });

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(PollEvent::Status { attempt, status }) => {
                    if let Some(ref pb) = spinner {
                        if status.is_terminal() {
                            pb.set_message(format!("Task {}: {}", task_id, status));
                        } else {
                            pb.set_message(format!("Task {}: {} (check {})", task_id, status, attempt));
                        }
                    }
                    state = state.apply(AppEvent::StatusObserved { attempt, status });
                }
                Some(PollEvent::Retrying { attempt, delay }) => {
                    if let Some(ref pb) = spinner {
                        pb.set_message(format!(
                            "Task {}: check {} failed, retrying in {:.1}s",
                            task_id,
                            attempt,
                            delay.as_secs_f64()
                        ));
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling poll for task {}", task_id);
                handle.cancel();
                break;
            }
        }
    }

    let event = match handle.join().await {
        Ok(records) => {
            if let Some(ref pb) = spinner {
                pb.finish_with_message(format!("Task {} completed", task_id));
            }
            AppEvent::Finished(records)
        }
        Err(e) => {
            if let Some(ref pb) = spinner {
                pb.abandon_with_message(format!("Task {} did not complete", task_id));
            }
            AppEvent::Errored(e.to_string())
        }
    };

    state.apply(event)
}

fn print_summary(screen: &Screen, output_path: &Path, duration: f64) {
    match screen {
        Screen::Dashboard(view) => {
            println!("\n📊 Dashboard Summary:");
            println!(
                "   Records: {} of {} after filters",
                view.filtered_records, view.total_records
            );
            if let Some(ref field) = view.group_field {
                println!("   Grouped by: {} ({} values)", field, view.by_field.len());
            }
            if let Some(ref field) = view.date_field {
                println!("   Dated by: {} ({} years)", field, view.by_year.len());
            }
            if view.is_empty() {
                println!("   ⚠️  No records match the current filters.");
            }
        }
        Screen::Failed { task_id, error } => {
            eprintln!("\n⛔ Task {} did not complete: {}", task_id, error);
        }
        Screen::Waiting { task_id, .. } => {
            eprintln!("\n⛔ Task {} is still running.", task_id);
        }
        Screen::Idle => {
            eprintln!("\n⛔ No task was submitted.");
        }
    }

    println!("   Duration: {:.1}s", duration);
    println!("\n✅ Output saved to: {}", output_path.display());
}

/// Where the configuration came from, reported once logging is up.
enum ConfigOrigin {
    Explicit(PathBuf),
    DefaultFile,
    Builtin,
    Unreadable(anyhow::Error),
}

impl ConfigOrigin {
    fn log(&self) {
        match self {
            ConfigOrigin::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigOrigin::DefaultFile => info!("Loaded default config from {}", DEFAULT_CONFIG_FILE),
            ConfigOrigin::Builtin => debug!("No config file found, using defaults"),
            ConfigOrigin::Unreadable(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
///
/// Only an explicit `--config` path that fails to load is an error.
fn load_config(args: &Args) -> Result<(Config, ConfigOrigin)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigOrigin::Explicit(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigOrigin::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigOrigin::Builtin)),
        Err(e) => Ok((Config::default(), ConfigOrigin::Unreadable(e))),
    }
}
