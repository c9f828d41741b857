use clap::{Parser, Subcommand};
use listmonk_sync::checkpoint::{override_checkpoint, parse_checkpoint};
use listmonk_sync::notify::{DisabledNotifier, NotificationMessage, TelegramNotifier};
use listmonk_sync::run_log::{self, prune_old_logs};
use listmonk_sync::source::UnavailableSource;
use listmonk_sync::{
    notifier_from_config, CheckpointStore, ListmonkClient, Notifier, RecordSource, RunMode,
    RunOutcome, SledSource, SyncConfig, SyncError, SyncPipeline, SyncState,
};
use chrono::Utc;
use log::{error, info, warn, LevelFilter};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use uuid::Uuid;

/// Log directory used when the configuration cannot be read at all
const FALLBACK_LOG_DIR: &str = "logs";
const STARTUP_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the configuration file (defaults to $LISTMONK_SYNC_CONFIG, then config.json)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full sync (the default)
    Run,
    /// Extract new users and write the CSV files without uploading or moving the checkpoint
    ExtractOnly,
    /// Inspect or override the stored checkpoint
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Print the stored checkpoint
    Show,
    /// Overwrite the stored checkpoint
    Set {
        /// RFC 3339 timestamp or "now"
        timestamp: String,
        /// Allow moving the checkpoint backwards
        #[arg(long)]
        allow_rewind: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let run_id = Uuid::new_v4();
    let config_path = SyncConfig::resolve_path(cli.config.as_deref());

    let config = match SyncConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => return config_failure(&config_path, e, run_id).await,
    };

    let level = config.logging.level_filter().unwrap_or(LevelFilter::Info);
    if let Err(e) = run_log::init(&config.paths.log_dir, run_id, level) {
        eprintln!("Cannot initialize run log: {}", e);
    }
    match prune_old_logs(&config.paths.log_dir, config.logging.retention(), Utc::now()) {
        Ok(removed) if !removed.is_empty() => info!(
            "Removed {} run logs older than {} days",
            removed.len(),
            config.logging.retention_days
        ),
        Ok(_) => {}
        Err(e) => warn!("Pruning old run logs failed: {}", e),
    }
    info!("Loaded config from {}", config_path.display());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config, RunMode::Full, run_id).await,
        Commands::ExtractOnly => run(&config, RunMode::ExtractOnly, run_id).await,
        Commands::Checkpoint { action } => handle_checkpoint(&config, action),
    }
}

async fn run(config: &SyncConfig, mode: RunMode, run_id: Uuid) -> ExitCode {
    let source: Box<dyn RecordSource>;
    let checkpoints: Box<dyn CheckpointStore>;
    match SledSource::open(&config.source) {
        Ok(sled) => {
            checkpoints = Box::new(sled.checkpoint_store());
            source = Box::new(sled);
        }
        Err(e) => {
            let reason = match e {
                SyncError::ConnectionError(msg) => msg,
                other => other.to_string(),
            };
            let unavailable = UnavailableSource::new(reason);
            checkpoints = Box::new(unavailable.clone());
            source = Box::new(unavailable);
        }
    }

    let target = match ListmonkClient::new(&config.target) {
        Ok(target) => target,
        Err(e) => {
            error!("Sync failed during {}: {}", SyncState::Idle, e);
            notify_startup_failure(config, &e).await;
            return ExitCode::from(e.exit_code());
        }
    };

    let notifier: Box<dyn Notifier> = match notifier_from_config(&config.notifier, &config.target) {
        Ok(notifier) => notifier,
        Err(e) => {
            warn!("Notifier unavailable, continuing without notifications: {}", e);
            Box::new(DisabledNotifier)
        }
    };

    let report = SyncPipeline::new(
        config,
        source.as_ref(),
        checkpoints.as_ref(),
        &target,
        notifier.as_ref(),
    )
    .with_run_id(run_id)
    .run(mode)
    .await;
    log::logger().flush();
    ExitCode::from(report.exit_code())
}

fn handle_checkpoint(config: &SyncConfig, action: CheckpointAction) -> ExitCode {
    let source = match SledSource::open(&config.source) {
        Ok(source) => source,
        Err(e) => {
            error!("Cannot open source: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };
    let store = source.checkpoint_store();

    let result = match action {
        CheckpointAction::Show => store.get().map(|checkpoint| {
            if checkpoint.is_epoch() {
                println!("{} (never synced)", checkpoint);
            } else {
                println!("{}", checkpoint);
            }
        }),
        CheckpointAction::Set {
            timestamp,
            allow_rewind,
        } => parse_checkpoint(&timestamp, Utc::now())
            .and_then(|to| override_checkpoint(&store, to, allow_rewind).map(|_| ())),
    };

    log::logger().flush();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Checkpoint command failed: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Report a configuration that failed to load or validate.
///
/// Whatever part of the file still parses is used to place the run log and,
/// when the notifier section is complete, to send the failure notification.
async fn config_failure(path: &Path, err: SyncError, run_id: Uuid) -> ExitCode {
    let partial = fs::read_to_string(path)
        .ok()
        .and_then(|raw| SyncConfig::from_json_str(&raw).ok())
        .map(|mut config| {
            config.apply_env_vars();
            config
        });

    let log_dir = partial
        .as_ref()
        .map(|config| config.paths.log_dir.clone())
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(FALLBACK_LOG_DIR));
    if let Err(e) = run_log::init(&log_dir, run_id, LevelFilter::Info) {
        eprintln!("Cannot initialize run log: {}", e);
    }

    error!("Sync failed during {}: {}", SyncState::Idle, err);
    if let Some(config) = partial {
        notify_startup_failure(&config, &err).await;
    }
    log::logger().flush();
    ExitCode::from(err.exit_code())
}

async fn notify_startup_failure(config: &SyncConfig, err: &SyncError) {
    if !config.notifier_usable() {
        return;
    }
    let notifier = match TelegramNotifier::new(&config.notifier, STARTUP_NOTIFY_TIMEOUT) {
        Ok(notifier) => notifier,
        Err(e) => {
            warn!("Failure notification not sent: {}", e);
            return;
        }
    };
    let message = NotificationMessage {
        outcome: RunOutcome::Failed {
            stage: SyncState::Idle,
            error: err.to_string(),
        },
        found: 0,
        imported: 0,
        skipped: 0,
        undated: 0,
        timestamp: Utc::now(),
    };
    if let Err(e) = notifier.push(&message).await {
        warn!("Failure notification via {} not sent: {}", notifier.name(), e);
    }
}
