use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use slotgrab_core::app::{TaskManager, TaskManagerBuilder, callback};
use slotgrab_core::auth::{LoginObserver, PollingStateMachine};
use slotgrab_core::config::{Settings, TaskFile};
use slotgrab_core::domain::{CredentialSet, EventKind, GrabTask, PollPhase, TaskStatus};
use slotgrab_core::impls::{
    CookieFile, HttpAttemptFactory, JsonlHistory, LogNotifier, WechatEndpoints, WechatQrProvider,
};
use slotgrab_core::ports::{CredentialStore, IdGenerator, SystemClock, UlidGenerator};

#[derive(Parser, Debug)]
#[command(name = "slotgrab", version, about = "Grab appointment slots the moment they open")]
struct Cli {
    /// Settings file (TOML). Missing file means defaults.
    #[arg(long, short, env = "SLOTGRAB_CONFIG", default_value = "slotgrab.toml", global = true)]
    config: PathBuf,

    /// Debug-level logs.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in by scanning a QR code; saves cookies on success.
    Login {
        /// Where to write the QR image.
        #[arg(long, default_value = "login-qr.png")]
        qr_out: PathBuf,
    },

    /// Run every task in the file until each one finishes (Ctrl-C stops all).
    Run {
        #[arg(long)]
        tasks: PathBuf,

        /// Print the final task snapshots as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Validate a task file without running anything.
    Check {
        #[arg(long)]
        tasks: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "slotgrab=debug" } else { "slotgrab=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with_target(false)
        .init();

    let settings = Settings::load(Some(&cli.config))
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;

    match cli.command {
        Command::Login { qr_out } => login(&settings, qr_out).await,
        Command::Run { tasks, json } => run(&settings, &tasks, json).await,
        Command::Check { tasks } => check(&tasks),
    }
}

/// Writes the QR image to disk and echoes status lines.
struct TerminalLogin {
    qr_out: PathBuf,
}

impl LoginObserver for TerminalLogin {
    fn on_qr_image(&self, image: &[u8]) {
        match std::fs::write(&self.qr_out, image) {
            Ok(()) => println!("QR code written to {}; scan it with WeChat", self.qr_out.display()),
            Err(err) => warn!(path = %self.qr_out.display(), error = %err, "could not write QR image"),
        }
    }

    fn on_status(&self, phase: PollPhase, message: &str) {
        println!("[{phase}] {message}");
    }
}

async fn login(settings: &Settings, qr_out: PathBuf) -> anyhow::Result<()> {
    let provider = WechatQrProvider::new(WechatEndpoints::default()).context("building http client")?;
    let login_id = UlidGenerator::new(SystemClock).generate_login_id();
    let machine = Arc::new(PollingStateMachine::new(
        Arc::new(provider),
        settings.login_config(),
        login_id,
    ));

    let stop = machine.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.signal();
        }
    });

    let outcome = machine.run_supervised(Arc::new(TerminalLogin { qr_out })).await;
    if !outcome.is_confirmed() {
        bail!("login {}: {}", outcome.phase, outcome.reason);
    }

    let store = CookieFile::new(&settings.storage.cookie_path);
    store
        .save(&outcome.credentials)
        .await
        .with_context(|| format!("saving cookies to {}", store.path().display()))?;
    println!("saved {} cookies to {}", outcome.credentials.len(), store.path().display());
    Ok(())
}

fn check(tasks: &Path) -> anyhow::Result<()> {
    let file = TaskFile::load(tasks)?;
    file.validate()?;

    for task in &file.tasks {
        let start = task
            .start_time
            .map(|t| t.to_string())
            .unwrap_or_else(|| "immediately".into());
        println!("ok  {:<24} {} date(s), start {}", task.display_name(), task.dates.len(), start);
    }
    println!("{} task(s) valid", file.tasks.len());
    Ok(())
}

async fn load_credentials(settings: &Settings) -> anyhow::Result<CredentialSet> {
    let store = CookieFile::new(&settings.storage.cookie_path);
    let loaded = store
        .load()
        .await
        .with_context(|| format!("reading cookies from {}", store.path().display()))?;
    match loaded {
        Some(credentials) => Ok(credentials),
        None => {
            warn!(path = %store.path().display(), "no saved login; run `slotgrab login` first");
            Ok(CredentialSet::new())
        }
    }
}

async fn run(settings: &Settings, tasks: &Path, json: bool) -> anyhow::Result<()> {
    let file = TaskFile::load(tasks)?;
    file.validate()?;
    if file.tasks.is_empty() {
        bail!("{} defines no tasks", tasks.display());
    }

    let credentials = load_credentials(settings).await?;
    let manager = TaskManagerBuilder::new()
        .attempt_factory(Arc::new(HttpAttemptFactory::new(settings.booking_endpoint(), credentials)))
        .history(Arc::new(JsonlHistory::new(&settings.storage.history_path)))
        .notifier(Arc::new(LogNotifier))
        .config(settings.manager_config())
        .build()?;

    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();
    manager.subscribe(
        EventKind::Finish,
        callback(move |event| {
            // 受信側が先に終わっていれば捨てるだけ
            let _ = finished_tx.send(event.task().id);
            Ok(())
        }),
    );

    for config in file.tasks {
        manager.add_task(config).await?;
    }
    let started = manager.start_all().await;
    info!(started, max_concurrent = manager.config().max_concurrent, "tasks admitted");

    drive(&manager, &mut finished_rx).await;
    report(&manager.tasks().await, json)
}

/// Re-admit queued tasks as slots free up; Ctrl-C stops everything.
async fn drive(manager: &TaskManager, finished: &mut mpsc::UnboundedReceiver<slotgrab_core::domain::TaskId>) {
    loop {
        if manager.status_summary().await.active() == 0 {
            return;
        }
        tokio::select! {
            Some(id) = finished.recv() => {
                let admitted = manager.start_all().await;
                if admitted > 0 {
                    info!(finished = %id, admitted, "slot freed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let stopped = manager.stop_all().await;
                info!(stopped, "interrupted, waiting for in-flight attempts");
                manager.wait_idle().await;
                return;
            }
        }
    }
}

fn report(tasks: &[GrabTask], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(tasks)?);
        return Ok(());
    }

    for task in tasks {
        let detail = match (&task.status, &task.result, &task.last_error) {
            (TaskStatus::Success, Some(result), _) => {
                format!("{} {} {}", result.date, result.time_slot, result.doctor_name)
            }
            (_, _, Some(error)) => error.clone(),
            _ => String::new(),
        };
        println!(
            "{:<24} {:<8} attempts={:<5} {}",
            task.name(),
            task.status,
            task.attempts,
            detail
        );
    }

    let summary = slotgrab_core::app::StatusSummary::from_statuses(tasks.iter().map(|t| t.status));
    println!(
        "total={} success={} failed={} stopped={} pending={}",
        summary.total, summary.success, summary.failed, summary.stopped, summary.pending
    );
    Ok(())
}
