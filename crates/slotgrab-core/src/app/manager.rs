//! TaskManager - タスクの登録・起動・停止・削除と同時実行数の制御
//!
//! # 責務
//! - レジストリ（id → タスク）を 1 つの tokio Mutex で守る。入場判定はこのロック下で直列化
//! - 入場したタスクは独立した tokio task として実行し、監督ルーチンが panic を拾う
//! - イベントはロックを離してから Observers に配送する
//!
//! # 同時実行数
//! WAITING + RUNNING を「使用中スロット」として数える。
//! 待機中のタスクが RUNNING に移っても上限を超えない。
//! stop 後も試行中の run が抜けるまではスロットを占有し、同じタスクの再 start も受け付けない。
//!
//! # 世代（run）
//! start のたびに run 番号を進める。古い run からの状態更新は無視される
//! （stop → 再 start の後に前回の run が遅れて終わっても、新しい run を上書きしない）。

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

use super::observers::{Callback, Observers};
use super::retry_loop::{LoopObserver, LoopOutcome, RetryLoop, RetryPolicy};
use super::schedule::{WaitOutcome, wait_until};
use super::status::StatusSummary;
use super::stop::StopSignal;
use crate::domain::{
    AttemptError, ConfigError, EventKind, GrabSuccess, GrabTask, TaskConfig, TaskError, TaskEvent,
    TaskId,
};
use crate::ports::{AttemptFactory, Clock, HistoryRecord, HistoryStore, IdGenerator, Notifier};

/// Scheduler knobs shared by every task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Ceiling on WAITING + RUNNING tasks.
    pub max_concurrent: usize,

    /// Default cadence; tasks may override it.
    pub retry: RetryPolicy,
}

impl ManagerConfig {
    pub const DEFAULT_MAX_CONCURRENT: usize = 5;
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: Self::DEFAULT_MAX_CONCURRENT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Ports the manager drives. Assembled by `TaskManagerBuilder`.
pub(crate) struct Collaborators {
    pub(crate) factory: Arc<dyn AttemptFactory>,
    pub(crate) history: Arc<dyn HistoryStore>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
}

struct TaskEntry {
    task: GrabTask,
    stop: StopSignal,
    run: u64,
    /// The current run has not exited its attempt loop yet.
    live: bool,
}

impl TaskEntry {
    fn occupies_slot(&self) -> bool {
        self.live || self.task.status.is_active()
    }
}

#[derive(Default)]
struct Registry {
    tasks: HashMap<TaskId, TaskEntry>,
    /// Insertion order, for FIFO start_all and stable listings.
    order: Vec<TaskId>,
    next_run: u64,
    /// Live runs whose task was removed before they exited.
    orphaned: usize,
}

impl Registry {
    fn busy_count(&self) -> usize {
        self.tasks.values().filter(|entry| entry.occupies_slot()).count() + self.orphaned
    }

    fn ordered(&self) -> impl Iterator<Item = &TaskEntry> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }
}

struct Shared {
    registry: Mutex<Registry>,
    observers: Observers,
    parts: Collaborators,
    config: ManagerConfig,
    idle: Notify,
}

impl Shared {
    /// Apply `f` only while `run` is the task's current, still-active run.
    async fn with_run<R>(&self, id: TaskId, run: u64, f: impl FnOnce(&mut GrabTask) -> R) -> Option<R> {
        let mut registry = self.registry.lock().await;
        match registry.tasks.get_mut(&id) {
            Some(entry) if entry.run == run && entry.task.status.is_active() => Some(f(&mut entry.task)),
            _ => None,
        }
    }

    /// Like `with_run`, and marks the run as out of its attempt loop.
    async fn settle_run<R>(&self, id: TaskId, run: u64, f: impl FnOnce(&mut GrabTask) -> R) -> Option<R> {
        let mut registry = self.registry.lock().await;
        let entry = registry.tasks.get_mut(&id).filter(|entry| entry.run == run)?;
        entry.live = false;
        entry.task.status.is_active().then(|| f(&mut entry.task))
    }

    /// The run routine has returned; its slot is free again.
    async fn release_run(&self, id: TaskId, run: u64) {
        let mut registry = self.registry.lock().await;
        match registry.tasks.get_mut(&id) {
            Some(entry) if entry.run == run => entry.live = false,
            Some(_) => {}
            None => registry.orphaned = registry.orphaned.saturating_sub(1),
        }
    }
}

/// Owns every grab task and the worker pool they run on.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct TaskManager {
    shared: Arc<Shared>,
}

impl TaskManager {
    pub(crate) fn new(config: ManagerConfig, parts: Collaborators) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                observers: Observers::new(),
                parts,
                config,
                idle: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> ManagerConfig {
        self.shared.config
    }

    pub fn subscribe(&self, kind: EventKind, callback: Callback) {
        self.shared.observers.subscribe(kind, callback);
    }

    pub fn subscribe_all(&self, callback: Callback) {
        self.shared.observers.subscribe_all(callback);
    }

    /// Validate and register a task in PENDING. Nothing runs yet.
    pub async fn add_task(&self, config: TaskConfig) -> Result<TaskId, ConfigError> {
        config.validate()?;

        let id = self.shared.parts.ids.generate_task_id();
        let task = GrabTask::new(id, config, self.shared.parts.clock.now());
        info!(task_id = %id, name = %task.name(), "task added");

        let mut registry = self.shared.registry.lock().await;
        registry.tasks.insert(
            id,
            TaskEntry {
                task,
                stop: StopSignal::new(),
                run: 0,
                live: false,
            },
        );
        registry.order.push(id);
        Ok(id)
    }

    /// Admit one task if it exists, is not active, its previous run has exited
    /// and a slot is free.
    pub async fn start_task(&self, id: TaskId) -> bool {
        let (snapshot, stop, run) = {
            let mut guard = self.shared.registry.lock().await;
            let registry = &mut *guard;

            let has_slot = registry.busy_count() < self.shared.config.max_concurrent;
            let Some(entry) = registry.tasks.get_mut(&id) else {
                return false;
            };
            if entry.task.status.is_active() {
                return false;
            }
            if entry.live {
                debug!(task_id = %id, "previous run still in flight");
                return false;
            }
            if !has_slot {
                debug!(task_id = %id, max_concurrent = self.shared.config.max_concurrent, "no free slot");
                return false;
            }

            registry.next_run += 1;
            entry.run = registry.next_run;
            entry.live = true;
            // 停止フラグは下りないので run ごとに作り直す
            entry.stop = StopSignal::new();
            entry.task.begin_run(self.shared.parts.clock.now());
            (entry.task.clone(), entry.stop.clone(), entry.run)
        };

        info!(task_id = %id, status = %snapshot.status, "task started");
        let config = snapshot.to_config();
        self.shared.observers.emit(&TaskEvent::Start(snapshot));
        tokio::spawn(supervise(Arc::clone(&self.shared), id, run, stop, config));
        true
    }

    /// Signal, mark STOPPED and emit `finish`. An in-flight attempt is not aborted;
    /// the task keeps its slot until that run exits.
    pub async fn stop_task(&self, id: TaskId) -> bool {
        let snapshot = {
            let mut registry = self.shared.registry.lock().await;
            let Some(entry) = registry.tasks.get_mut(&id) else {
                return false;
            };
            if !entry.task.status.is_active() {
                return false;
            }
            entry.stop.signal();
            if !entry.task.mark_stopped(self.shared.parts.clock.now()) {
                return false;
            }
            entry.task.clone()
        };

        info!(task_id = %id, attempts = snapshot.attempts, "task stopped");
        self.shared.observers.emit(&TaskEvent::Finish(snapshot));
        self.shared.idle.notify_waiters();
        true
    }

    /// Admit PENDING / STOPPED tasks in insertion order; returns how many started.
    pub async fn start_all(&self) -> usize {
        let candidates: Vec<TaskId> = {
            let registry = self.shared.registry.lock().await;
            registry
                .ordered()
                .filter(|entry| entry.task.status.is_startable())
                .map(|entry| entry.task.id)
                .collect()
        };

        let mut started = 0;
        for id in candidates {
            if self.start_task(id).await {
                started += 1;
            }
        }
        started
    }

    /// Stop every active task; returns how many were stopped.
    pub async fn stop_all(&self) -> usize {
        let active: Vec<TaskId> = {
            let registry = self.shared.registry.lock().await;
            registry
                .ordered()
                .filter(|entry| entry.task.status.is_active())
                .map(|entry| entry.task.id)
                .collect()
        };

        let mut stopped = 0;
        for id in active {
            if self.stop_task(id).await {
                stopped += 1;
            }
        }
        stopped
    }

    /// Stop if active, then forget the task.
    pub async fn remove_task(&self, id: TaskId) -> bool {
        self.stop_task(id).await;

        let mut registry = self.shared.registry.lock().await;
        let Some(entry) = registry.tasks.remove(&id) else {
            return false;
        };
        if entry.live {
            registry.orphaned += 1;
        }
        registry.order.retain(|other| *other != id);
        info!(task_id = %id, "task removed");
        true
    }

    pub async fn get_task(&self, id: TaskId) -> Option<GrabTask> {
        let registry = self.shared.registry.lock().await;
        registry.tasks.get(&id).map(|entry| entry.task.clone())
    }

    /// Snapshots in insertion order.
    pub async fn tasks(&self) -> Vec<GrabTask> {
        let registry = self.shared.registry.lock().await;
        registry.ordered().map(|entry| entry.task.clone()).collect()
    }

    pub async fn status_summary(&self) -> StatusSummary {
        let registry = self.shared.registry.lock().await;
        StatusSummary::from_statuses(registry.ordered().map(|entry| entry.task.status))
    }

    pub async fn running_count(&self) -> usize {
        self.status_summary().await.running
    }

    /// Resolves once no task is WAITING or RUNNING and every stopped run has exited.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            // 判定より先に登録しておかないと、間に来た通知を取りこぼす
            notified.as_mut().enable();

            if self.shared.registry.lock().await.busy_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Runs one task run and turns a panic into FAILED + finish.
async fn supervise(shared: Arc<Shared>, id: TaskId, run: u64, stop: StopSignal, config: TaskConfig) {
    let worker = tokio::spawn(run_task(Arc::clone(&shared), id, run, stop, config));
    if let Err(err) = worker.await {
        let reason = if err.is_panic() {
            panic_message(err.into_panic())
        } else {
            "run was cancelled".to_string()
        };
        error!(task_id = %id, run, reason = %reason, "task run crashed");
        fail_run(&shared, id, run, TaskError::Unexpected(reason)).await;
    }
    shared.release_run(id, run).await;
    shared.idle.notify_waiters();
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

async fn run_task(shared: Arc<Shared>, id: TaskId, run: u64, stop: StopSignal, config: TaskConfig) {
    let attempt = match shared.parts.factory.create() {
        Ok(attempt) => attempt,
        Err(err) => {
            fail_run(&shared, id, run, TaskError::Unexpected(format!("attempt client: {err}"))).await;
            return;
        }
    };

    if let Some(start_time) = config.start_time {
        debug!(task_id = %id, %start_time, "waiting for scheduled start");
        if wait_until(shared.parts.clock.as_ref(), start_time, &stop).await == WaitOutcome::Stopped {
            return;
        }
        let entered = shared
            .with_run(id, run, |task| task.enter_running().then(|| task.clone()))
            .await
            .flatten();
        let Some(snapshot) = entered else {
            return;
        };
        info!(task_id = %id, "scheduled start reached");
        shared.observers.emit(&TaskEvent::Update(snapshot));
    }

    let policy = shared.config.retry.for_task(&config);
    let mut observer = RunObserver {
        shared: &shared,
        id,
        run,
    };
    let outcome = RetryLoop::new(attempt.as_ref(), policy, stop)
        .run(&config, &mut observer)
        .await;

    match outcome {
        LoopOutcome::Succeeded { payload, attempts } => {
            info!(task_id = %id, attempts, "slot claimed");
            complete_success(&shared, id, run, payload).await;
        }
        LoopOutcome::Failed { error, attempts } => {
            warn!(task_id = %id, attempts, error = %error, "task failed");
            fail_run(&shared, id, run, error).await;
        }
        LoopOutcome::Stopped { attempts } => {
            // stop_task が STOPPED と finish を記録済み
            debug!(task_id = %id, attempts, "run loop exited after stop");
        }
    }
}

/// Mirrors loop progress into the registry and emits `update`.
struct RunObserver<'a> {
    shared: &'a Shared,
    id: TaskId,
    run: u64,
}

#[async_trait]
impl LoopObserver for RunObserver<'_> {
    async fn on_attempt_start(&mut self, attempt: u32) {
        debug!(task_id = %self.id, attempt, "attempt");
        self.shared
            .with_run(self.id, self.run, |task| task.start_attempt())
            .await;
    }

    async fn on_progress(&mut self, attempt: u32, error: Option<&AttemptError>) {
        let message = error.map(|err| err.to_string());
        if let Some(message) = &message {
            debug!(task_id = %self.id, attempt, error = %message, "attempt failed, retrying");
        }
        let snapshot = self
            .shared
            .with_run(self.id, self.run, |task| {
                if let Some(message) = message {
                    task.record_error(message);
                }
                task.clone()
            })
            .await;
        if let Some(snapshot) = snapshot {
            self.shared.observers.emit(&TaskEvent::Update(snapshot));
        }
    }
}

async fn complete_success(shared: &Shared, id: TaskId, run: u64, payload: GrabSuccess) {
    let now = shared.parts.clock.now();
    let snapshot = shared
        .settle_run(id, run, |task| {
            task.mark_succeeded(payload.clone(), now).then(|| task.clone())
        })
        .await
        .flatten();

    // 予約は上流で確定している。stop と競合しても履歴と通知は残す
    let record = HistoryRecord::success(&payload, now);
    if let Err(err) = shared.parts.history.save(&record).await {
        warn!(task_id = %id, error = %err, "failed to save history");
    }
    if let Err(err) = shared.parts.notifier.notify_success(&payload).await {
        warn!(task_id = %id, error = %err, "failed to send notification");
    }

    match snapshot {
        Some(task) => {
            shared.observers.emit(&TaskEvent::Success(task.clone(), payload));
            shared.observers.emit(&TaskEvent::Finish(task));
        }
        None => warn!(task_id = %id, "slot claimed after the task was stopped"),
    }
    shared.idle.notify_waiters();
}

async fn fail_run(shared: &Shared, id: TaskId, run: u64, error: TaskError) {
    let now = shared.parts.clock.now();
    let message = error.to_string();
    let snapshot = shared
        .settle_run(id, run, |task| task.mark_failed(message, now).then(|| task.clone()))
        .await
        .flatten();

    if let Some(task) = snapshot {
        shared.observers.emit(&TaskEvent::Error(task.clone(), error));
        shared.observers.emit(&TaskEvent::Finish(task));
    }
    shared.idle.notify_waiters();
}
