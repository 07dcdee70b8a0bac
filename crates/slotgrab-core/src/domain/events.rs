//! Events - タスクのライフサイクルイベント
//!
//! どのイベントもタスクのスナップショットを運ぶ。
//! Success は結果ペイロード、Error はエラーを追加で持つ。

use super::errors::TaskError;
use super::outcome::GrabSuccess;
use super::task::GrabTask;

/// The five event classes observers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Update,
    Success,
    Error,
    Finish,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Start,
        EventKind::Update,
        EventKind::Success,
        EventKind::Error,
        EventKind::Finish,
    ];
}

#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Admitted by `start_task`.
    Start(GrabTask),

    /// Progress: Waiting -> Running, or an attempt that did not succeed.
    Update(GrabTask),

    Success(GrabTask, GrabSuccess),

    Error(GrabTask, TaskError),

    /// Emitted once per run, whatever the outcome.
    Finish(GrabTask),
}

impl TaskEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TaskEvent::Start(_) => EventKind::Start,
            TaskEvent::Update(_) => EventKind::Update,
            TaskEvent::Success(..) => EventKind::Success,
            TaskEvent::Error(..) => EventKind::Error,
            TaskEvent::Finish(_) => EventKind::Finish,
        }
    }

    pub fn task(&self) -> &GrabTask {
        match self {
            TaskEvent::Start(task)
            | TaskEvent::Update(task)
            | TaskEvent::Success(task, _)
            | TaskEvent::Error(task, _)
            | TaskEvent::Finish(task) => task,
        }
    }
}
