//! Observers - イベント種別ごとのコールバック登録と配送
//!
//! - コールバック一覧はロック下でコピーし、実行はロックの外で行う
//! - 1 つのコールバックが Err を返しても panic しても、他への配送は続ける

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use tracing::error;

use crate::domain::{EventKind, TaskEvent};

pub type ObserverResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Observer callback. Runs on whichever task emitted the event; keep it short.
pub type Callback = Arc<dyn Fn(&TaskEvent) -> ObserverResult + Send + Sync>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&TaskEvent) -> ObserverResult + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Default)]
pub struct Observers {
    callbacks: Mutex<HashMap<EventKind, Vec<Callback>>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind, callback: Callback) {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        callbacks.entry(kind).or_default().push(callback);
    }

    pub fn subscribe_all(&self, callback: Callback) {
        for kind in EventKind::ALL {
            self.subscribe(kind, Arc::clone(&callback));
        }
    }

    /// Deliver `event` to every callback registered for its kind.
    ///
    /// Returns the number of callbacks that failed.
    pub fn emit(&self, event: &TaskEvent) -> usize {
        let kind = event.kind();
        let callbacks = {
            let callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
            callbacks.get(&kind).cloned().unwrap_or_default()
        };

        let mut failures = 0;
        for cb in callbacks {
            match catch_unwind(AssertUnwindSafe(|| cb(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    error!(task_id = %event.task().id, event = ?kind, error = %err, "observer failed");
                }
                Err(_) => {
                    failures += 1;
                    error!(task_id = %event.task().id, event = ?kind, "observer panicked");
                }
            }
        }
        failures
    }
}
