//! Domain model (IDs, task config, state, errors, events).
//!
//! ここには I/O も並行性も置かない。状態遷移は `GrabTask` のメソッドに閉じる。

pub mod config;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod state;
pub mod task;

pub use config::{ConfigError, StartTime, TaskConfig, TimeBucket};
pub use credentials::{Credential, CredentialSet};
pub use errors::{AttemptError, AttemptErrorKind, TaskError};
pub use events::{EventKind, TaskEvent};
pub use ids::{LoginId, TaskId};
pub use outcome::{AttemptOutcome, GrabSuccess};
pub use state::{PollPhase, TaskStatus};
pub use task::GrabTask;
