use thiserror::Error;

/// Misuse and lifecycle errors raised by the promise machinery itself.
///
/// These travel as the rejection reason (wrapped in [`anyhow::Error`]), so
/// callers recover them with `err.downcast_ref::<PromiseError>()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromiseError {
    /// The completion gate was dropped without `resolve` or `reject` being
    /// called. The executor must call one of them.
    #[error("executor must call resolve or reject before dropping its completion")]
    Abandoned,
    /// A second settle attempt on the same gate.
    #[error("promise already settled")]
    AlreadySettled,
    /// A continuation handler panicked.
    #[error("continuation handler panicked: {message}")]
    HandlerPanicked { message: String },
    /// `Promise::race` was given no inputs.
    #[error("race over an empty set of promises never settles")]
    EmptyRace,
}

/// Why a [`Schedule`](crate::Schedule) implementation refused a task.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("worker pool has been shut down")]
    ShutDown,
    #[error("looper is no longer running")]
    Disconnected,
    #[error("worker pool queue is full")]
    QueueFull,
    #[error("failed to spawn worker thread")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid runtime config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unknown metadata key `{0}`")]
    UnknownKey(String),
    #[error("metadata key `{key}` has invalid value `{value}`")]
    InvalidValue { key: String, value: String },
    #[error("{0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("model `{0}` is not registered")]
    UnknownModel(String),
    #[error("foreign key cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<&'static str> },
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "(non-string panic)".to_owned()
    }
}
