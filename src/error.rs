use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// The external orchestration command ran but exited non-zero.
    #[error("'{command}' failed{}: {stderr}", .exit_code.map(|c| format!(" (exit code {})", c)).unwrap_or_default())]
    #[diagnostic(
        code(converge::backend::command),
        help("Check that the orchestration tool is installed and the environment is reachable")
    )]
    CommandFailed {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// The command binary couldn't be executed at all (not in PATH, permission denied).
    #[error("Failed to execute '{command}': {source}")]
    #[diagnostic(code(converge::backend::exec))]
    ExecFailed {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A polling deadline elapsed before the target state was observed.
    #[error("Timed out waiting for {operation} (last observed state: {state})")]
    #[diagnostic(
        code(converge::backend::timeout),
        help("The backend may be slow to converge. Increase the timeout or inspect `converge status`")
    )]
    Timeout { operation: String, state: String },

    /// Bootstrap reached a known error state while polling.
    #[error("Bootstrap failed with state {0}")]
    #[diagnostic(code(converge::backend::bootstrap))]
    BootstrapFailed(String),

    /// Requested service, unit, machine, or environment does not exist.
    #[error("Unknown entity: {0}")]
    #[diagnostic(
        code(converge::entity::unknown),
        help("List what the backend knows about with `converge status`")
    )]
    UnknownEntity(String),

    #[error("Malformed unit name '{0}' (expected \"<service>/<ordinal>\")")]
    #[diagnostic(code(converge::unit::name))]
    MalformedUnitName(String),

    /// Dispatch of a lifecycle event with no registered handler.
    #[error("No handler for hook '{0}'")]
    #[diagnostic(
        code(converge::hook::unknown),
        help("Implement the matching Charm method, or check the event name for typos")
    )]
    UnknownHook(String),

    /// An agent-side helper was invoked without a live agent.
    #[error("Agent operation '{0}' is unavailable in standalone mode")]
    #[diagnostic(code(converge::hook::standalone))]
    AgentUnavailable(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(converge::config::invalid))]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::CommandFailed { command, .. } => Some(format!(
                "Run the command by hand to inspect the full output:\n    {}",
                command
            )),
            Error::ExecFailed { command, .. } => Some(format!(
                "Check that '{}' is installed and on PATH",
                command.split_whitespace().next().unwrap_or(command)
            )),
            Error::Timeout { .. } => {
                Some("Re-run with a larger --timeout, or check the backend's own logs".to_string())
            }
            Error::UnknownEntity(_) => {
                Some("Check available services and machines with: converge status".to_string())
            }
            Error::Config(_) => {
                Some("Validate the environments file and the service configuration".to_string())
            }
            _ => None,
        }
    }
}
