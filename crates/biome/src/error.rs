use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BiomeError {
    #[error("operation canceled")]
    Canceled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("invocation has an empty argv")]
    EmptyArgv,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program}: {}", describe_exit(*code))]
    Exit { program: String, code: Option<i32> },

    /// A failed command together with the combined output it produced.
    #[error("{source}\n{output}")]
    Command {
        #[source]
        source: Box<BiomeError>,
        output: String,
    },

    #[error("container runtime {runtime} {operation} failed: {message}")]
    Runtime {
        runtime: String,
        operation: String,
        message: String,
    },

    #[error("invalid environment: {message}")]
    InvalidEnv { message: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BiomeError {
    /// True for errors caused by the context rather than the work itself.
    pub fn is_context_done(&self) -> bool {
        match self {
            BiomeError::Canceled | BiomeError::DeadlineExceeded => true,
            BiomeError::Command { source, .. } => source.is_context_done(),
            _ => false,
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}
