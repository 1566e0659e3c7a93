use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("dump command is empty")]
    EmptyCommand,
    #[error("dump program `{program}` not found")]
    ProgramNotFound {
        program: String,
        #[source]
        source: which::Error,
    },
    #[error("create dump output {}", .path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("waiting for `{program}`")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with status {code}: {stderr}")]
    Exited {
        program: String,
        code: i32,
        stderr: String,
    },
    #[error("`{program}` was terminated by a signal: {stderr}")]
    Terminated { program: String, stderr: String },
    #[error("`{program}` did not finish within {limit:?}")]
    TimedOut { program: String, limit: Duration },
}
