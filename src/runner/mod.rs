//! Running external programs
//!
//! Commands run one at a time and block until the program exits. A run only
//! counts as successful when the program exits with status zero and the file
//! it was asked to produce exists.

use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::command::CommandLine;
use crate::io::IoError;
use crate::job::JobError;
use crate::paths::PathError;
use crate::results::ParseError;
use crate::scoring::ScoringError;

/// Errors that can occur while running a job
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Could not start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("External process failed ({}): {command}", failure_reason(.code, .missing))]
    ExternalProcess {
        command: String,
        code: Option<i32>,
        missing: Option<PathBuf>,
    },

    #[error("{0} is not set in the plugin configuration")]
    NotConfigured(&'static str),

    #[error("Input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("No poses selected")]
    NoPoses,

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("IO error: {0}")]
    File(#[from] std::io::Error),
}

fn failure_reason(code: &Option<i32>, missing: &Option<PathBuf>) -> String {
    match (code, missing) {
        (_, Some(path)) => format!("no output at {}", path.display()),
        (Some(code), None) => format!("exit code {}", code),
        (None, None) => "terminated by signal".to_string(),
    }
}

/// How a finished program exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStatus {
    /// Exit code; `None` if the program was killed by a signal
    pub code: Option<i32>,
}

impl ProcessStatus {
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs one command line to completion
pub trait Executor {
    fn execute(&mut self, command: &CommandLine) -> Result<ProcessStatus, RunError>;
}

/// Runs commands as child processes of this one
#[derive(Debug, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for ProcessExecutor {
    fn execute(&mut self, command: &CommandLine) -> Result<ProcessStatus, RunError> {
        let tokens = command.tokens();
        let (program, args) = tokens.split_first().ok_or_else(|| RunError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;

        info!("Running: {}", command);
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|source| RunError::Spawn {
                program: program.to_string(),
                source,
            })?;
        debug!("{} exited with {:?}", program, status.code());

        Ok(ProcessStatus {
            code: status.code(),
        })
    }
}

/// Check that a run exited cleanly and left `artifact` behind
pub fn expect_artifact(
    command: &CommandLine,
    status: ProcessStatus,
    artifact: &Path,
) -> Result<(), RunError> {
    let missing = (!artifact.is_file()).then(|| artifact.to_path_buf());
    if status.is_success() && missing.is_none() {
        return Ok(());
    }
    Err(RunError::ExternalProcess {
        command: command.to_string(),
        code: status.code,
        missing,
    })
}
