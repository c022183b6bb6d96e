use std::{io, path::PathBuf};

/// Problems with the run's inputs. Always reported before any job starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("concurrency limit must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    #[error("monitor interval must be a finite, non-negative number of seconds, got {0}")]
    InvalidInterval(f64),

    #[error("filename '{0}' appears more than once; each CSV row needs a unique filename")]
    DuplicateFilename(String),

    #[error("CSV row {row} has no 'filename' value; a 'filename' column is required")]
    MissingFilenameColumn { row: usize },

    #[error("cannot split arguments '{0}': unbalanced quotes")]
    InvalidArguments(String),

    #[error("no jobs to run")]
    NoJobs,

    #[error("a CSV file and a total process count cannot both be given")]
    ConflictingInputs,

    #[error("CSV file contains no job rows")]
    EmptyCsv,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A job's child process could not be created. Only that job is affected.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("job command is empty")]
    EmptyCommand,

    #[error("failed to create output pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error("{source} while running '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("{} is not a valid file", .0.display())]
    MissingArtifact(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("'{tool}' failed on {input}:\n{stderr}")]
    Failed {
        tool: String,
        input: String,
        stderr: String,
    },

    #[error("could not run '{tool}': {source}")]
    Io {
        tool: String,
        #[source]
        source: io::Error,
    },
}
