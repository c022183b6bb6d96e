use std::path::PathBuf;

use log::debug;

use crate::{
    models::{
        error::ConfigError,
        job::{JobDescriptor, JobState},
    },
    worker::progress::{self, ProgressUpdate},
};

/// What a concrete kind of job has to provide for the pool to run it.
pub trait JobKind {
    /// Program followed by its arguments.
    fn command(&self, job: &JobDescriptor) -> Vec<String>;

    fn interpret(&self, line: &str) -> Option<ProgressUpdate>;

    fn on_transition(&self, _job: &JobDescriptor, _from: JobState, _to: JobState) {}
}

#[derive(Debug, Clone)]
pub struct SimulationJob {
    executable: PathBuf,
    n_events: u64,
    additional: Vec<String>,
}

impl SimulationJob {
    /// `additional` is split like a shell would, so quoted values stay one argument.
    pub fn new(
        executable: PathBuf,
        n_events: u64,
        additional: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let additional = match additional {
            Some(extra) => shlex::split(extra)
                .ok_or_else(|| ConfigError::InvalidArguments(extra.to_string()))?,
            None => Vec::new(),
        };
        Ok(Self {
            executable,
            n_events,
            additional,
        })
    }
}

impl JobKind for SimulationJob {
    /// `<exe> [additional] -n <events> -d <dir> filename=<dir>/<file> [key=value...]`
    fn command(&self, job: &JobDescriptor) -> Vec<String> {
        let mut command = vec![self.executable.display().to_string()];
        command.extend(self.additional.iter().cloned());
        command.push("-n".to_string());
        command.push(self.n_events.to_string());
        command.push("-d".to_string());
        command.push(job.dir.display().to_string());
        command.push(format!("filename={}", job.artifact_path().display()));
        command.extend(job.params.iter().cloned());
        command
    }

    fn interpret(&self, line: &str) -> Option<ProgressUpdate> {
        progress::parse_line(line)
    }

    fn on_transition(&self, job: &JobDescriptor, from: JobState, to: JobState) {
        debug!("Job {} ({}): {} -> {}", job.index, job.filename, from, to);
    }
}
