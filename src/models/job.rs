use std::{fmt, path::PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub index: usize,
    /// One `key=value` argument each.
    pub params: Vec<String>,
    pub filename: String,
    pub dir: PathBuf,
}

impl JobDescriptor {
    pub fn new(index: usize, params: Vec<String>, filename: String, dir: PathBuf) -> Self {
        Self {
            index,
            params,
            filename,
            dir,
        }
    }

    pub fn from_filename(index: usize, params: Vec<String>, filename: String) -> Self {
        let dir = PathBuf::from(filename.replace('.', "_"));
        Self::new(index, params, filename, dir)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Waiting,
    Running,
    Finish,
    Error,
}

impl JobState {
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Waiting, JobState::Running)
                | (JobState::Waiting, JobState::Error)
                | (JobState::Running, JobState::Finish)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Waiting => write!(f, "WAITING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Finish => write!(f, "FINISH"),
            JobState::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub descriptor: JobDescriptor,
    pub state: JobState,
    /// `None` if the job never ran or was ended by a signal.
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn artifact_path(&self) -> PathBuf {
        self.descriptor.artifact_path()
    }
}
