use std::{fs, io, path::PathBuf};

use anyhow::Context;
use log::{debug, error};

use crate::{
    app::console::Console,
    models::{
        error::IntegrityError,
        job::{JobRecord, JobState},
    },
};

#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub output: Option<PathBuf>,
    pub final_dir: Option<PathBuf>,
    pub remove: bool,
    /// Any integrity error skips concatenation, copying and removal.
    pub strict: bool,
}

impl AggregateOptions {
    pub fn is_requested(&self) -> bool {
        self.output.is_some() || self.final_dir.is_some() || self.remove
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AggregateReport {
    pub integrity_errors: Vec<IntegrityError>,
    pub concatenated: Vec<usize>,
    pub copied: Vec<usize>,
    pub removed: Vec<usize>,
}

pub struct Aggregator {
    options: AggregateOptions,
}

impl Aggregator {
    pub fn new(options: AggregateOptions) -> Self {
        Self { options }
    }

    pub fn run(&self, jobs: &[JobRecord], console: &mut Console) -> anyhow::Result<AggregateReport> {
        let mut report = AggregateReport::default();
        if !self.options.is_requested() {
            return Ok(report);
        }

        let mut ordered: Vec<&JobRecord> = jobs.iter().collect();
        ordered.sort_by_key(|job| job.descriptor.index);

        let mut verified = Vec::new();
        for job in ordered.iter().filter(|job| job.state == JobState::Finish) {
            match verify(job) {
                Ok(()) => verified.push(*job),
                Err(e) => {
                    error!("Job {}: {}", job.descriptor.index, e);
                    console.print(format!("ERROR {}", e));
                    report.integrity_errors.push(e);
                }
            }
        }

        if self.options.strict && !report.integrity_errors.is_empty() {
            console.print("Skipping concatenation, copy and removal: fix the missing files above first");
            return Ok(report);
        }

        if let Some(output) = &self.options.output {
            console.print(format!(
                "\nConcatenate output files into one file called '{}' ...",
                output.display()
            ));
            let mut sink = fs::File::create(output)
                .with_context(|| format!("creating {}", output.display()))?;
            for job in &verified {
                console.print(format!(
                    "Add file '{}' from dir '{}'",
                    job.descriptor.filename,
                    job.descriptor.dir.display()
                ));
                let path = job.artifact_path();
                let mut source = fs::File::open(&path)
                    .with_context(|| format!("opening {}", path.display()))?;
                io::copy(&mut source, &mut sink)
                    .with_context(|| format!("appending {}", path.display()))?;
                report.concatenated.push(job.descriptor.index);
            }
        }

        if let Some(final_dir) = &self.options.final_dir {
            console.print("\nProcess and clean up the directories ...");
            fs::create_dir_all(final_dir)
                .with_context(|| format!("creating {}", final_dir.display()))?;
            for job in &verified {
                console.print(format!(
                    "Copy file '{}' from dir '{}' to dir '{}'",
                    job.descriptor.filename,
                    job.descriptor.dir.display(),
                    final_dir.display()
                ));
                let target = final_dir.join(&job.descriptor.filename);
                fs::copy(job.artifact_path(), &target)
                    .with_context(|| format!("copying to {}", target.display()))?;
                report.copied.push(job.descriptor.index);
            }
        }

        if self.options.remove {
            report.removed = remove_job_dirs(jobs, JobState::Finish, console)?;
        }

        Ok(report)
    }
}

/// Lists jobs that could not start or exited with a nonzero code. Returns how many.
///
/// A nonzero exit still counts as FINISH; its artifact is verified like any other.
pub fn report_failures(jobs: &[JobRecord], console: &mut Console) -> usize {
    let mut failures = 0;
    for job in jobs {
        let message = match (job.state, &job.error, job.exit_code) {
            (JobState::Error, Some(error), _) => format!("failed to start: {}", error),
            (JobState::Error, None, _) => "failed to start".to_string(),
            (JobState::Finish, _, Some(code)) if code != 0 => format!("exited with code {}", code),
            (JobState::Finish, _, None) => "was terminated by a signal".to_string(),
            _ => continue,
        };
        failures += 1;
        console.print(format!(
            "WARNING job {} ('{}') {}",
            job.descriptor.index, job.descriptor.filename, message
        ));
    }
    failures
}

fn verify(job: &JobRecord) -> Result<(), IntegrityError> {
    let path = job.artifact_path();
    if path.is_file() {
        Ok(())
    } else {
        Err(IntegrityError::MissingArtifact(path))
    }
}

pub fn remove_job_dirs(
    jobs: &[JobRecord],
    state: JobState,
    console: &mut Console,
) -> anyhow::Result<Vec<usize>> {
    console.print("\nRemove data directories ...");
    let mut removed = Vec::new();
    for job in jobs.iter().filter(|job| job.state == state) {
        let dir = &job.descriptor.dir;
        if dir.is_dir() {
            console.print(format!("Remove dir '{}'", dir.display()));
            fs::remove_dir_all(dir).with_context(|| format!("removing {}", dir.display()))?;
            removed.push(job.descriptor.index);
        } else {
            debug!("No directory to remove for job {}", job.descriptor.index);
        }
    }
    Ok(removed)
}
