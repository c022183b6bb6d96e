use std::{
    collections::HashSet,
    fs,
    io::Read,
    path::{Path, PathBuf},
    process::Command,
    thread,
};

use log::{debug, info};

use crate::models::{
    error::{CompileError, ConfigError},
    job::JobDescriptor,
};

const FILENAME_COLUMN: &str = "filename";

pub fn descriptors_from_count(count: usize, prefix: &str) -> Vec<JobDescriptor> {
    (0..count)
        .map(|i| JobDescriptor::from_filename(i, Vec::new(), format!("{}{}.dat", prefix, i + 1)))
        .collect()
}

/// One job per CSV row. The `filename` column names the artifact and must be
/// unique; every other column becomes a `key=value` parameter.
pub fn descriptors_from_csv<R: Read>(input: R) -> Result<Vec<JobDescriptor>, ConfigError> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers()?.clone();
    let filename_col = headers.iter().position(|h| h == FILENAME_COLUMN);

    let mut seen = HashSet::new();
    let mut jobs = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let filename = filename_col
            .and_then(|col| record.get(col))
            .filter(|name| !name.is_empty())
            .ok_or(ConfigError::MissingFilenameColumn { row: index + 1 })?
            .to_string();
        if !seen.insert(filename.clone()) {
            return Err(ConfigError::DuplicateFilename(filename));
        }

        let params = headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(col, _)| Some(*col) != filename_col)
            .map(|(_, (key, value))| format!("{}={}", key, value))
            .collect();
        jobs.push(JobDescriptor::from_filename(index, params, filename));
    }

    if jobs.is_empty() {
        return Err(ConfigError::EmptyCsv);
    }
    debug!("Read {} job(s) from CSV", jobs.len());
    Ok(jobs)
}

pub fn descriptors_from_csv_file(path: &Path) -> Result<Vec<JobDescriptor>, ConfigError> {
    descriptors_from_csv(fs::File::open(path)?)
}

/// Without a CSV file or a total count, one job per concurrency slot is run.
pub fn plan_jobs(
    csv: Option<&Path>,
    total: Option<usize>,
    limit: usize,
    prefix: &str,
) -> Result<Vec<JobDescriptor>, ConfigError> {
    match (csv, total) {
        (Some(_), Some(_)) => Err(ConfigError::ConflictingInputs),
        (Some(path), None) => descriptors_from_csv_file(path),
        (None, Some(0)) => Err(ConfigError::NoJobs),
        (None, total) => Ok(descriptors_from_count(total.unwrap_or(limit), prefix)),
    }
}

pub fn resolve_limit(requested: Option<usize>) -> Result<usize, ConfigError> {
    let limit = match requested {
        Some(limit) => limit,
        None => thread::available_parallelism().map(usize::from).unwrap_or(1),
    };
    if limit < 1 {
        return Err(ConfigError::InvalidConcurrency(limit));
    }
    Ok(limit)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub source: PathBuf,
    pub c_file: PathBuf,
    pub executable: PathBuf,
}

impl Instrument {
    pub fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            c_file: source.with_extension("c"),
            executable: source.with_extension("out"),
        }
    }

    /// The executable as a command: relative paths are anchored to the current directory.
    pub fn launcher(&self) -> PathBuf {
        if self.executable.is_absolute() || self.executable.starts_with(".") {
            self.executable.clone()
        } else {
            Path::new(".").join(&self.executable)
        }
    }

    pub fn compile(&self) -> Result<(), CompileError> {
        for stale in [&self.c_file, &self.executable] {
            if stale.exists() {
                fs::remove_file(stale).map_err(|source| CompileError::Io {
                    tool: "rm".to_string(),
                    source,
                })?;
            }
        }

        info!("Translating {}", self.source.display());
        run_tool(Command::new("mcxtrace").arg(&self.source), "mcxtrace", &self.source)?;

        info!("Compiling {}", self.c_file.display());
        run_tool(
            Command::new("gcc")
                .arg("-o")
                .arg(&self.executable)
                .arg(&self.c_file)
                .args(["-lm", "-g", "-O2", "-lm", "-std=c99"]),
            "gcc",
            &self.c_file,
        )
    }
}

fn run_tool(command: &mut Command, tool: &str, input: &Path) -> Result<(), CompileError> {
    let output = command.output().map_err(|source| CompileError::Io {
        tool: tool.to_string(),
        source,
    })?;
    if !output.status.success() {
        return Err(CompileError::Failed {
            tool: tool.to_string(),
            input: input.display().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}
