use std::{path::PathBuf, time::Instant};

use clap::Parser;
use log::info;

use crate::{
    app::{
        aggregate::{remove_job_dirs, report_failures, AggregateOptions, Aggregator},
        console::Console,
        setup::{plan_jobs, resolve_limit, Instrument},
    },
    manager::{
        monitor::{format_hms, MonitorLoop},
        pool::{Pool, PoolConfig},
    },
    models::job::JobState,
    worker::job_kind::SimulationJob,
};

/// Run several copies of a compiled simulation instrument in parallel processes.
///
/// Either the same simulation is repeated (`-t`) for better statistics, or each
/// process gets its own parameters from one row of a CSV file (`-c`).
#[derive(Parser, Debug)]
#[command(name = "mxpool")]
#[command(version)]
pub struct Args {
    /// Instrument file passed to the simulation translator
    pub sim_file: PathBuf,

    /// Number of events per process
    #[arg(short = 'n', long, default_value = "100000000")]
    pub n_events: u64,

    /// Put all data files into one directory with this name
    #[arg(short = 'd', long)]
    pub dir: Option<PathBuf>,

    /// Remove the directories of finished simulations
    #[arg(short = 'r', long)]
    pub remove: bool,

    /// Concatenate all data files into one output file with this name
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Prefix for generated data file names
    #[arg(short = 'e', long, default_value = "sim_data_")]
    pub prefix: String,

    /// Additional command line arguments passed to every simulation
    #[arg(short = 'a', long, allow_hyphen_values = true)]
    pub additional: Option<String>,

    /// CSV file with one row of simulation parameters per process
    #[arg(short = 'c', long, conflicts_with = "t_process")]
    pub csv_input: Option<PathBuf>,

    /// Total number of processes to run (default: same as n-process)
    #[arg(short = 't', long)]
    pub t_process: Option<usize>,

    /// Number of processes to run concurrently (default: number of CPU cores)
    #[arg(short = 'p', long)]
    pub n_process: Option<usize>,

    /// Seconds between runs of the monitoring loop
    #[arg(short = 's', long, default_value = "1.0")]
    pub sleep_sec: f64,

    /// Echo commands and raw simulation output
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Use the existing executable instead of recompiling the instrument
    #[arg(long)]
    pub skip_compile: bool,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let started = Instant::now();
    let mut console = Console::stdout();

    let mut limit = resolve_limit(args.n_process)?;
    let jobs = plan_jobs(
        args.csv_input.as_deref(),
        args.t_process,
        limit,
        &args.prefix,
    )?;
    if jobs.len() < limit {
        limit = jobs.len();
        console.print(
            "Changed n_process = t_process as t_process < n_process OR rows in CSV file < n_process",
        );
    }
    let config = PoolConfig::new(limit, args.sleep_sec, args.verbose)?;
    info!("{} job(s), {} at a time", jobs.len(), config.limit);

    let instrument = Instrument::new(&args.sim_file);
    let kind = SimulationJob::new(
        instrument.launcher(),
        args.n_events,
        args.additional.as_deref(),
    )?;
    let total = jobs.len();
    let mut pool = Pool::new(kind, jobs, config, console);

    // Stale output from an earlier run would be mistaken for this run's artifacts.
    let records = pool.records();
    remove_job_dirs(&records, JobState::Waiting, pool.console_mut())?;
    if !args.skip_compile {
        instrument.compile()?;
    }

    pool.start();
    let monitor = MonitorLoop::new(pool.config().interval, total, pool.config().limit);
    monitor.run(&mut pool);

    let records = pool.records();
    let mut console = pool.into_console();
    let aggregator = Aggregator::new(AggregateOptions {
        output: args.output,
        final_dir: args.dir,
        remove: args.remove,
        strict: args.csv_input.is_some(),
    });
    report_failures(&records, &mut console);
    let report = aggregator.run(&records, &mut console)?;
    info!(
        "Concatenated {} file(s), copied {}, removed {} dir(s), {} integrity error(s)",
        report.concatenated.len(),
        report.copied.len(),
        report.removed.len(),
        report.integrity_errors.len()
    );

    console.print(format!(
        "\nTotal time elapsed: {} hours:minutes:seconds",
        format_hms(started.elapsed().as_secs_f64())
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["mxpool", "beam.instr"]).unwrap();
        assert_eq!(args.sim_file, PathBuf::from("beam.instr"));
        assert_eq!(args.n_events, 100_000_000);
        assert_eq!(args.prefix, "sim_data_");
        assert_eq!(args.sleep_sec, 1.0);
        assert!(args.n_process.is_none());
        assert!(!args.verbose && !args.remove && !args.skip_compile);
    }

    #[test]
    fn test_csv_and_total_conflict() {
        let result = Args::try_parse_from(["mxpool", "beam.instr", "-c", "jobs.csv", "-t", "4"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_short_flags() {
        let args = Args::try_parse_from([
            "mxpool", "beam.instr", "-p", "3", "-t", "9", "-s", "0.5", "-o", "all.dat", "-d",
            "final", "-r", "-v", "-a", "-g --seed=3",
        ])
        .unwrap();
        assert_eq!(args.n_process, Some(3));
        assert_eq!(args.t_process, Some(9));
        assert_eq!(args.sleep_sec, 0.5);
        assert_eq!(args.output, Some(PathBuf::from("all.dat")));
        assert_eq!(args.dir, Some(PathBuf::from("final")));
        assert!(args.remove && args.verbose);
        assert_eq!(args.additional.as_deref(), Some("-g --seed=3"));
    }

    #[test]
    fn test_invalid_limit_stops_before_any_job() {
        let args = Args::try_parse_from(["mxpool", "beam.instr", "-p", "0", "--skip-compile"]).unwrap();
        let err = run(args).unwrap_err();
        assert!(err.to_string().contains("concurrency limit"));
    }

    #[test]
    fn test_zero_jobs_is_reported_as_such() {
        let args =
            Args::try_parse_from(["mxpool", "beam.instr", "-p", "2", "-t", "0", "--skip-compile"])
                .unwrap();
        let err = run(args).unwrap_err();
        assert_eq!(err.to_string(), "no jobs to run");
    }
}
