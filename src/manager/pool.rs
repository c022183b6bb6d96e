use std::time::Duration;

use log::{debug, info};

use crate::{
    app::console::Console,
    models::{
        error::ConfigError,
        job::{JobDescriptor, JobRecord, JobState},
        stats::PoolStats,
    },
    worker::{job_kind::JobKind, runner::JobRunner},
};

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub limit: usize,
    pub interval: Duration,
    pub verbose: bool,
}

impl PoolConfig {
    pub fn new(limit: usize, interval_secs: f64, verbose: bool) -> Result<Self, ConfigError> {
        if limit < 1 {
            return Err(ConfigError::InvalidConcurrency(limit));
        }
        let interval = Duration::try_from_secs_f64(interval_secs)
            .map_err(|_| ConfigError::InvalidInterval(interval_secs))?;
        Ok(Self {
            limit,
            interval,
            verbose,
        })
    }
}

/// Ordered backlog of jobs, run at most `limit` at a time.
pub struct Pool<K: JobKind> {
    kind: K,
    runners: Vec<JobRunner>,
    config: PoolConfig,
    /// Next position to examine for a waiting job. Only moves forward.
    cursor: usize,
    console: Console,
}

impl<K: JobKind> Pool<K> {
    pub fn new(
        kind: K,
        mut descriptors: Vec<JobDescriptor>,
        config: PoolConfig,
        console: Console,
    ) -> Self {
        descriptors.sort_by_key(|job| job.index);
        Self {
            kind,
            runners: descriptors.into_iter().map(JobRunner::new).collect(),
            config,
            cursor: 0,
            console,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats::collect(self.runners.iter().map(JobRunner::progress))
    }

    pub fn is_done(&self) -> bool {
        self.stats().is_done()
    }

    pub fn start(&mut self) -> usize {
        self.console.print(format!(
            "Start initial batch of {} processes ...",
            self.config.limit
        ));
        self.fill_slots(0)
    }

    /// Admits the next waiting job. Returns false once no waiting job is left
    /// to examine. A job that fails to launch is marked ERROR without taking a slot.
    fn admit_next(&mut self, running: &mut usize) -> bool {
        while self.cursor < self.runners.len() {
            let runner = &mut self.runners[self.cursor];
            self.cursor += 1;
            if runner.state() != JobState::Waiting {
                continue;
            }

            match runner.launch(&self.kind, &mut self.console, self.config.verbose) {
                Ok(()) => *running += 1,
                Err(e) => self.console.print(format!("ERROR {}", e)),
            }
            return true;
        }
        false
    }

    /// Returns the new running count.
    pub fn fill_slots(&mut self, mut running: usize) -> usize {
        while running < self.config.limit {
            if !self.admit_next(&mut running) {
                break;
            }
        }
        running
    }

    /// Polls every job in index order, then backfills freed slots from the same
    /// snapshot. Returns the status after backfill.
    pub fn tick(&mut self) -> PoolStats {
        for runner in self.runners.iter_mut() {
            runner.poll(&self.kind, &mut self.console, self.config.verbose);
        }

        let polled = self.stats();
        let running = self.fill_slots(polled.running);
        if running > polled.running {
            debug!("Backfilled {} slot(s)", running - polled.running);
        }

        let stats = self.stats();
        debug_assert!(stats.running <= self.config.limit);
        stats
    }

    pub fn records(&self) -> Vec<JobRecord> {
        self.runners.iter().map(JobRunner::record).collect()
    }

    pub fn into_console(self) -> Console {
        info!("Pool finished with {} job(s)", self.runners.len());
        self.console
    }
}
