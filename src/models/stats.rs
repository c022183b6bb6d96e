use std::time::Duration;

use super::job::JobState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobProgress {
    pub state: JobState,
    pub percent: u8,
    /// Seconds remaining; 0 means unknown.
    pub eta: f64,
    pub elapsed: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    pub waiting: usize,
    pub running: usize,
    pub finished: usize,
    pub errors: usize,
    /// Mean percent over all running jobs.
    pub avg_percent: f64,
    /// Mean ETA over running jobs that have reported one.
    pub avg_eta: f64,
    pub avg_elapsed: f64,
}

impl PoolStats {
    pub fn collect(jobs: impl IntoIterator<Item = JobProgress>) -> Self {
        let mut stats = PoolStats::default();
        let mut percent_sum = 0.0;
        let mut eta_sum = 0.0;
        let mut eta_count = 0usize;
        let mut elapsed_sum = 0.0;

        for job in jobs {
            match job.state {
                JobState::Waiting => stats.waiting += 1,
                JobState::Running => {
                    stats.running += 1;
                    percent_sum += f64::from(job.percent);
                    if job.eta > 0.0 {
                        eta_count += 1;
                        eta_sum += job.eta;
                    }
                }
                JobState::Finish => {
                    stats.finished += 1;
                    elapsed_sum += job.elapsed.map(|d| d.as_secs_f64()).unwrap_or(0.0);
                }
                JobState::Error => stats.errors += 1,
            }
        }

        stats.avg_percent = mean(percent_sum, stats.running);
        stats.avg_eta = mean(eta_sum, eta_count);
        stats.avg_elapsed = mean(elapsed_sum, stats.finished);
        stats
    }

    pub fn is_done(&self) -> bool {
        self.waiting == 0 && self.running == 0
    }
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
