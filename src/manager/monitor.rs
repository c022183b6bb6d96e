use std::time::Duration;

use crossbeam_channel::tick;
use log::debug;

use crate::{manager::pool::Pool, models::stats::PoolStats, worker::job_kind::JobKind};

/// Drives the pool one tick per interval until every job is FINISH or ERROR.
pub struct MonitorLoop {
    interval: Duration,
    // Zero padding widths.
    total_width: usize,
    running_width: usize,
}

impl MonitorLoop {
    pub fn new(interval: Duration, total_jobs: usize, limit: usize) -> Self {
        Self {
            interval,
            total_width: digits(total_jobs),
            running_width: digits(limit),
        }
    }

    pub fn run<K: JobKind>(&self, pool: &mut Pool<K>) -> PoolStats {
        pool.console_mut().print(
            "Average of the estimated run time (running) and actual finish time (finished) \
             are in the form (hours:minutes:seconds)\n",
        );

        let ticker = tick(self.interval);
        let mut stats = pool.stats();
        let mut ticks = 0u64;
        while !pool.is_done() {
            if ticker.recv().is_err() {
                break;
            }
            stats = pool.tick();
            ticks += 1;
            let line = self.render(&stats);
            pool.console_mut().status(line);
        }
        if ticks == 0 {
            let line = self.render(&stats);
            pool.console_mut().status(line);
        }
        // Keep later messages from landing on the status line.
        pool.console_mut().newline();
        debug!("Monitor loop ended after {} tick(s)", ticks);
        stats
    }

    pub fn render(&self, stats: &PoolStats) -> String {
        format!(
            "  {:0tw$} waiting, {:0rw$} running {:02}% ({}), {:0tw$} finished ({}), {:0tw$} errors",
            stats.waiting,
            stats.running,
            stats.avg_percent.round() as u64,
            format_hms(stats.avg_eta),
            stats.finished,
            format_hms(stats.avg_elapsed),
            stats.errors,
            tw = self.total_width,
            rw = self.running_width,
        )
    }
}

fn digits(n: usize) -> usize {
    n.max(1).to_string().len()
}

pub fn format_hms(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
