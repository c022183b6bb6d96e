use std::{
    io,
    process::{Child, Command, ExitStatus},
    time::{Duration, Instant},
};

use log::{debug, warn};

use crate::{
    app::console::Console,
    models::{
        error::SpawnError,
        job::{JobDescriptor, JobRecord, JobState},
        stats::JobProgress,
    },
    worker::{job_kind::JobKind, pipe::OutputPipe},
};

pub struct JobRunner {
    descriptor: JobDescriptor,
    state: JobState,
    process: Option<RunningProcess>,
    started: Option<Instant>,
    elapsed: Option<Duration>,
    percent: u8,
    eta: f64,
    exit_code: Option<i32>,
    error: Option<String>,
}

struct RunningProcess {
    child: Child,
    output: OutputPipe,
}

impl JobRunner {
    pub fn new(descriptor: JobDescriptor) -> Self {
        Self {
            descriptor,
            state: JobState::Waiting,
            process: None,
            started: None,
            elapsed: None,
            percent: 0,
            eta: 0.0,
            exit_code: None,
            error: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress {
            state: self.state,
            percent: self.percent,
            eta: self.eta,
            elapsed: self.elapsed,
        }
    }

    pub fn record(&self) -> JobRecord {
        JobRecord {
            descriptor: self.descriptor.clone(),
            state: self.state,
            exit_code: self.exit_code,
            error: self.error.clone(),
        }
    }

    /// Starts the child with stdout and stderr merged into one non-blocking stream.
    ///
    /// A failure moves the job to ERROR and is returned so the caller can report
    /// it; the pool keeps going either way.
    pub fn launch<K: JobKind>(
        &mut self,
        kind: &K,
        console: &mut Console,
        verbose: bool,
    ) -> Result<(), SpawnError> {
        debug_assert_eq!(self.state, JobState::Waiting);

        let argv = kind.command(&self.descriptor);
        if verbose {
            console.print(argv.join(" "));
        }

        match spawn(&argv) {
            Ok(process) => {
                self.process = Some(process);
                self.started = Some(Instant::now());
                self.transition(kind, JobState::Running);
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                self.transition(kind, JobState::Error);
                Err(e)
            }
        }
    }

    /// One non-blocking step: detect exit, then drain every complete output line.
    pub fn poll<K: JobKind>(&mut self, kind: &K, console: &mut Console, verbose: bool) {
        if self.state != JobState::Running {
            return;
        }
        let Some(process) = self.process.as_mut() else {
            return;
        };

        // A failed status check also ends the job.
        let exited: Option<io::Result<ExitStatus>> = match process.child.try_wait() {
            Ok(status) => status.map(Ok),
            Err(e) => Some(Err(e)),
        };

        let lines = match process.output.read_lines() {
            Ok(lines) => lines,
            Err(e) => {
                console.print(format!(
                    "ERROR reading output of job {} ({}): {}",
                    self.descriptor.index, self.descriptor.filename, e
                ));
                Vec::new()
            }
        };
        for line in lines {
            if verbose {
                console.print(&line);
            }
            if let Some(update) = kind.interpret(&line) {
                if let Some(eta) = update.eta {
                    self.eta = eta;
                }
                self.percent = update.percent;
            }
        }

        if let Some(exit) = exited {
            self.elapsed = self.started.map(|started| started.elapsed());
            match exit {
                Ok(status) => {
                    self.exit_code = status.code();
                    if !status.success() {
                        // Keep the log line off the status line.
                        console.newline();
                        warn!(
                            "Job {} ({}) exited with {}",
                            self.descriptor.index, self.descriptor.filename, status
                        );
                    }
                }
                Err(e) => console.print(format!(
                    "ERROR checking job {} ({}): {}",
                    self.descriptor.index, self.descriptor.filename, e
                )),
            }
            // Releases the child handle and the read end of its pipe.
            self.process = None;
            self.transition(kind, JobState::Finish);
        }
    }

    fn transition<K: JobKind>(&mut self, kind: &K, next: JobState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        let previous = self.state;
        self.state = next;
        kind.on_transition(&self.descriptor, previous, next);
    }
}

fn spawn(argv: &[String]) -> Result<RunningProcess, SpawnError> {
    let (program, args) = argv.split_first().ok_or(SpawnError::EmptyCommand)?;
    let (output, write_end) = OutputPipe::new().map_err(SpawnError::Pipe)?;
    let (stdout, stderr) = OutputPipe::child_stdio(write_end).map_err(SpawnError::Pipe)?;

    // The command, and with it the parent's copies of the write end, is dropped
    // on return so the pipe reports end-of-file once the child exits.
    let child = Command::new(program)
        .args(args)
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .map_err(|source| SpawnError::Spawn {
            command: argv.join(" "),
            source,
        })?;

    debug!("Spawned '{}' as pid {}", argv.join(" "), child.id());
    Ok(RunningProcess { child, output })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::console::testing::SharedBuffer;
    use crate::worker::progress::{self, ProgressUpdate};
    use std::thread;

    // Runs each job's params as a shell script.
    struct ShellJob;

    impl JobKind for ShellJob {
        fn command(&self, job: &JobDescriptor) -> Vec<String> {
            vec!["sh".to_string(), "-c".to_string(), job.params.join(" ")]
        }

        fn interpret(&self, line: &str) -> Option<ProgressUpdate> {
            progress::parse_line(line)
        }
    }

    fn shell_runner(script: &str) -> JobRunner {
        crate::app::logging::init_for_tests();
        JobRunner::new(JobDescriptor::from_filename(
            0,
            vec![script.to_string()],
            "job.dat".to_string(),
        ))
    }

    fn poll_until_finished(runner: &mut JobRunner, console: &mut Console, verbose: bool) {
        for _ in 0..500 {
            runner.poll(&ShellJob, console, verbose);
            if runner.state() == JobState::Finish {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("job did not finish");
    }

    #[test]
    fn test_launch_and_finish_with_progress() {
        let mut console = SharedBuffer::default().console();
        let mut runner = shell_runner("echo 'Trace ETA 7.2 [min] % 2 12 22 32 42'; echo '55 '");

        runner.launch(&ShellJob, &mut console, false).unwrap();
        assert_eq!(runner.state(), JobState::Running);

        poll_until_finished(&mut runner, &mut console, false);
        let progress = runner.progress();
        assert_eq!(progress.percent, 55);
        assert!((progress.eta - 432.0).abs() < 1e-9);
        assert!(progress.elapsed.is_some());

        let record = runner.record();
        assert_eq!(record.state, JobState::Finish);
        assert_eq!(record.exit_code, Some(0));
        assert!(record.error.is_none());
    }

    #[test]
    fn test_nonzero_exit_still_finishes() {
        let mut console = SharedBuffer::default().console();
        let mut runner = shell_runner("exit 3");

        runner.launch(&ShellJob, &mut console, false).unwrap();
        poll_until_finished(&mut runner, &mut console, false);
        assert_eq!(runner.record().exit_code, Some(3));
    }

    #[test]
    fn test_nonzero_exit_ends_status_line_first() {
        let buffer = SharedBuffer::default();
        let mut console = buffer.console();
        let mut runner = shell_runner("exit 1");

        runner.launch(&ShellJob, &mut console, false).unwrap();
        console.status("  0 waiting, 1 running");
        poll_until_finished(&mut runner, &mut console, false);

        assert!(buffer.contents().ends_with("  0 waiting, 1 running\n"));
    }

    #[test]
    fn test_failed_status_check_finishes_job() {
        let buffer = SharedBuffer::default();
        let mut console = buffer.console();
        let mut runner = shell_runner("exit 0");
        runner.launch(&ShellJob, &mut console, false).unwrap();

        // Reap the child behind the runner's back so its own status check fails.
        let pid = runner.process.as_ref().unwrap().child.id() as libc::pid_t;
        let mut status = 0;
        assert_eq!(unsafe { libc::waitpid(pid, &mut status, 0) }, pid);

        runner.poll(&ShellJob, &mut console, false);
        assert_eq!(runner.state(), JobState::Finish);
        assert_eq!(runner.record().exit_code, None);
        assert!(buffer.contents().contains("ERROR checking job 0"));
    }

    #[test]
    fn test_missing_executable_is_error() {
        struct Missing;
        impl JobKind for Missing {
            fn command(&self, _job: &JobDescriptor) -> Vec<String> {
                vec!["/nonexistent/mxpool-test-binary".to_string()]
            }
            fn interpret(&self, _line: &str) -> Option<ProgressUpdate> {
                None
            }
        }

        let mut console = SharedBuffer::default().console();
        let mut runner = shell_runner("");
        let err = runner.launch(&Missing, &mut console, false).unwrap_err();
        assert!(matches!(err, SpawnError::Spawn { .. }));
        assert_eq!(runner.state(), JobState::Error);
        assert!(runner.record().error.unwrap().contains("/nonexistent/mxpool-test-binary"));

        // Polling a terminal job does nothing.
        runner.poll(&Missing, &mut console, false);
        assert_eq!(runner.state(), JobState::Error);
    }

    #[test]
    fn test_poll_on_waiting_job_is_noop() {
        let mut console = SharedBuffer::default().console();
        let mut runner = shell_runner("true");
        runner.poll(&ShellJob, &mut console, false);
        assert_eq!(runner.state(), JobState::Waiting);
    }

    #[test]
    fn test_verbose_echoes_command_and_output() {
        let buffer = SharedBuffer::default();
        let mut console = buffer.console();
        let mut runner = shell_runner("echo hello from job");

        runner.launch(&ShellJob, &mut console, true).unwrap();
        poll_until_finished(&mut runner, &mut console, true);

        let out = buffer.contents();
        assert!(out.contains("sh -c echo hello from job"));
        assert!(out.contains("\nhello from job\n"));
    }
}
