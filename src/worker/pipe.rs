//! Merged, non-blocking output stream of a child process.

use std::{
    fs::File,
    io::{self, Read},
    os::fd::{FromRawFd, OwnedFd},
    process::Stdio,
};

const READ_CHUNK: usize = 4096;

/// Read end of a pipe that a child writes both stdout and stderr into.
///
/// `read_lines` never blocks. It returns only newline-terminated lines; a
/// trailing partial line stays buffered until the rest of it arrives, or is
/// returned as-is once the writer side has closed.
pub struct OutputPipe {
    reader: File,
    pending: Vec<u8>,
    closed: bool,
}

impl OutputPipe {
    /// Creates the pipe and returns the write end for the child.
    pub fn new() -> io::Result<(OutputPipe, OwnedFd)> {
        let fds = cloexec_pipe()?;
        let (read_fd, write_fd) = unsafe {
            (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))
        };
        set_fd_flag(fds[0], libc::F_GETFL, libc::F_SETFL, libc::O_NONBLOCK)?;

        let pipe = OutputPipe {
            reader: File::from(read_fd),
            pending: Vec::new(),
            closed: false,
        };
        Ok((pipe, write_fd))
    }

    /// Stdout and stderr handles sharing one write end.
    pub fn child_stdio(write_end: OwnedFd) -> io::Result<(Stdio, Stdio)> {
        let stderr = write_end.try_clone()?;
        Ok((Stdio::from(write_end), Stdio::from(stderr)))
    }

    /// Drains whatever is currently readable and splits it into complete lines.
    pub fn read_lines(&mut self) -> io::Result<Vec<String>> {
        let mut chunk = [0u8; READ_CHUNK];
        while !self.closed {
            match self.reader.read(&mut chunk) {
                Ok(0) => self.closed = true,
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&raw));
        }
        if self.closed && !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            lines.push(decode_line(&raw));
        }
        Ok(lines)
    }
}

// Neither end may leak into other children, or end-of-file never arrives.
#[cfg(target_os = "linux")]
fn cloexec_pipe() -> io::Result<[libc::c_int; 2]> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(fds)
}

#[cfg(not(target_os = "linux"))]
fn cloexec_pipe() -> io::Result<[libc::c_int; 2]> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    for fd in fds {
        if let Err(e) = set_fd_flag(fd, libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC) {
            unsafe {
                libc::close(fds[0]);
                libc::close(fds[1]);
            }
            return Err(e);
        }
    }
    Ok(fds)
}

fn set_fd_flag(
    fd: libc::c_int,
    get: libc::c_int,
    set: libc::c_int,
    flag: libc::c_int,
) -> io::Result<()> {
    unsafe {
        let current = libc::fcntl(fd, get);
        if current == -1 || libc::fcntl(fd, set, current | flag) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn decode_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.trim_end_matches(&['\n', '\r'][..]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_pipe_does_not_block() {
        let (mut pipe, _write_end) = OutputPipe::new().unwrap();
        assert!(pipe.read_lines().unwrap().is_empty());
        assert!(!pipe.closed);
    }

    #[test]
    fn test_partial_line_waits_for_terminator() {
        let (mut pipe, write_end) = OutputPipe::new().unwrap();
        let mut writer = File::from(write_end);

        writer.write_all(b"12 \nTrace ETA 53 [s] % 2").unwrap();
        assert_eq!(pipe.read_lines().unwrap(), vec!["12 ".to_string()]);
        assert!(pipe.read_lines().unwrap().is_empty());

        writer.write_all(b"0 30\r\nlast").unwrap();
        assert_eq!(
            pipe.read_lines().unwrap(),
            vec!["Trace ETA 53 [s] % 20 30".to_string()]
        );

        drop(writer);
        assert_eq!(pipe.read_lines().unwrap(), vec!["last".to_string()]);
        assert!(pipe.closed);
        assert!(pipe.read_lines().unwrap().is_empty());
    }

    #[test]
    fn test_stdout_and_stderr_share_stream() {
        let (mut pipe, write_end) = OutputPipe::new().unwrap();
        let (stdout, stderr) = OutputPipe::child_stdio(write_end).unwrap();
        let mut child = std::process::Command::new("sh")
            .arg("-c")
            .arg("echo out; echo err 1>&2")
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .unwrap();
        child.wait().unwrap();

        let mut lines = Vec::new();
        while !pipe.closed {
            lines.extend(pipe.read_lines().unwrap());
        }
        assert_eq!(lines, vec!["out".to_string(), "err".to_string()]);
    }
}
