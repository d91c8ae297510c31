use std::{
    io::{self, BufRead, BufReader, Read},
    process::{Child, Command, Stdio},
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

use crate::core::tooling::latin1;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cooperative yield point for a host event loop; called after every blocking
/// shell call and after every streamed line.
pub trait EventPump {
    fn yield_now(&self);
}

/// Pump for hosts without an event loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPump;

impl EventPump for NoopPump {
    fn yield_now(&self) {}
}

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("command timed out after {after:?}: {command}")]
    TimedOut { command: String, after: Duration },
    #[error("failed to start: {command}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// `true` when `err` is (or wraps) a [`ShellError::TimedOut`].
#[must_use]
pub fn is_timeout(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ShellError>(),
        Some(ShellError::TimedOut { .. })
    )
}

fn shell_command(cmd: &str) -> Command {
    let mut command = if cfg!(windows) {
        let mut command = Command::new("cmd");
        command.arg("/C");
        command
    } else {
        let mut command = Command::new("sh");
        command.arg("-c");
        command
    };
    command.arg(cmd);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command
}

fn spawn(mut command: Command, cmd: &str) -> Result<Child> {
    command.spawn().map_err(|source| {
        anyhow::Error::new(ShellError::Spawn {
            command: cmd.to_string(),
            source,
        })
    })
}

/// Runs `cmd` through the platform shell and captures its exit code and
/// output, decoded as ISO-8859-1.
///
/// # Errors
/// Returns [`ShellError::Spawn`] when the shell cannot start and
/// [`ShellError::TimedOut`] when `timeout` elapses first; the process is killed
/// in that case.
pub fn run_shell(cmd: &str, timeout: Option<Duration>, pump: &dyn EventPump) -> Result<ShellOutput> {
    debug!(cmd, ?timeout, "running shell command");
    let mut command = shell_command(cmd);
    command.stderr(Stdio::piped());
    let mut child = spawn(command, cmd)?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout missing for {cmd}"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr missing for {cmd}"))?;
    let stdout_handle = thread::spawn(move || read_latin1(stdout));
    let stderr_handle = thread::spawn(move || read_latin1(stderr));

    let status = match timeout {
        None => child
            .wait()
            .with_context(|| format!("failed to wait for {cmd}"))?,
        Some(limit) => {
            let started = Instant::now();
            loop {
                if let Some(status) = child
                    .try_wait()
                    .with_context(|| format!("failed to wait for {cmd}"))?
                {
                    break status;
                }
                if started.elapsed() >= limit {
                    terminate(&mut child, cmd);
                    pump.yield_now();
                    return Err(ShellError::TimedOut {
                        command: cmd.to_string(),
                        after: limit,
                    }
                    .into());
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    };
    let stdout = stdout_handle
        .join()
        .map_err(|_| anyhow!("stdout thread panicked"))??;
    let stderr = stderr_handle
        .join()
        .map_err(|_| anyhow!("stderr thread panicked"))??;
    pump.yield_now();
    Ok(ShellOutput {
        code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

/// Runs `cmd` with stderr merged into stdout, handing each non-blank line to
/// `on_line` as it arrives. Returns the accumulated output; the exit code is
/// not reported.
///
/// # Errors
/// Returns [`ShellError::Spawn`] when the shell cannot start and
/// [`ShellError::TimedOut`] once `deadline` passes; the process is killed in
/// that case.
pub fn run_shell_streaming(
    cmd: &str,
    deadline: Option<Instant>,
    pump: &dyn EventPump,
    on_line: &mut dyn FnMut(&str),
) -> Result<String> {
    debug!(cmd, "streaming shell command");
    let started = Instant::now();
    let mut command = shell_command(cmd);
    command.stderr(Stdio::piped());
    let mut child = spawn(command, cmd)?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout missing for {cmd}"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr missing for {cmd}"))?;

    let (sender, receiver) = mpsc::channel::<String>();
    let err_sender = sender.clone();
    thread::spawn(move || forward_lines(stdout, &sender));
    thread::spawn(move || forward_lines(stderr, &err_sender));

    let mut collected = String::new();
    loop {
        let wait = deadline.map_or(POLL_INTERVAL, |at| {
            at.saturating_duration_since(Instant::now()).min(POLL_INTERVAL)
        });
        match receiver.recv_timeout(wait) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    on_line(line.trim_end());
                    collected.push_str(&line);
                }
                pump.yield_now();
            }
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if deadline.is_some_and(|at| Instant::now() >= at) {
            terminate(&mut child, cmd);
            return Err(ShellError::TimedOut {
                command: cmd.to_string(),
                after: started.elapsed(),
            }
            .into());
        }
    }
    child
        .wait()
        .with_context(|| format!("failed to wait for {cmd}"))?;
    pump.yield_now();
    Ok(collected)
}

fn terminate(child: &mut Child, cmd: &str) {
    warn!(cmd, "terminating shell command");
    if let Err(err) = child.kill() {
        warn!(cmd, error = %err, "failed to kill shell command");
    }
    let _ = child.wait();
}

fn read_latin1(mut reader: impl Read) -> Result<String> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;
    Ok(latin1::decode(&buffer))
}

fn forward_lines(reader: impl Read, sender: &mpsc::Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if sender.send(latin1::decode(&line)).is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingPump(Cell<usize>);

    impl EventPump for CountingPump {
        fn yield_now(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[cfg(unix)]
    #[test]
    fn run_shell_captures_output_and_status_unix() -> Result<()> {
        let pump = CountingPump::default();
        let output = run_shell("printf out && printf err >&2; exit 7", None, &pump)?;
        assert_eq!(output.code, 7);
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        assert!(!output.success());
        assert_eq!(pump.0.get(), 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn run_shell_decodes_latin1_output_unix() -> Result<()> {
        let output = run_shell(r"printf 'caf\351'", Some(Duration::from_secs(10)), &NoopPump)?;
        assert_eq!(output.stdout, "caf\u{e9}");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn run_shell_times_out_unix() {
        let err = run_shell("exec sleep 5", Some(Duration::from_millis(100)), &NoopPump)
            .unwrap_err();
        assert!(is_timeout(&err), "{err:#}");
    }

    #[cfg(windows)]
    #[test]
    fn run_shell_captures_output_and_status_windows() -> Result<()> {
        let output = run_shell(
            "@echo off & echo out & echo err 1>&2 & exit /B 7",
            None,
            &NoopPump,
        )?;
        assert_eq!(output.code, 7);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn streaming_merges_stderr_and_skips_blank_lines_unix() -> Result<()> {
        let pump = CountingPump::default();
        let mut lines = Vec::new();
        let stdout = run_shell_streaming(
            "echo one; echo; echo two >&2",
            None,
            &pump,
            &mut |line| lines.push(line.to_string()),
        )?;
        lines.sort();
        assert_eq!(lines, ["one", "two"]);
        assert!(stdout.contains("one\n") && stdout.contains("two\n"));
        assert!(pump.0.get() >= 3);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn streaming_deadline_kills_process_unix() {
        let mut lines = Vec::new();
        let deadline = Instant::now() + Duration::from_millis(300);
        let err = run_shell_streaming(
            "echo started; exec sleep 5",
            Some(deadline),
            &NoopPump,
            &mut |line| lines.push(line.to_string()),
        )
        .unwrap_err();
        assert!(is_timeout(&err), "{err:#}");
        assert_eq!(lines, ["started"]);
    }

    #[test]
    fn spawn_failure_is_reported() {
        let err = spawn(Command::new("/definitely/not/a/shell"), "noop").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShellError>(),
            Some(ShellError::Spawn { .. })
        ));
    }
}
