//! Run external sensor commands with a hard timeout
//!
//! Used by sources that shell out (`systemctl`, `sensors`). A command that
//! overruns its timeout gets SIGTERM, a short grace period, then SIGKILL, and
//! is always reaped so no zombie or orphaned child is left behind.

use pulsedeck_core::constants::COMMAND_TERMINATE_GRACE;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

/// How often a running child is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for pipe readers after the child has exited
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Result of running an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Exit code 0; trimmed stdout
    Success(String),
    /// Non-zero exit or killed by a signal
    Failed { code: Option<i32>, stderr: String },
    /// The program is not installed
    NotFound,
    /// Still running at the deadline; terminated and reaped
    TimedOut { pid: u32 },
    /// Spawn or wait failed for another reason
    Error(String),
}

impl CommandOutcome {
    /// Stdout on success, `fallback` otherwise
    pub fn or_fallback(self, fallback: &str) -> String {
        match self {
            CommandOutcome::Success(stdout) => stdout,
            _ => fallback.to_string(),
        }
    }
}

/// Run `program` with `args`, returning trimmed stdout or `fallback`
///
/// Any failure (not installed, non-zero exit, timeout) yields `fallback`.
pub fn safe_command(program: &str, args: &[&str], fallback: &str, timeout: Duration) -> String {
    run_command(program, args, timeout).or_fallback(fallback)
}

/// Run `program` with `args` and report exactly how it ended
pub fn run_command(program: &str, args: &[&str], timeout: Duration) -> CommandOutcome {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            // Not installed is an expected condition (e.g. no lm-sensors)
            log::debug!("Command not found: {}", program);
            return CommandOutcome::NotFound;
        }
        Err(e) => {
            log::warn!("Failed to spawn '{}': {}", program, e);
            return CommandOutcome::Error(e.to_string());
        }
    };

    let pid = child.id();
    let stdout = spawn_pipe_reader(child.stdout.take());
    let stderr = spawn_pipe_reader(child.stderr.take());

    let status = match wait_until(&mut child, Instant::now() + timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            log::warn!(
                "Timeout after {:?} for command '{} {}', terminating",
                timeout,
                program,
                args.join(" ")
            );
            terminate(&mut child);
            return CommandOutcome::TimedOut { pid };
        }
        Err(e) => {
            log::warn!("Error waiting for '{}': {}", program, e);
            kill_and_reap(&mut child);
            return CommandOutcome::Error(e.to_string());
        }
    };

    let stdout = drain(stdout);
    let stderr = drain(stderr);

    if status.success() {
        CommandOutcome::Success(stdout.trim().to_string())
    } else {
        let stderr = stderr.trim().to_string();
        if !stderr.is_empty() {
            log::debug!(
                "Command '{} {}' exited with {:?}: {}",
                program,
                args.join(" "),
                status.code(),
                stderr
            );
        }
        CommandOutcome::Failed {
            code: status.code(),
            stderr,
        }
    }
}

/// Poll the child until it exits or `deadline` passes
fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGTERM, wait briefly, then SIGKILL; always reaps the child
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(child.id() as i32);
        if let Err(e) = kill(pid, Signal::SIGTERM) {
            log::debug!("Failed to send SIGTERM to {}: {}", pid, e);
        }

        match wait_until(child, Instant::now() + COMMAND_TERMINATE_GRACE) {
            Ok(Some(_)) => return,
            Ok(None) => {
                log::warn!("Process {} did not terminate gracefully, killing", pid);
            }
            Err(e) => {
                log::debug!("Error waiting for {} after SIGTERM: {}", pid, e);
            }
        }
    }

    kill_and_reap(child);
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        // InvalidInput means it already exited
        log::trace!("kill({}) failed: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        log::debug!("Failed to reap process {}: {}", child.id(), e);
    }
}

/// Read a pipe to EOF on a helper thread so a chatty child cannot fill the
/// pipe buffer and block. The pipe is closed when the thread finishes.
fn spawn_pipe_reader<R>(pipe: Option<R>) -> Option<Receiver<String>>
where
    R: Read + Send + 'static,
{
    let mut pipe = pipe?;
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("cmd-pipe".to_string())
        .spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
    match spawned {
        Ok(_) => Some(rx),
        Err(e) => {
            log::warn!("Failed to spawn pipe reader: {}", e);
            None
        }
    }
}

fn drain(reader: Option<Receiver<String>>) -> String {
    reader
        .and_then(|rx| rx.recv_timeout(PIPE_DRAIN_TIMEOUT).ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;

    fn process_alive(pid: u32) -> bool {
        Path::new(&format!("/proc/{}", pid)).exists()
    }

    #[test]
    fn test_success_returns_trimmed_stdout() {
        let out = safe_command("sh", &["-c", "echo '  active  '"], "error", Duration::from_secs(2));
        assert_eq!(out, "active");
    }

    #[test]
    fn test_non_zero_exit_returns_fallback() {
        let outcome = run_command("sh", &["-c", "echo oops >&2; exit 3"], Duration::from_secs(2));
        assert_eq!(
            outcome,
            CommandOutcome::Failed {
                code: Some(3),
                stderr: "oops".to_string()
            }
        );
        assert_eq!(
            safe_command("sh", &["-c", "exit 1"], "N/A", Duration::from_secs(2)),
            "N/A"
        );
    }

    #[test]
    fn test_missing_program_returns_fallback() {
        let outcome = run_command("definitely-not-a-real-sensor-tool", &[], Duration::from_secs(1));
        assert_eq!(outcome, CommandOutcome::NotFound);
        assert_eq!(outcome.or_fallback("fallback"), "fallback");
    }

    #[test]
    fn test_timeout_kills_and_reaps_child() {
        let start = Instant::now();
        let outcome = run_command("sleep", &["5"], Duration::from_millis(200));
        let elapsed = start.elapsed();

        let pid = match outcome {
            CommandOutcome::TimedOut { pid } => pid,
            other => panic!("expected timeout, got {:?}", other),
        };
        assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
        assert!(!process_alive(pid), "child {} still alive", pid);
    }

    #[test]
    fn test_timeout_escalates_to_sigkill() {
        let start = Instant::now();
        let out = safe_command(
            "sh",
            &["-c", "trap '' TERM; while true; do sleep 0.05; done"],
            "fallback",
            Duration::from_millis(100),
        );
        assert_eq!(out, "fallback");
        // Ignored SIGTERM means the full grace period was spent
        assert!(start.elapsed() >= Duration::from_millis(100) + COMMAND_TERMINATE_GRACE);
    }
}
