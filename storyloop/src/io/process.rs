//! Terminal-attached child processes with an output-liveness watchdog.
//!
//! Agent CLIs behave differently when their output is not a terminal, so the
//! child runs on the slave side of a pseudo-terminal and its output is read
//! from the master. Agent sessions have no natural deadline: instead of a
//! fixed timeout the child is watched for silence, and once it has produced
//! output a long enough quiet period after a minimum runtime counts as hung.

use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use portable_pty::{Child, ChildKiller, CommandBuilder, ExitStatus, PtySize, PtySystem};
use tracing::{debug, error, instrument, warn};

/// Exit code reported when the watchdog killed a hung child.
pub const TIMEOUT_EXIT_CODE: i32 = -1;
/// Exit code reported when the child was ended by a signal.
pub const SIGNAL_EXIT_CODE: i32 = -2;

/// Terminal the child sees.
const PTY_SIZE: PtySize = PtySize {
    rows: 30,
    cols: 80,
    pixel_width: 0,
    pixel_height: 0,
};
const TERM: &str = "xterm-color";

/// When a running child counts as hung.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessPolicy {
    /// Never treat the child as hung before it has run this long.
    pub min_runtime: Duration,
    /// Silence (after the first output chunk) that counts as hung.
    pub idle_timeout: Duration,
    /// How often the watchdog wakes up without output.
    pub poll_interval: Duration,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            min_runtime: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl LivenessPolicy {
    /// `since_output` is `None` until the child has written anything.
    pub fn is_hung(&self, elapsed: Duration, since_output: Option<Duration>) -> bool {
        match since_output {
            Some(idle) => elapsed >= self.min_runtime && idle >= self.idle_timeout,
            None => false,
        }
    }
}

/// Captured output of a streamed child process.
#[derive(Debug, Clone)]
pub struct StreamedOutput {
    /// Everything the child wrote to its terminal, in arrival order.
    pub output: Vec<u8>,
    pub exit_code: i32,
    pub duration: Duration,
    pub timed_out: bool,
}

impl StreamedOutput {
    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Run a command under a pseudo-terminal, streaming its output and killing
/// it if it goes quiet.
///
/// The terminal is read on a background thread and delivered in chunks.
/// With `echo`, each chunk is also written to this process's stdout as it
/// arrives. Failing to spawn is an error; a hung child is not, it is reported
/// with [`TIMEOUT_EXIT_CODE`].
#[instrument(
    skip_all,
    fields(
        min_runtime_secs = policy.min_runtime.as_secs(),
        idle_timeout_secs = policy.idle_timeout.as_secs()
    )
)]
pub fn run_streaming(
    mut cmd: CommandBuilder,
    policy: &LivenessPolicy,
    echo: bool,
) -> Result<StreamedOutput> {
    cmd.env("TERM", TERM);
    let pair = portable_pty::native_pty_system()
        .openpty(PTY_SIZE)
        .context("open pseudo-terminal")?;

    debug!("spawning child process");
    let start = Instant::now();
    let mut child = match pair.slave.spawn_command(cmd) {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };
    // Only the child may hold the slave, or reads never see end of file.
    drop(pair.slave);

    let reader = pair
        .master
        .try_clone_reader()
        .context("read pseudo-terminal")?;
    let (tx, rx) = mpsc::channel();
    spawn_reader(reader, tx);

    let mut sink = OutputSink {
        output: Vec::new(),
        last_output: None,
        echo,
    };
    let mut terminal_open = true;

    let status = loop {
        if terminal_open {
            match rx.recv_timeout(policy.poll_interval) {
                Ok(chunk) => sink.push(&chunk),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => terminal_open = false,
            }
        } else {
            thread::sleep(policy.poll_interval);
        }
        if let Some(status) = child.try_wait().context("poll command")? {
            // Pick up whatever the reader still holds.
            drain(&rx, policy.poll_interval, &mut sink);
            break status;
        }

        let since_output = sink.last_output.map(|at| at.elapsed());
        if policy.is_hung(start.elapsed(), since_output) {
            warn!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "no output within idle timeout, killing"
            );
            kill(child.as_mut())?;
            return Ok(StreamedOutput {
                output: sink.output,
                exit_code: TIMEOUT_EXIT_CODE,
                duration: start.elapsed(),
                timed_out: true,
            });
        }
    };

    let exit_code = exit_code(&status);
    debug!(exit_code, "command finished");
    Ok(StreamedOutput {
        output: sink.output,
        exit_code,
        duration: start.elapsed(),
        timed_out: false,
    })
}

struct OutputSink {
    output: Vec<u8>,
    last_output: Option<Instant>,
    echo: bool,
}

impl OutputSink {
    fn push(&mut self, chunk: &[u8]) {
        self.last_output = Some(Instant::now());
        self.output.extend_from_slice(chunk);
        if self.echo {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout.write_all(chunk).and_then(|()| stdout.flush()) {
                warn!(err = %e, "failed to echo command output");
            }
        }
    }
}

fn drain(rx: &Receiver<Vec<u8>>, grace: Duration, sink: &mut OutputSink) {
    while let Ok(chunk) = rx.recv_timeout(grace) {
        sink.push(&chunk);
    }
}

fn kill(child: &mut (dyn Child + Send + Sync)) -> Result<()> {
    child.kill().context("kill command")?;
    child.wait().context("wait command after kill")?;
    Ok(())
}

fn exit_code(status: &ExitStatus) -> i32 {
    if status.signal().is_some() {
        return SIGNAL_EXIT_CODE;
    }
    i32::try_from(status.exit_code()).unwrap_or(SIGNAL_EXIT_CODE)
}

/// Forward terminal output until the child side closes. Linux reports the
/// closed terminal as an I/O error rather than end of file.
fn spawn_reader<R: Read + Send + 'static>(mut reader: R, tx: Sender<Vec<u8>>) {
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(chunk[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!(err = %e, "terminal reader stopped");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandBuilder {
        let mut cmd = CommandBuilder::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    fn fast_policy() -> LivenessPolicy {
        LivenessPolicy {
            min_runtime: Duration::from_millis(300),
            idle_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(20),
        }
    }

    #[test]
    fn silence_before_first_output_is_never_hung() {
        let policy = LivenessPolicy::default();
        assert!(!policy.is_hung(Duration::from_secs(600), None));
    }

    #[test]
    fn hung_requires_both_min_runtime_and_idle_timeout() {
        let policy = LivenessPolicy::default();
        assert!(!policy.is_hung(Duration::from_secs(29), Some(Duration::from_secs(10))));
        assert!(!policy.is_hung(Duration::from_secs(40), Some(Duration::from_secs(4))));
        assert!(policy.is_hung(Duration::from_secs(30), Some(Duration::from_secs(5))));
    }

    #[test]
    fn captures_output_and_exit_code() {
        let script = "echo out; echo err 1>&2; exit 3";
        let out = run_streaming(sh(script), &fast_policy(), false).expect("run");
        let text = out.output_lossy();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
        assert_eq!(out.exit_code, 3);
        assert!(!out.timed_out);
    }

    #[test]
    fn child_runs_attached_to_a_terminal() {
        let script = "if [ -t 0 ] && [ -t 1 ]; then echo tty; else echo pipe; fi; echo $TERM";
        let out = run_streaming(sh(script), &fast_policy(), false).expect("run");
        let text = out.output_lossy();
        assert!(text.contains("tty"), "{text}");
        assert!(text.contains(TERM), "{text}");
        assert_eq!(out.exit_code, 0);
    }

    #[test]
    fn child_starts_in_requested_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let marker = temp.path().join("marker.txt");
        std::fs::write(&marker, "here").expect("write marker");
        let mut cmd = sh("cat marker.txt");
        cmd.cwd(temp.path());
        let out = run_streaming(cmd, &fast_policy(), false).expect("run");
        assert!(out.output_lossy().contains("here"));
    }

    #[test]
    fn quiet_child_without_output_runs_to_completion() {
        let out = run_streaming(sh("sleep 1"), &fast_policy(), false).expect("run");
        assert_eq!(out.exit_code, 0);
        assert!(!out.timed_out);
    }

    #[test]
    fn child_silent_after_output_is_killed() {
        let script = "echo started; exec sleep 30";
        let out = run_streaming(sh(script), &fast_policy(), false).expect("run");
        assert!(out.timed_out);
        assert_eq!(out.exit_code, TIMEOUT_EXIT_CODE);
        assert!(out.output_lossy().contains("started"));
        assert!(out.duration >= Duration::from_millis(300));
        assert!(out.duration < Duration::from_secs(10));
    }

    #[test]
    fn steady_output_keeps_child_alive() {
        let out = run_streaming(
            sh("for i in 1 2 3 4 5 6; do echo tick $i; sleep 0.1; done"),
            &fast_policy(),
            false,
        )
        .expect("run");
        assert!(!out.timed_out);
        assert!(out.output_lossy().contains("tick 6"));
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let cmd = CommandBuilder::new("storyloop-definitely-missing-binary");
        let err = run_streaming(cmd, &fast_policy(), false).unwrap_err();
        assert!(err.to_string().contains("spawn command"));
    }
}
