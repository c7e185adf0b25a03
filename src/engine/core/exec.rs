//! Child-process plumbing: the long-running conversion executor and the
//! bounded capture used for introspection and probes.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::progress::ProgressParser;
use super::types::ProgressEvent;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Cooperative cancellation flag shared between a request and its caller
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Success,
    Failed { code: Option<i32>, tail: Vec<String> },
    Cancelled,
}

/// Forward output chunks as lines, splitting on `\r` as well as `\n`
/// because ffmpeg redraws its status line with carriage returns.
fn pump_lines<R: Read>(mut reader: R, tx: Sender<String>) {
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &byte in &buf[..n] {
            if byte == b'\n' || byte == b'\r' {
                if !pending.is_empty() {
                    let line = String::from_utf8_lossy(&pending).into_owned();
                    pending.clear();
                    if tx.send(line).is_err() {
                        return;
                    }
                }
            } else {
                pending.push(byte);
            }
        }
    }
    if !pending.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
    }
}

/// Ask the child to stop, escalating to a hard kill, and reap it
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        // SIGTERM lets ffmpeg flush and exit on its own
        let pid = child.id() as libc::pid_t;
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => thread::sleep(Duration::from_millis(25)),
                Err(_) => break,
            }
        }
    }

    if let Err(e) = child.kill() {
        debug!("kill after terminate failed: {}", e);
    }
    let _ = child.wait();
}

/// Run the engine to completion, streaming progress.
///
/// Blocks the calling thread. The cancel flag is checked on every output line
/// and at least every 100ms; once set, the child is terminated and reaped
/// before `Cancelled` is returned.
pub fn execute<S, F>(
    program: &Path,
    args: &[S],
    cancel: &CancelToken,
    tail_lines: usize,
    mut on_progress: F,
) -> io::Result<ExecOutcome>
where
    S: AsRef<OsStr>,
    F: FnMut(ProgressEvent),
{
    if cancel.is_cancelled() {
        return Ok(ExecOutcome::Cancelled);
    }

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    debug!(pid = child.id(), "spawned {}", program.display());

    let (tx, rx) = mpsc::channel::<String>();
    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        thread::spawn(move || pump_lines(stdout, tx));
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        thread::spawn(move || pump_lines(stderr, tx));
    }
    drop(tx);

    let mut parser = ProgressParser::new();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(tail_lines.max(1));

    loop {
        if cancel.is_cancelled() {
            terminate(&mut child);
            return Ok(ExecOutcome::Cancelled);
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                if let Some(event) = parser.parse_line(&line) {
                    on_progress(event);
                }
                if tail_lines > 0 {
                    if tail.len() == tail_lines {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = child.wait()?;
    if status.success() {
        return Ok(ExecOutcome::Success);
    }
    if cancel.is_cancelled() {
        return Ok(ExecOutcome::Cancelled);
    }
    Ok(ExecOutcome::Failed {
        code: status.code(),
        tail: tail.into_iter().collect(),
    })
}

/// Result of a bounded, fully-captured run
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub success: bool,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    /// Lower-cased stdout + stderr, for diagnostic pattern matching
    pub fn combined_lower(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        text.push_str(&self.stdout);
        text.push('\n');
        text.push_str(&self.stderr);
        text.to_lowercase()
    }
}

fn read_all<R: Read + Send + 'static>(reader: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut r) = reader {
            let _ = r.read_to_end(&mut bytes);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

/// Run a short command with a deadline; the child is killed when it expires.
///
/// Returns `Err` only when the program could not be started.
pub fn capture<S: AsRef<OsStr>>(
    program: &Path,
    args: &[S],
    timeout: Duration,
) -> io::Result<Captured> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = read_all(child.stdout.take());
    let stderr = read_all(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if Instant::now() >= deadline => {
                warn!(
                    "{} did not finish within {:?}, killing it",
                    program.display(),
                    timeout
                );
                let _ = child.kill();
                let _ = child.wait();
                timed_out = true;
                break None;
            }
            Ok(None) => thread::sleep(Duration::from_millis(25)),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        }
    };

    // A killed child's grandchildren may keep the pipes open; don't wait on them
    let (stdout, stderr) = if timed_out {
        (String::new(), String::new())
    } else {
        (
            stdout.join().unwrap_or_default(),
            stderr.join().unwrap_or_default(),
        )
    };

    Ok(Captured {
        success: status.is_some_and(|s| s.success()),
        timed_out,
        stdout,
        stderr,
    })
}
