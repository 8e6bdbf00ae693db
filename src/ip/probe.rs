//! Single-address reachability probes.
//!
//! [`SystemPing`] shells out to the system `ping` once per address. Each
//! probe is a separate child process with its own deadline; a shared
//! [`CancelToken`] lets a sweep stop outstanding probes early.

use std::io;
use std::net::IpAddr;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::PingConfig;

/// How often a running probe checks for exit, deadline and cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared flag telling in-flight probes to give up
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

/// What one probe concluded about one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Alive,
    Unreachable,
    /// Stopped before it finished
    Cancelled,
    /// The probe itself could not run, e.g. missing `ping` binary
    Failed(String),
}

impl ProbeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Alive => "alive",
            ProbeOutcome::Unreachable => "unreachable",
            ProbeOutcome::Cancelled => "cancelled",
            ProbeOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub address: IpAddr,
    pub outcome: ProbeOutcome,
    pub elapsed: Duration,
}

/// Something that can tell whether an address answers
pub trait Prober: Sync {
    fn probe(&self, address: IpAddr, cancel: &CancelToken) -> ProbeOutcome;
}

/// Probe by running `<command> [-6] -c 1 -W <secs> <address>`
#[derive(Debug, Clone)]
pub struct SystemPing {
    pub command: String,
    pub timeout: Duration,
}

impl SystemPing {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn from_config(config: &PingConfig) -> Self {
        Self::new(config.command.clone(), config.timeout)
    }

    /// Arguments passed to the ping command for `address`
    pub fn arguments(&self, address: IpAddr) -> Vec<String> {
        // ping's -W takes whole seconds.
        let wait_secs = self.timeout.as_secs_f64().ceil().max(1.0) as u64;

        let mut args = Vec::with_capacity(6);
        if address.is_ipv6() {
            args.push("-6".to_string());
        }
        args.extend([
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            wait_secs.to_string(),
            address.to_string(),
        ]);
        args
    }
}

impl Prober for SystemPing {
    fn probe(&self, address: IpAddr, cancel: &CancelToken) -> ProbeOutcome {
        if cancel.is_cancelled() {
            return ProbeOutcome::Cancelled;
        }

        let spawned = Command::new(&self.command)
            .args(self.arguments(address))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return ProbeOutcome::Failed(format!("ping command '{}' not found", self.command));
            }
            Err(e) => {
                return ProbeOutcome::Failed(format!("failed to run '{}': {}", self.command, e));
            }
        };

        match wait_with_deadline(&mut child, self.timeout, cancel) {
            Ok(Wait::Exited(true)) => ProbeOutcome::Alive,
            Ok(Wait::Exited(false)) => ProbeOutcome::Unreachable,
            Ok(Wait::TimedOut) => {
                log::debug!("Ping of {} exceeded {:?}", address, self.timeout);
                ProbeOutcome::Unreachable
            }
            Ok(Wait::Cancelled) => ProbeOutcome::Cancelled,
            Err(e) => ProbeOutcome::Failed(format!("failed to wait for ping of {}: {}", address, e)),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Wait {
    /// Carries whether the exit status was success
    Exited(bool),
    TimedOut,
    Cancelled,
}

/// Poll `child` until it exits, `timeout` passes or `cancel` fires. The
/// child is killed and reaped in the latter two cases.
fn wait_with_deadline(child: &mut Child, timeout: Duration, cancel: &CancelToken) -> io::Result<Wait> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Wait::Exited(status.success()));
        }

        let outcome = if cancel.is_cancelled() {
            Wait::Cancelled
        } else if Instant::now() >= deadline {
            Wait::TimedOut
        } else {
            std::thread::sleep(POLL_INTERVAL);
            continue;
        };

        // The child may exit between try_wait and kill.
        let _ = child.kill();
        child.wait()?;
        return Ok(outcome);
    }
}
