//! Relaying termination signals to the running terraform process.
//!
//! Both SIGINT and SIGTERM are forwarded to the child as SIGINT, which is the
//! signal terraform handles gracefully (it finishes the current operation and
//! writes state). Delivery happens once per received signal; the run loop
//! itself is never cancelled, so the state is still persisted afterwards.

use std::fmt;
use std::io;

use nix::sys::signal::Signal;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, TerraformerError};
use crate::runner::ActiveProcess;

/// A termination signal received by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaySignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for RelaySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelaySignal::Interrupt => f.write_str("SIGINT"),
            RelaySignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Where termination signals come from.
pub trait SignalSource: Send + Sync {
    /// Start delivering signals to the returned receiver.
    ///
    /// Must be called from within a tokio runtime.
    fn subscribe(&self) -> io::Result<mpsc::UnboundedReceiver<RelaySignal>>;
}

/// Signals delivered to this process by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSignals;

impl SignalSource for OsSignals {
    fn subscribe(&self) -> io::Result<mpsc::UnboundedReceiver<RelaySignal>> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = sigint.recv() => RelaySignal::Interrupt,
                    _ = sigterm.recv() => RelaySignal::Terminate,
                    _ = tx.closed() => break,
                };
                if tx.send(received).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

/// In-process signal source for tests and embedding.
#[derive(Debug, Default)]
pub struct ChannelSignals {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<RelaySignal>>>,
}

impl ChannelSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `signal` to every live subscriber. Returns whether anyone
    /// received it.
    pub fn send(&self, signal: RelaySignal) -> bool {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(signal).is_ok());
        !subscribers.is_empty()
    }

    /// Number of subscribers that are still listening.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

impl SignalSource for ChannelSignals {
    fn subscribe(&self) -> io::Result<mpsc::UnboundedReceiver<RelaySignal>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        Ok(rx)
    }
}

/// Background task forwarding signals to the active child. Stops when
/// dropped.
pub struct SignalRelay {
    task: JoinHandle<()>,
}

impl SignalRelay {
    pub fn start(source: &dyn SignalSource, active: ActiveProcess) -> Result<Self> {
        let mut rx = source
            .subscribe()
            .map_err(TerraformerError::SignalSubscription)?;

        let task = tokio::spawn(async move {
            while let Some(received) = rx.recv().await {
                match active.signal(Signal::SIGINT) {
                    None => {
                        tracing::info!(signal = %received, "received signal, but no terraform process is running");
                    }
                    Some((pid, Ok(()))) => {
                        tracing::info!(signal = %received, pid, "relayed signal to terraform process as SIGINT");
                    }
                    Some((pid, Err(errno))) => {
                        tracing::warn!(pid, error = %errno, "failed to relay signal to terraform process");
                    }
                }
            }
        });

        Ok(Self { task })
    }
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[test]
    fn test_channel_signals_without_subscribers() {
        let signals = ChannelSignals::new();
        assert!(!signals.send(RelaySignal::Interrupt));
        assert_eq!(signals.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_signals_drops_closed_subscribers() {
        let signals = ChannelSignals::new();
        let rx = signals.subscribe().unwrap();
        assert_eq!(signals.subscriber_count(), 1);
        drop(rx);
        assert!(!signals.send(RelaySignal::Terminate));
        assert_eq!(signals.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_relay_without_active_process_drops_signal() {
        let signals = ChannelSignals::new();
        let relay = SignalRelay::start(&signals, ActiveProcess::new()).unwrap();
        assert_eq!(signals.subscriber_count(), 1);
        assert!(signals.send(RelaySignal::Interrupt));
        tokio::task::yield_now().await;
        drop(relay);
    }

    #[tokio::test]
    async fn test_terminate_is_relayed_as_interrupt() {
        let mut child = tokio::process::Command::new("bash")
            .arg("-c")
            .arg("trap 'echo got SIGINT; exit 7' INT; trap 'echo got SIGTERM; exit 8' TERM; echo ready; sleep 10 >/dev/null 2>&1 & wait $!")
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ready"));

        let active = ActiveProcess::new();
        let _guard = active.claim(child.id().unwrap()).unwrap();
        let signals = ChannelSignals::new();
        let _relay = SignalRelay::start(&signals, active.clone()).unwrap();

        assert!(signals.send(RelaySignal::Terminate));

        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("child did not exit")
            .unwrap();
        assert_eq!(status.code(), Some(7));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("got SIGINT"));
    }
}
