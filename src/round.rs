//! One measurement round: trigger, stamp, collect, aggregate.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::AggregationMode;
use crate::error::{Error, Result};
use crate::worker::WorkerFault;

/// Folds a round's completion times into one latency figure.
///
/// The completion count is the only mutable state of a round, and it lives
/// here, updated exclusively from messages the coordinator consumes and never
/// by worker tasks, so no locking is involved anywhere.
#[derive(Debug, Clone, Copy)]
pub struct RoundAccumulator {
    mode: AggregationMode,
    total: Duration,
    last: Duration,
    received: usize,
}

impl RoundAccumulator {
    /// Start an empty accumulator for `mode`.
    #[must_use]
    pub fn new(mode: AggregationMode) -> Self {
        Self {
            mode,
            total: Duration::ZERO,
            last: Duration::ZERO,
            received: 0,
        }
    }

    /// Fold in one completion's elapsed time.
    pub fn push(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.last = elapsed;
        self.received += 1;
    }

    /// Completions folded so far.
    #[must_use]
    pub fn received(&self) -> usize {
        self.received
    }

    /// Collapse into the round's latency figure.
    ///
    /// `Tail` yields the last (slowest-to-arrive) completion's elapsed time;
    /// `Average` yields the mean over everything pushed. An empty accumulator
    /// yields zero.
    #[must_use]
    pub fn finish(&self) -> Duration {
        match self.mode {
            AggregationMode::Tail => self.last,
            AggregationMode::Average => {
                if self.received == 0 {
                    Duration::ZERO
                } else {
                    self.total / self.received as u32
                }
            }
        }
    }
}

/// Orchestrates measurement rounds over the coordination channels.
///
/// The coordinator is the sole consumer of every inbound signal (publish
/// timestamps, readiness, completions, worker faults), which keeps the
/// "wait for exactly N completions" protocol race-free: each signal is a
/// discrete message consumed by exactly one loop.
pub struct RoundCoordinator {
    trigger_tx: mpsc::Sender<()>,
    stamp_rx: mpsc::Receiver<Instant>,
    ready_rx: mpsc::Receiver<()>,
    completion_rx: mpsc::Receiver<()>,
    fault_rx: mpsc::UnboundedReceiver<WorkerFault>,
    mode: AggregationMode,
    pacing: Duration,
    deadline: Option<Duration>,
}

impl RoundCoordinator {
    /// Create a coordinator over the session's channel ends.
    #[must_use]
    pub fn new(
        trigger_tx: mpsc::Sender<()>,
        stamp_rx: mpsc::Receiver<Instant>,
        ready_rx: mpsc::Receiver<()>,
        completion_rx: mpsc::Receiver<()>,
        fault_rx: mpsc::UnboundedReceiver<WorkerFault>,
        mode: AggregationMode,
        pacing: Duration,
        deadline: Option<Duration>,
    ) -> Self {
        Self {
            trigger_tx,
            stamp_rx,
            ready_rx,
            completion_rx,
            fault_rx,
            mode,
            pacing,
            deadline,
        }
    }

    /// Wait for one newly spawned subscriber to finish its handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerFailed`] if a worker dies while waiting.
    /// - [`Error::Stalled`] if the deadline expires first.
    /// - [`Error::ChannelClosed`] if the readiness channel closes.
    pub async fn await_ready(&mut self) -> Result<()> {
        let deadline = self.deadline;
        let wait = async {
            tokio::select! {
                signal = self.ready_rx.recv() => {
                    signal.ok_or(Error::ChannelClosed("subscriber readiness"))
                }
                fault = self.fault_rx.recv() => Err(fault_to_error(fault)),
            }
        };
        match deadline {
            Some(limit) => timeout(limit, wait).await.map_err(|_| Error::Stalled {
                phase: "subscriber readiness",
                limit,
            })?,
            None => wait.await,
        }
    }

    /// Run one round against `expected` active subscribers.
    ///
    /// Sleeps the pacing delay (rounds must not overlap, since completions
    /// carry no round identifier), fires the publisher trigger, receives the
    /// publish timestamp, then consumes completion signals until exactly
    /// `expected` have arrived, folding `now - stamp` into the accumulator
    /// as each one lands. Stray completions found after the N-th are a
    /// defect and are logged, not tolerated silently.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerFailed`] if a worker dies mid-round.
    /// - [`Error::RoundStalled`] if the completion deadline expires.
    /// - [`Error::Stalled`] / [`Error::ChannelClosed`] on the trigger and
    ///   timestamp legs.
    pub async fn run_round(&mut self, expected: usize) -> Result<Duration> {
        tokio::time::sleep(self.pacing).await;

        if self.trigger_tx.send(()).await.is_err() {
            return Err(match self.fault_rx.try_recv() {
                Ok(fault) => fault_to_error(Some(fault)),
                Err(_) => Error::ChannelClosed("publisher trigger"),
            });
        }

        let published_at = self.recv_stamp().await?;

        let mut round = RoundAccumulator::new(self.mode);
        while round.received() < expected {
            self.recv_completion(round.received(), expected).await?;
            round.push(published_at.elapsed());
        }

        self.drain_strays();
        let latency = round.finish();
        debug!(expected, ?latency, "round complete");
        Ok(latency)
    }

    async fn recv_stamp(&mut self) -> Result<Instant> {
        let deadline = self.deadline;
        let wait = async {
            tokio::select! {
                stamp = self.stamp_rx.recv() => {
                    stamp.ok_or(Error::ChannelClosed("publish timestamp"))
                }
                fault = self.fault_rx.recv() => Err(fault_to_error(fault)),
            }
        };
        match deadline {
            Some(limit) => timeout(limit, wait).await.map_err(|_| Error::Stalled {
                phase: "publish timestamp",
                limit,
            })?,
            None => wait.await,
        }
    }

    async fn recv_completion(&mut self, received: usize, expected: usize) -> Result<()> {
        let deadline = self.deadline;
        let wait = async {
            tokio::select! {
                signal = self.completion_rx.recv() => {
                    signal.ok_or(Error::ChannelClosed("completions"))
                }
                fault = self.fault_rx.recv() => Err(fault_to_error(fault)),
            }
        };
        match deadline {
            Some(limit) => timeout(limit, wait).await.map_err(|_| Error::RoundStalled {
                received,
                expected,
                limit,
            })?,
            None => wait.await,
        }
    }

    /// Drain completions that arrived after the round was already full.
    ///
    /// A correct endpoint delivers exactly one message per subscriber per
    /// publish, so anything here means duplicated delivery or a harness bug.
    fn drain_strays(&mut self) {
        let mut strays = 0usize;
        while self.completion_rx.try_recv().is_ok() {
            strays += 1;
        }
        if strays > 0 {
            warn!(strays, "unexpected completion signals after round was full");
        }
    }
}

fn fault_to_error(fault: Option<WorkerFault>) -> Error {
    match fault {
        Some(fault) => Error::WorkerFailed {
            role: fault.role,
            detail: fault.error.to_string(),
        },
        None => Error::ChannelClosed("worker faults"),
    }
}
