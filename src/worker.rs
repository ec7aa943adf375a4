//! Long-lived publisher and subscriber worker tasks.
//!
//! One task per connection, session lifetime. Workers never touch shared
//! state: everything they report (publish timestamps, readiness, message
//! completions, fatal errors) travels over channels the coordinator alone
//! consumes.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::config::HarnessConfig;
use crate::connection::{Connection, Role};
use crate::error::{Error, Result};
use crate::payload::RequestSet;

/// A fatal worker error, surfaced to the coordinator as a value.
#[derive(Debug)]
pub struct WorkerFault {
    /// Role of the worker that failed.
    pub role: Role,
    /// The error that killed it.
    pub error: Error,
}

/// Spawn the session's single publisher task.
///
/// The task dials, performs the application handshake, then serves triggers
/// for the rest of the session: publish, report the timestamp **before**
/// draining acknowledgements (the stamp must reflect wire-send time), drain
/// the configured number of ack frames, wait for the next trigger. Closing
/// the trigger channel ends the task cleanly; a fatal error is reported on
/// `fault_tx` instead.
pub fn spawn_publisher(
    config: &HarnessConfig,
    requests: Arc<RequestSet>,
    trigger_rx: mpsc::Receiver<()>,
    stamp_tx: mpsc::Sender<Instant>,
    fault_tx: mpsc::UnboundedSender<WorkerFault>,
) -> JoinHandle<()> {
    let address = config.endpoint.address.clone();
    let path = config.endpoint.path.clone();
    let origin = config.endpoint.origin.clone();
    let backoff = config.retry_backoff;
    let acks = config.publish_acks;

    tokio::spawn(async move {
        let outcome = publisher_loop(
            &address, &path, &origin, backoff, acks, requests, trigger_rx, stamp_tx,
        )
        .await;
        if let Err(error) = outcome {
            error!(%error, "publisher worker stopped");
            let _ = fault_tx.send(WorkerFault {
                role: Role::Publisher,
                error,
            });
        }
    })
}

#[allow(clippy::too_many_arguments)]
async fn publisher_loop(
    address: &str,
    path: &str,
    origin: &str,
    backoff: std::time::Duration,
    acks: usize,
    requests: Arc<RequestSet>,
    mut trigger_rx: mpsc::Receiver<()>,
    stamp_tx: mpsc::Sender<Instant>,
) -> Result<()> {
    let mut conn = Connection::dial(address, path, origin, Role::Publisher, backoff).await?;
    conn.handshake(&requests.connect, &requests.subscribe).await?;
    debug!("publisher subscribed");

    while trigger_rx.recv().await.is_some() {
        let stamp = conn.publish(&requests.publish).await?;
        if stamp_tx.send(stamp).await.is_err() {
            break;
        }
        for _ in 0..acks {
            conn.read_frame().await?;
        }
    }
    Ok(())
}

/// Spawn one subscriber task.
///
/// The task dials (retrying dial failures forever), performs the application
/// handshake, signals readiness exactly once, then converts every received
/// data frame into exactly one completion signal until the session ends. It
/// never reconnects after subscribing; a connection lost mid-session would
/// corrupt the measurements, so it is reported as a fault instead.
pub fn spawn_subscriber(
    id: usize,
    config: &HarnessConfig,
    requests: Arc<RequestSet>,
    ready_tx: mpsc::Sender<()>,
    completion_tx: mpsc::Sender<()>,
    fault_tx: mpsc::UnboundedSender<WorkerFault>,
) -> JoinHandle<()> {
    let address = config.endpoint.address.clone();
    let path = config.endpoint.path.clone();
    let origin = config.endpoint.origin.clone();
    let backoff = config.retry_backoff;

    tokio::spawn(async move {
        let outcome = subscriber_loop(
            id, &address, &path, &origin, backoff, requests, ready_tx, completion_tx,
        )
        .await;
        if let Err(error) = outcome {
            error!(id, %error, "subscriber worker stopped");
            let _ = fault_tx.send(WorkerFault {
                role: Role::Subscriber,
                error,
            });
        }
    })
}

#[allow(clippy::too_many_arguments)]
async fn subscriber_loop(
    id: usize,
    address: &str,
    path: &str,
    origin: &str,
    backoff: std::time::Duration,
    requests: Arc<RequestSet>,
    ready_tx: mpsc::Sender<()>,
    completion_tx: mpsc::Sender<()>,
) -> Result<()> {
    let mut conn = Connection::dial(address, path, origin, Role::Subscriber, backoff).await?;
    conn.handshake(&requests.connect, &requests.subscribe).await?;

    if ready_tx.send(()).await.is_err() {
        return Ok(());
    }
    debug!(id, "subscriber active");

    loop {
        conn.read_frame().await?;
        if completion_tx.send(()).await.is_err() {
            return Ok(());
        }
    }
}
