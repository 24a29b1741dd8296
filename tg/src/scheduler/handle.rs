//! SchedulerHandle - client interface to the Scheduler task

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::domain::UserKey;

use super::messages::{KeyState, SchedulerRequest, SchedulerStats, SubmitOutcome};

/// Cloneable handle to one worker's Scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerRequest>,
}

impl SchedulerHandle {
    pub(crate) fn new(tx: mpsc::Sender<SchedulerRequest>) -> Self {
        Self { tx }
    }

    /// Submit a task for `key` and wait for the admission decision
    pub async fn submit(&self, key: UserKey, payload: serde_json::Value) -> Result<SubmitOutcome> {
        debug!(%key, "SchedulerHandle::submit: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SchedulerRequest::Submit { key, payload, reply_tx })
            .await
            .map_err(|_| eyre!("Scheduler channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Scheduler dropped the submission"))
    }

    /// Read the queue depth and drain state of `key`
    pub async fn inspect(&self, key: UserKey) -> Result<KeyState> {
        debug!(%key, "SchedulerHandle::inspect: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SchedulerRequest::Inspect { key, reply_tx })
            .await
            .map_err(|_| eyre!("Scheduler channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Scheduler shut down"))
    }

    pub async fn stats(&self) -> Result<SchedulerStats> {
        debug!("SchedulerHandle::stats: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SchedulerRequest::Stats { reply_tx })
            .await
            .map_err(|_| eyre!("Scheduler channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Scheduler shut down"))
    }

    /// Request shutdown of the Scheduler
    pub async fn shutdown(&self) -> Result<()> {
        debug!("SchedulerHandle::shutdown: called");
        self.tx
            .send(SchedulerRequest::Shutdown)
            .await
            .map_err(|_| eyre!("Scheduler channel closed"))?;

        Ok(())
    }
}
