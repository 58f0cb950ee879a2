//! Bounded queue decoupling case mutations from audit and notification I/O.
//!
//! Producers call [`SideEffectHandle::enqueue`] after their write commits.
//! Enqueue never blocks and never fails the caller: a full queue drops the
//! effect with a warning. Worker tasks consume the shared receiver and invoke
//! the audit/notification collaborators; handler failures are logged and the
//! effect is not retried here, so handlers must tolerate at-least-once
//! delivery when a caller re-runs an operation.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SideEffectConfig;
use crate::services::{NotificationSender, OperationLogger, OperationRecord, StageCompletionNotice};

/// One queued unit of background work.
#[derive(Debug, Clone)]
pub enum SideEffect {
    Audit(OperationRecord),
    Notify(StageCompletionNotice),
}

/// Cloneable producer half of the queue.
#[derive(Clone)]
pub struct SideEffectHandle {
    tx: mpsc::Sender<SideEffect>,
}

impl SideEffectHandle {
    /// Fire-and-forget enqueue. Queue-full and queue-closed both drop the
    /// effect with a warning; neither condition reaches the caller.
    pub fn enqueue(&self, effect: SideEffect) {
        if let Err(err) = self.tx.try_send(effect) {
            match err {
                mpsc::error::TrySendError::Full(effect) => {
                    warn!(?effect, "side-effect queue full, dropping effect");
                }
                mpsc::error::TrySendError::Closed(effect) => {
                    warn!(?effect, "side-effect queue closed, dropping effect");
                }
            }
        }
    }

    /// A handle whose queue is already closed. Every enqueue is dropped.
    /// Useful for tests and for callers that opt out of side effects.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }
}

/// Worker pool consuming the queue.
pub struct SideEffectQueue {
    workers: Vec<JoinHandle<()>>,
}

impl SideEffectQueue {
    /// Spawn the worker pool and return it with its producer handle.
    pub fn start(
        config: &SideEffectConfig,
        logger: Arc<dyn OperationLogger>,
        notifier: Arc<dyn NotificationSender>,
    ) -> (Self, SideEffectHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let logger = Arc::clone(&logger);
                let notifier = Arc::clone(&notifier);
                tokio::spawn(async move {
                    loop {
                        let effect = {
                            let mut guard = rx.lock().await;
                            guard.recv().await
                        };
                        let Some(effect) = effect else {
                            debug!(worker_id, "side-effect queue drained, worker exiting");
                            break;
                        };
                        handle_effect(effect, logger.as_ref(), notifier.as_ref()).await;
                    }
                })
            })
            .collect();

        (Self { workers }, SideEffectHandle { tx })
    }

    /// Wait for the workers to drain and exit. All producer handles must be
    /// dropped first or this waits forever.
    pub async fn shutdown(self) {
        for worker in self.workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "side-effect worker panicked");
            }
        }
    }
}

async fn handle_effect(
    effect: SideEffect,
    logger: &dyn OperationLogger,
    notifier: &dyn NotificationSender,
) {
    match effect {
        SideEffect::Audit(record) => {
            if let Err(err) = logger.log(&record).await {
                warn!(
                    case_id = record.case_id,
                    operation = %record.operation,
                    error = %err,
                    "failed to write audit record"
                );
            }
        }
        SideEffect::Notify(notice) => {
            if let Err(err) = notifier.stage_completed(&notice).await {
                warn!(
                    case_id = notice.case_id,
                    stage_id = notice.completed_stage_id,
                    error = %err,
                    "failed to send stage-completed notification"
                );
            }
        }
    }
}
