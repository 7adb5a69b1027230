use anyhow::{anyhow, Context};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;

/// A submitted backend call.
///
/// The cancellation token is shared with the running call, which is expected
/// to check it at its own safe points; nothing is preempted.
pub struct DispatchHandle {
    task: JoinHandle<anyhow::Result<String>>,
    cancel: CancellationToken,
}

impl DispatchHandle {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Bounded pool for slow answer-backend calls.
///
/// At most `pool_size` calls run at once; further submissions wait for a
/// permit instead of being rejected.
pub struct DispatchExecutor {
    permits: Arc<Semaphore>,
    pool_size: usize,
}

impl DispatchExecutor {
    pub fn new(pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(pool_size)),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Calls currently holding a worker slot.
    pub fn in_flight(&self) -> usize {
        self.pool_size - self.permits.available_permits()
    }

    /// Queue `call` on the pool. A call cancelled while still queued never starts.
    pub fn submit<F, Fut>(&self, call: F) -> DispatchHandle
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let permits = self.permits.clone();

        let task = tokio::spawn(async move {
            let _permit = tokio::select! {
                permit = permits.acquire_owned() => permit.context("dispatch pool closed")?,
                _ = token.cancelled() => anyhow::bail!("cancelled before a worker was free"),
            };
            call(token).await
        });

        DispatchHandle { task, cancel }
    }

    /// Wait up to `timeout` for the call to finish.
    ///
    /// On expiry the call's token is cancelled and the handle is dropped; a
    /// call that keeps running finishes in the background and its result is
    /// discarded.
    pub async fn await_result(
        &self,
        handle: DispatchHandle,
        timeout: Duration,
    ) -> Result<String, RelayError> {
        let DispatchHandle { mut task, cancel } = handle;

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(answer))) => Ok(answer),
            Ok(Ok(Err(e))) => Err(RelayError::Backend(e)),
            Ok(Err(join_error)) => Err(RelayError::Backend(anyhow!(
                "backend task aborted: {}",
                join_error
            ))),
            Err(_) => {
                cancel.cancel();
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    in_flight = self.in_flight(),
                    "backend call timed out, cancellation requested"
                );
                Err(RelayError::Timeout(timeout))
            }
        }
    }
}

impl Default for DispatchExecutor {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_WORKER_POOL_SIZE)
    }
}
