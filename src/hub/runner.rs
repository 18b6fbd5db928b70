// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Background runner for the workflow engine worker.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::errors::{BoxError, HubError};
use crate::core::models::CallContext;

/// One polling pass of the workflow engine worker.
#[async_trait]
pub trait EngineWorker: Send + Sync {
    async fn run_once(&self, ctx: &CallContext) -> Result<(), BoxError>;
}

/// Reports how the worker task ended.
pub struct WorkerHandle {
    done: oneshot::Receiver<Result<(), HubError>>,
}

impl WorkerHandle {
    /// Wait for the worker to stop. `Ok` after cancellation.
    pub async fn wait(self) -> Result<(), HubError> {
        self.done
            .await
            .map_err(|_| HubError::WorkerError("worker supervisor dropped".to_string()))?
    }
}

/// Spawn `worker` on the runtime, ticking every `interval` until `cancel` fires.
pub fn spawn_worker(
    worker: Arc<dyn EngineWorker>,
    interval: Duration,
    cancel: CancellationToken,
) -> WorkerHandle {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let result = match tokio::spawn(run(worker, interval, cancel)).await {
            Ok(result) => result,
            Err(e) => Err(HubError::WorkerError(format!("worker task failed: {}", e))),
        };

        match &result {
            Ok(()) => debug!(service = "worker", "engine worker stopped"),
            Err(e) => info!(service = "worker", error = %e, "engine worker stopped"),
        }
        let _ = tx.send(result);
    });

    WorkerHandle { done: rx }
}

async fn run(
    worker: Arc<dyn EngineWorker>,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<(), HubError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                let ctx = CallContext::new(cancel.child_token());
                if let Err(e) = worker.run_once(&ctx).await {
                    warn!(service = "worker", error = %e, "engine worker run");
                }
            }
        }
    }
}
