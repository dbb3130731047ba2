//! Long-running worker command.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::application::Worker;
use crate::cli::runtime::Runtime;
use crate::domain::models::Config;
use crate::domain::ports::JobDispatcher;

pub async fn execute(config: Config) -> Result<()> {
    let worker_config = config.worker.clone();
    let (runtime, receiver) = Runtime::open(config).await?;

    let dispatcher: Arc<dyn JobDispatcher> = runtime.dispatcher.clone();
    let worker = Worker::new(runtime.runner.clone(), dispatcher, worker_config);
    let handle = worker.handle();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, finishing in-flight jobs");
                handle.shutdown();
            }
            Err(err) => warn!(error = %err, "failed to listen for interrupt"),
        }
    });

    worker.run(receiver).await.context("Worker stopped with an error")?;
    runtime.pool.close().await;
    Ok(())
}
