mod config;
mod evaluator;
mod executor;
mod language;
mod runner;
mod sandbox;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use config::WorkerConfig;
use executor::Delivery;
use judge_common::config::RedisConfig;
use judge_common::redis;
use judge_common::store::RedisStore;
use sandbox::SandboxExecutor;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// Pause before a submission whose verdict could not be written goes back to the queue
const REDELIVERY_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Judge worker booting...");

    let config = WorkerConfig::load_default().map_err(|e| {
        error!("Failed to load worker configuration: {:#}", e);
        e
    })?;

    info!(
        concurrency = config.concurrency,
        run_timeout_ms = config.run_timeout_ms,
        compile_timeout_ms = config.compile_timeout_ms,
        workspace_root = %config.workspace_root.display(),
        "Worker configured"
    );

    // Connect to Redis
    let redis_config = RedisConfig::from_env();
    let mut redis_conn = redis_config
        .connect()
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", redis_config.url))?;

    // The blocking receive gets its own socket so it never queues in front of store traffic
    let queue_conn = redis_config
        .connect()
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", redis_config.url))?;

    info!("Connected to Redis: {}", redis_config.url);

    // Anything left in the processing list belonged to a worker that died mid-judging
    redis::requeue_inflight(&mut redis_conn)
        .await
        .context("Failed to requeue in-flight submissions")?;

    let store = RedisStore::new(redis_conn.clone());
    let sandbox = Arc::new(SandboxExecutor::new(&config));

    // Setup graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_shutdown(signal::ctrl_c(), shutdown_tx));

    worker_loop(queue_conn, redis_conn, store, sandbox, &config, shutdown_rx).await?;

    info!("Worker shutdown complete");
    Ok(())
}

async fn forward_shutdown<F>(signal: F, shutdown_tx: watch::Sender<bool>)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            warn!("Received shutdown signal, finishing in-flight submissions...");
            let _ = shutdown_tx.send(true);
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal, running until killed");
            // A dropped sender reads as closed; keep it alive
            std::future::pending::<()>().await;
            drop(shutdown_tx);
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .init();
    }
}

/// Pull submission ids and judge each in its own task, at most
/// `config.concurrency` at a time. Returns after shutdown once every
/// in-flight submission has been persisted.
#[instrument(skip_all, fields(concurrency = config.concurrency))]
async fn worker_loop(
    mut queue_conn: ::redis::aio::ConnectionManager,
    redis_conn: ::redis::aio::ConnectionManager,
    store: RedisStore,
    sandbox: Arc<SandboxExecutor>,
    config: &WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let permits = Arc::new(Semaphore::new(config.concurrency));
    let mut tasks = JoinSet::new();

    loop {
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                error!(error = %e, "Submission task failed");
            }
        }

        // Wait for a free slot before taking a message off the queue
        let permit = tokio::select! {
            permit = permits.clone().acquire_owned() => permit?,
            Ok(()) = shutdown.changed() => break,
        };

        // BLPOP-style receive with a timeout so shutdown is noticed
        let popped = tokio::select! {
            popped = redis::pop_submission(&mut queue_conn, config.queue_poll_seconds) => popped,
            Ok(()) = shutdown.changed() => break,
        };

        match popped {
            Ok(Some(id)) => {
                info!(submission_id = id, in_flight = tasks.len() + 1, "Received submission");

                let store = store.clone();
                let sandbox = sandbox.clone();
                let mut ack_conn = redis_conn.clone();
                tasks.spawn(async move {
                    let delivery = executor::process_submission(store, sandbox, id).await;
                    drop(permit);
                    settle(&mut ack_conn, id, delivery).await;
                });
            }
            Ok(None) => {
                // Timeout - check for shutdown
                continue;
            }
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    info!(in_flight = tasks.len(), "Draining in-flight submissions");
    while let Some(finished) = tasks.join_next().await {
        if let Err(e) = finished {
            error!(error = %e, "Submission task failed");
        }
    }

    Ok(())
}

/// Acknowledge a judged submission, or give it back to the queue after a pause
async fn settle(conn: &mut ::redis::aio::ConnectionManager, id: u64, delivery: Delivery) {
    match delivery {
        Delivery::Acknowledge => {
            if let Err(e) = redis::ack_submission(conn, id).await {
                error!(submission_id = id, error = %e, "Failed to acknowledge submission");
            }
        }
        Delivery::Redeliver => {
            tokio::time::sleep(REDELIVERY_DELAY).await;
            match redis::requeue_submission(conn, id).await {
                Ok(()) => warn!(submission_id = id, "Submission requeued after failed write"),
                // Left in the processing list; the next worker start requeues it
                Err(e) => error!(submission_id = id, error = %e, "Failed to requeue submission"),
            }
        }
    }
}
