//! # Watch Loop
//!
//! Controller watch loop that monitors `ImageRepository` resources and drives
//! reconcile cycles through kube-runtime's `Controller`.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{ReconcilerError, TriggerSource};
use crate::controller::server::ServerState;
use crate::crd::{ImageRepository, ObjectKey};
use crate::observability;
use crate::runtime::context::{ControllerContext, GateDecision, Revision};
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::controller::{self, Action};
use kube_runtime::{watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const WATCH_BACKOFF_START_MS: u64 = 500;
const WATCH_BACKOFF_MAX_MS: u64 = 30_000;

/// Run the controller watch loop until a shutdown signal arrives
///
/// The controller is restarted after its stream ends for any reason other
/// than shutdown.
pub async fn run_watch_loop(
    repositories: Api<ImageRepository>,
    context: Arc<ControllerContext>,
    server_state: Arc<ServerState>,
    config: &ControllerConfig,
) -> Result<(), anyhow::Error> {
    info!("Starting controller watch loop...");

    let backoff_ms = Arc::new(AtomicU64::new(WATCH_BACKOFF_START_MS));

    // Mark the server not ready as soon as SIGINT/SIGTERM arrives
    let shutdown_state = server_state.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_state.is_ready.store(false, Ordering::Relaxed);
    });

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );
        let _watch_guard = watch_span.enter();

        let backoff = backoff_ms.clone();
        let reset_backoff = backoff_ms.clone();
        let restart_delay = config.watch_restart_delay();
        Controller::new(
            repositories.clone(),
            watcher::Config::default().any_semantic(),
        )
        .with_config(controller::Config::default().concurrency(config.max_concurrent_reconciliations))
        .shutdown_on_signal()
        .run(reconcile_resource, handle_reconciliation_error, context.clone())
        .filter_map(move |result| {
            let backoff = backoff.clone();
            async move {
                match result {
                    // Reconcile failures are handled by the error policy
                    Ok(_) | Err(controller::Error::ReconcilerFailed(..)) => Some(result),
                    Err(e) => {
                        let keep = handle_watch_stream_error(
                            &format!("{e:?}"),
                            &backoff,
                            WATCH_BACKOFF_MAX_MS,
                            restart_delay,
                        )
                        .await;
                        // Absorbed errors are dropped so the watcher can retry
                        keep.then_some(Err(e))
                    }
                }
            }
        })
        .for_each(move |result| {
            let backoff = reset_backoff.clone();
            async move {
                match result {
                    Ok((object_ref, action)) => {
                        backoff.store(WATCH_BACKOFF_START_MS, Ordering::Relaxed);
                        debug!(resource = %object_ref, action = ?action, "watch.event.reconciled");
                    }
                    Err(controller::Error::ReconcilerFailed(error, object_ref)) => {
                        debug!(resource = %object_ref, error = %error, "watch.event.reconciliation_failed");
                    }
                    Err(e) => {
                        warn!(error = %e, "watch.event.stream_error");
                    }
                }
            }
        })
        .await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Run one reconcile cycle for a watched repository
///
/// Events caused by our own status writes are skipped until the key is due.
pub async fn reconcile_resource(
    obj: Arc<ImageRepository>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcilerError> {
    let key = ObjectKey::from_resource(&obj);
    let revision = Revision::of(&obj);
    let now = tokio::time::Instant::now();

    match ctx.gate.check(&key, &revision, now) {
        GateDecision::Wait(remaining) => {
            debug!(resource = %key, remaining_secs = remaining.as_secs(), "Skipping status-only event, not yet due");
            return Ok(Action::requeue(remaining));
        }
        GateDecision::AwaitChange => {
            debug!(resource = %key, "Skipping status-only event, waiting for a spec change");
            return Ok(Action::await_change());
        }
        GateDecision::Run => {}
    }

    let outcome = ctx.reconciler.reconcile(&key).await?;
    ctx.backoff.reset(&key);
    if outcome.record_missing {
        ctx.gate.forget(&key);
        return Ok(Action::await_change());
    }
    ctx.gate.record(&key, revision, outcome.requeue_after, tokio::time::Instant::now());

    Ok(match outcome.requeue_after {
        Some(after) => {
            observability::metrics::increment_requeues_total(TriggerSource::ScanInterval.as_str());
            Action::requeue(after)
        }
        None => Action::await_change(),
    })
}
