//! # Image Reflector Controller
//!
//! Watches `ImageRepository` resources and records the tags available for each
//! image in its registry.

use anyhow::Result;
use image_reflector_controller::config::{ControllerConfig, ReconcileDriver};
use image_reflector_controller::runtime::context::{BackoffTracker, ControllerContext};
use image_reflector_controller::runtime::dispatch::run_dispatcher;
use image_reflector_controller::runtime::initialization::initialize;
use image_reflector_controller::runtime::watch_loop::run_watch_loop;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize(ControllerConfig::from_env()).await?;

    let backoff = BackoffTracker::new(init.config.backoff_start_secs, init.config.backoff_max_secs);

    match init.config.driver {
        ReconcileDriver::Controller => {
            let context = Arc::new(ControllerContext::new(init.reconciler.clone(), backoff));
            run_watch_loop(init.repositories, context, init.server_state, &init.config).await
        }
        ReconcileDriver::Dispatcher => {
            run_dispatcher(init.repositories, init.reconciler, backoff, init.server_state).await
        }
    }
}
