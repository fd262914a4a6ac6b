//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, Kubernetes client setup and reconciler wiring.

use crate::config::ControllerConfig;
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::reconciler::Reconciler;
use crate::controller::registry::{HttpRegistryClient, RegistryGateway};
use crate::controller::server::{start_server, ServerState};
use crate::crd::ImageRepository;
use crate::observability;
use crate::store::{KubeRecordStore, KubeSecretStore, MemoryTagStore};
use anyhow::{anyhow, Context, Result};
use kube::{api::Api, api::ListParams, Client};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for `ImageRepository` resources across all namespaces
    pub repositories: Api<ImageRepository>,
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready.load(Ordering::Relaxed))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // Must happen before any TLS connection is opened
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    observability::logging::init_tracing(
        config.log_format,
        observability::logging::DEFAULT_LOG_FILTER,
    )?;

    info!("Starting Image Reflector Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        driver = ?config.driver,
        default_scan_interval_secs = config.default_scan_interval_secs,
        scan_timeout_secs = config.scan_timeout_secs,
        "Loaded controller configuration"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());

    let server_state_clone = server_state.clone();
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_server_ready(
        &server_state,
        &server_handle,
        Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS),
        Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS),
    )
    .await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let repositories: Api<ImageRepository> = Api::all(client.clone());

    let registry_client =
        HttpRegistryClient::new().context("Failed to build registry HTTP client")?;
    let reconciler = Reconciler::new(
        Arc::new(KubeRecordStore::new(client.clone())),
        Arc::new(KubeSecretStore::new(client.clone())),
        Arc::new(MemoryTagStore::new()),
        RegistryGateway::new(Arc::new(registry_client)),
    )
    .with_scan_timeout(config.scan_timeout())
    .with_default_scan_interval(config.default_scan_interval());

    log_existing_resources(&repositories).await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        repositories,
        reconciler: Arc::new(reconciler),
        server_state,
        config,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    startup_timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let start_time = tokio::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Log a per-namespace summary of repositories that exist at startup
///
/// The watch delivers every existing repository on its initial list, so
/// nothing is reconciled here. A failed list usually means the CRD is missing.
async fn log_existing_resources(repositories: &Api<ImageRepository>) {
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.existing_resources",
        operation = "log_existing_resources"
    );
    let _guard = span.enter();

    match repositories.list(&ListParams::default()).await {
        Ok(list) => {
            if list.items.is_empty() {
                info!("No existing ImageRepository resources found, watch will pick up new resources");
                return;
            }

            let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for item in &list.items {
                by_namespace
                    .entry(item.metadata.namespace.clone().unwrap_or_else(|| "default".to_string()))
                    .or_default()
                    .push(item.metadata.name.clone().unwrap_or_else(|| "unknown".to_string()));
            }

            info!("Image Reflector Controller - Startup Resource Summary");
            info!("Total Resources: {}", list.items.len());
            info!("Namespaces: {}", by_namespace.len());
            for (namespace, names) in &mut by_namespace {
                names.sort();
                let shown = if names.len() <= 3 {
                    names.join(", ")
                } else {
                    format!("{}, ... ({} total)", names[..3].join(", "), names.len())
                };
                info!("Namespace: {}", namespace);
                info!("  Resources ({}): {}", names.len(), shown);
            }
        }
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - controller will retry");
        }
    }
}
