//! # IRCTL CLI
//!
//! Command-line interface for the Image Reflector Controller.
//!
//! ## Usage
//!
//! ```bash
//! # List all ImageRepository resources
//! irctl list imagerepository
//!
//! # Show status of an ImageRepository
//! irctl status imagerepository podinfo --namespace apps
//!
//! # Suspend scanning
//! irctl suspend imgrepo podinfo
//!
//! # Resume scanning
//! irctl resume imgrepo podinfo
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kube::Client;

mod list;
mod status;
mod suspend;

/// Image Reflector Controller CLI
#[derive(Parser)]
#[command(name = "irctl")]
#[command(
    about = "Image Reflector Controller CLI",
    long_about = None,
    after_help = "\
Available resource types:
  imagerepository (or 'imgrepo') - ImageRepository resource

Examples:
  irctl list imagerepository
  irctl status imgrepo podinfo --namespace apps
  irctl suspend imgrepo podinfo
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to 'default', or all namespaces for list)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List ImageRepository resources
    List {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: ResourceType,
    },
    /// Show status of an ImageRepository resource
    Status {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: ResourceType,

        /// Name of the ImageRepository resource
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Suspend scanning for an ImageRepository resource
    Suspend {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: ResourceType,

        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Resume scanning for an ImageRepository resource
    Resume {
        #[arg(value_enum, value_name = "RESOURCE_TYPE")]
        resource_type: ResourceType,

        #[arg(value_name = "NAME")]
        name: String,
    },
}

/// Resource types supported by irctl
#[derive(Clone, Copy, ValueEnum)]
enum ResourceType {
    /// ImageRepository resource
    /// Short form: 'imgrepo'
    #[value(name = "imagerepository", alias = "imgrepo")]
    ImageRepository,
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "irctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::List {
            resource_type: ResourceType::ImageRepository,
        } => list::list_command(client, cli.namespace).await,
        Commands::Status {
            resource_type: ResourceType::ImageRepository,
            name,
        } => status::status_command(client, name, cli.namespace).await,
        Commands::Suspend {
            resource_type: ResourceType::ImageRepository,
            name,
        } => suspend::set_suspended(client, name, cli.namespace, true).await,
        Commands::Resume {
            resource_type: ResourceType::ImageRepository,
            name,
        } => suspend::set_suspended(client, name, cli.namespace, false).await,
    }
}
