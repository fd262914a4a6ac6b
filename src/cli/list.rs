//! # List Command
//!
//! Command to list ImageRepository resources.

use anyhow::{Context, Result};
use image_reflector_controller::crd::ImageRepository;
use kube::{api::Api, api::ListParams, Client};

/// List ImageRepository resources in one namespace or all of them
pub async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<ImageRepository> = if let Some(ns) = &namespace {
        println!("Listing ImageRepository resources in namespace '{ns}'...");
        Api::namespaced(client, ns)
    } else {
        println!("Listing ImageRepository resources in all namespaces...");
        Api::all(client)
    };

    let repositories = api
        .list(&ListParams::default())
        .await
        .context("Failed to list ImageRepository resources")?;

    if repositories.items.is_empty() {
        println!("No ImageRepository resources found.");
        return Ok(());
    }

    println!(
        "\n{:<30} {:<20} {:<9} {:<8} {:<6} {:<40}",
        "NAME", "NAMESPACE", "SUSPEND", "READY", "TAGS", "IMAGE"
    );
    println!("{}", "-".repeat(118));

    for repo in &repositories.items {
        println!("{}", table_row(repo));
    }

    Ok(())
}

fn table_row(repo: &ImageRepository) -> String {
    let name = repo.metadata.name.as_deref().unwrap_or("<unknown>");
    let ns = repo.metadata.namespace.as_deref().unwrap_or("<unknown>");
    let suspend = if repo.spec.suspend { "Yes" } else { "No" };
    let ready = repo
        .status
        .as_ref()
        .and_then(|s| s.ready.as_ref())
        .map_or("Unknown", |c| c.status.as_str());
    let tags = repo
        .status
        .as_ref()
        .filter(|s| s.ready.is_some())
        .map_or_else(|| "-".to_string(), |s| s.last_scan_result.tag_count.to_string());
    let image = &repo.spec.image;

    format!("{name:<30} {ns:<20} {suspend:<9} {ready:<8} {tags:<6} {image:<40}")
}
