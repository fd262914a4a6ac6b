//! # Status Command
//!
//! Command to show detailed status of an ImageRepository resource.

use anyhow::{Context, Result};
use image_reflector_controller::crd::ImageRepository;
use kube::{api::Api, Client};

/// Show detailed status of an ImageRepository resource
pub async fn status_command(client: Client, name: String, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");

    println!("📊 Status for ImageRepository '{ns}/{name}'");
    println!();

    let api: Api<ImageRepository> = Api::namespaced(client, ns);

    let repo = api
        .get(&name)
        .await
        .with_context(|| format!("Failed to get ImageRepository '{ns}/{name}'"))?;

    println!("Resource Information:");
    println!(
        "  Name: {}",
        repo.metadata.name.as_deref().unwrap_or("<unknown>")
    );
    println!(
        "  Namespace: {}",
        repo.metadata.namespace.as_deref().unwrap_or("<unknown>")
    );
    if let Some(generation) = repo.metadata.generation {
        println!("  Generation: {generation}");
    }

    println!();
    println!("Spec:");
    println!("  Image: {}", repo.spec.image);
    println!(
        "  Scan Interval: {}",
        repo.spec.scan_interval.as_deref().unwrap_or("<default>")
    );
    if let Some(secret_ref) = &repo.spec.secret_ref {
        println!("  Secret Ref: {}", secret_ref.name);
    }
    println!("  Suspend: {}", repo.spec.suspend);

    let Some(status) = &repo.status else {
        println!();
        println!("Status: No status available (resource may not have been reconciled yet)");
        return Ok(());
    };

    println!();
    println!("Status:");
    if !status.canonical_image_name.is_empty() {
        println!("  Canonical Image Name: {}", status.canonical_image_name);
    }
    println!("  Observed Generation: {}", status.observed_generation);
    println!("  Tags Found: {}", status.last_scan_result.tag_count);

    if let Some(ready) = &status.ready {
        println!();
        println!("Conditions:");
        println!("  Ready: {}", ready.status);
        println!("    Reason: {}", ready.reason);
        println!("    Message: {}", ready.message);
        println!("    Last Transition: {}", ready.last_transition_time);
    }

    Ok(())
}
