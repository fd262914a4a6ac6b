//! # Suspend/Resume Commands
//!
//! Commands to suspend and resume scanning for ImageRepository resources.

use anyhow::{Context, Result};
use image_reflector_controller::crd::ImageRepository;
use kube::{api::Api, api::Patch, api::PatchParams, Client};
use serde_json::json;

/// Set `spec.suspend` on an ImageRepository resource
pub async fn set_suspended(
    client: Client,
    name: String,
    namespace: Option<String>,
    suspend: bool,
) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    let verb = if suspend { "suspend" } else { "resume" };

    if suspend {
        println!("⏸️  Suspending scans for ImageRepository '{ns}/{name}'...");
    } else {
        println!("▶️  Resuming scans for ImageRepository '{ns}/{name}'...");
    }

    let api: Api<ImageRepository> = Api::namespaced(client, ns);

    let resource = api
        .get(&name)
        .await
        .with_context(|| format!("Failed to get ImageRepository '{ns}/{name}'"))?;

    if resource.spec.suspend == suspend {
        if suspend {
            println!("   ℹ️  Resource is already suspended");
        } else {
            println!("   ℹ️  Resource is already active (not suspended)");
        }
        return Ok(());
    }

    let patch = json!({
        "spec": {
            "suspend": suspend
        }
    });

    api.patch(&name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to {verb} ImageRepository '{ns}/{name}'"))?;

    if suspend {
        println!("✅ Scanning suspended successfully");
        println!("   Resource: {ns}/{name}");
        println!("\nTo resume scanning, run:");
        println!("   irctl resume imagerepository {name} --namespace {ns}");
    } else {
        println!("✅ Scanning resumed successfully");
        println!("   Resource: {ns}/{name}");
        println!("\nThe controller will scan this repository shortly.");
    }

    Ok(())
}
