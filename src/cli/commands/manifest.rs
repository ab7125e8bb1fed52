use std::path::Path;

use anyhow::Context;

use crate::config::Settings;
use crate::manifest::{Manifest, ManifestOptions};

/// Scan the workspace and print the manifest as JSON.
pub fn run(root: &Path, settings: &Settings) -> anyhow::Result<()> {
    let manifest = Manifest::load_with(root, &ManifestOptions::from(settings))
        .with_context(|| format!("loading workspace at {}", root.display()))?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}
