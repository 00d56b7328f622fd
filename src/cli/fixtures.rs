//! Screen and device fixture files
//!
//! A fixture file is JSON or YAML holding either one element forest or a
//! full device description (`screens`, `transitions`, `failing`).

use std::path::Path;

use action_primitives::{FixtureDevice, FixtureFile, FixtureSpec};
use anyhow::{bail, Context, Result};
use perceiver_structural::{ElementDescriptor, ScreenSnapshot};
use tokio::fs;

pub async fn load_fixture(path: &Path) -> Result<FixtureSpec> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read screen file {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    let file: FixtureFile = if is_yaml {
        serde_yaml::from_str(&text)
            .with_context(|| format!("Invalid screen file {}", path.display()))?
    } else {
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid screen file {}", path.display()))?
    };
    let spec = FixtureSpec::from(file);
    if spec.screens.is_empty() {
        bail!("Screen file {} declares no screens", path.display());
    }
    Ok(spec)
}

pub async fn load_device(path: &Path) -> Result<FixtureDevice> {
    Ok(FixtureDevice::from_spec(load_fixture(path).await?))
}

/// One screen of a fixture file as an element forest
pub async fn load_screen(path: &Path, index: usize) -> Result<Vec<ElementDescriptor>> {
    let mut spec = load_fixture(path).await?;
    let count = spec.screens.len();
    if index >= count {
        bail!(
            "Screen index {} out of range; {} declares {} screen(s)",
            index,
            path.display(),
            count
        );
    }
    Ok(spec.screens.swap_remove(index))
}

pub async fn load_snapshot(path: &Path, index: usize) -> Result<ScreenSnapshot> {
    Ok(ScreenSnapshot::from_descriptors(&load_screen(path, index).await?))
}
