use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

use crate::document::{ConfigDocument, FieldKey, Location};

fn parse_crop(crop: &str) -> Option<[u32; 4]> {
    let mut out = [0u32; 4];
    let mut parts = crop.split('x');
    for slot in out.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    parts.next().is_none().then_some(out)
}

pub fn check_crops(crops: &[String]) -> Result<()> {
    anyhow::ensure!(!crops.is_empty(), "camera.crops must list at least one level");
    for (i, crop) in crops.iter().enumerate() {
        let [_, _, w, h] = parse_crop(crop)
            .with_context(|| format!("camera.crops[{}] = {:?} is not XxYxWxH", i, crop))?;
        anyhow::ensure!(w > 0 && h > 0, "camera.crops[{}] has zero width or height", i);
    }
    Ok(())
}

/// Majestic file must be readable and contain the target section. A missing
/// field is only a warning since the default level inserts it.
pub fn check_document(path: &Path, key: &FieldKey) -> Result<Location> {
    let doc = ConfigDocument::load(path)?;
    anyhow::ensure!(!doc.is_empty(), "{} is empty", path.display());
    let loc = doc.locate(key);
    anyhow::ensure!(
        loc.insert_row.is_some(),
        "section `{}` not found in {}",
        key.section,
        path.display()
    );
    if loc.field_row.is_none() {
        warn!("{}: `{}` has no `{}` field; it will be inserted on handshake", path.display(), key.section, key.field);
    }
    Ok(loc)
}
