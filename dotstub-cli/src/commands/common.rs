use std::path::Path;

use anyhow::Context;
use dotstub::{Assembly, AssemblyReader, PeImage};

/// Load an assembly image.
pub fn load_assembly(path: &Path) -> anyhow::Result<Assembly> {
    PeImage
        .read_file(path)
        .with_context(|| format!("failed to load assembly: {}", path.display()))
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
