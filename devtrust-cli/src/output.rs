use anyhow::{Context, Result};
use std::path::Path;

/// Write `content` to `out` and describe it, or hand it back for printing
pub fn write_output(out: Option<&Path>, content: &str, label: &str) -> Result<String> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {parent:?}"))?;
            }
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {path:?}"))?;
            Ok(format!("{label} written to {}", path.display()))
        }
        None => Ok(content.to_string()),
    }
}
