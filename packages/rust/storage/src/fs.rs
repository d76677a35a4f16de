use std::path::Path;

use leadpipe_shared::{LeadPipeError, Result};
use serde::Serialize;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// Creates the parent directory when missing. The temp file is named
/// `.{file_name}.tmp` next to the target so the rename stays on one filesystem.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = parent {
        std::fs::create_dir_all(dir).map_err(|e| LeadPipeError::io(dir, e))?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LeadPipeError::Storage(format!("invalid file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| LeadPipeError::Storage(format!("failed to serialize {file_name}: {e}")))?;

    std::fs::write(&temp, json).map_err(|e| LeadPipeError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| LeadPipeError::io(path, e))?;
    Ok(())
}
