//! Fixed-radius source windows attached to located issues.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::core::types::Issue;

/// Read `radius` lines before and after `line` (1-indexed) from `file`.
///
/// Relative paths resolve against `root`. Missing files and out-of-range
/// lines yield an empty window.
pub fn read_context(root: &Path, file: &str, line: u32, radius: usize) -> Vec<String> {
    let path = Path::new(file);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(path = %path.display(), err = %err, "context source unavailable");
            return Vec::new();
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();

    let idx = (line.max(1) - 1) as usize;
    let lo = idx.saturating_sub(radius);
    let hi = lines.len().min(idx.saturating_add(radius).saturating_add(1));
    (lo..hi)
        .map(|i| format!("{}: {}", i + 1, lines[i]))
        .collect()
}

/// Attach a context window to every issue that points at a source line.
pub fn attach_context(issues: &mut [Issue], root: &Path, radius: usize) {
    for issue in issues.iter_mut() {
        let Some((file, line)) = issue.line_location() else {
            continue;
        };
        issue.context = read_context(root, file, line, radius);
    }
}
