//! `.f` file-list reader.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Entries of a file list, skipping blank lines and `#` comments.
pub fn parse_filelist(text: &str) -> Vec<PathBuf> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect()
}

pub fn read_filelist(path: &Path) -> Result<Vec<PathBuf>> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(parse_filelist(&text))
}

/// `listed` followed by every path of `extra` not already present.
pub fn merge_unique(listed: Vec<PathBuf>, extra: &[PathBuf]) -> Vec<PathBuf> {
    let mut merged = listed;
    for path in extra {
        if !merged.contains(path) {
            merged.push(path.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blanks_are_skipped() {
        let entries = parse_filelist("# rtl sources\nrtl/top.v\n\n  rtl/alu.v  \n#rtl/old.v\n");
        assert_eq!(
            entries,
            vec![PathBuf::from("rtl/top.v"), PathBuf::from("rtl/alu.v")]
        );
    }

    #[test]
    fn read_missing_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = read_filelist(&temp.path().join("rtl.f")).unwrap_err();
        assert!(err.to_string().contains("rtl.f"));
    }

    #[test]
    fn merge_keeps_listed_order_and_appends_new() {
        let merged = merge_unique(
            vec![PathBuf::from("a.v"), PathBuf::from("b.v")],
            &[PathBuf::from("b.v"), PathBuf::from("c.v")],
        );
        assert_eq!(
            merged,
            vec![
                PathBuf::from("a.v"),
                PathBuf::from("b.v"),
                PathBuf::from("c.v")
            ]
        );
    }
}
