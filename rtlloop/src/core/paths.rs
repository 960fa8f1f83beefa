//! Deterministic safety checks for generated file paths.

use std::path::{Component, Path, PathBuf};

/// Rules a generated path must satisfy before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPolicy {
    /// Allowed extensions including the dot (e.g. `.v`).
    pub allowed_extensions: Vec<String>,
    pub forbid_testbench_edits: bool,
}

/// Heuristic: does this path look like a testbench file?
///
/// Matches `tb` anywhere, `/test/` or `/tests/` directories, and a `_tb`
/// stem suffix, case-insensitively.
pub fn looks_like_testbench(rel_path: &str) -> bool {
    let lower = rel_path.to_ascii_lowercase().replace('\\', "/");
    let padded = format!("/{lower}");
    let stem_is_tb = Path::new(&lower)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| stem.ends_with("_tb"));
    lower.contains("tb") || padded.contains("/test/") || padded.contains("/tests/") || stem_is_tb
}

/// Validate a generated relative path and return it normalized.
///
/// Rejects absolute paths, parent-directory components, disallowed
/// extensions, and (per policy) testbench paths.
pub fn validate_generated_path(rel_path: &str, policy: &PathPolicy) -> Result<PathBuf, String> {
    let trimmed = rel_path.trim();
    if trimmed.starts_with('/') || trimmed.starts_with('\\') {
        return Err(format!("unsafe absolute path: {trimmed}"));
    }
    let path = Path::new(trimmed);
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!("unsafe path traversal: {trimmed}"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("path escapes project root: {trimmed}"));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(format!("empty path: {trimmed:?}"));
    }

    let extension = normalized
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"));
    let allowed = extension.as_deref().is_some_and(|ext| {
        policy
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    });
    if !allowed {
        return Err(format!("disallowed file extension: {trimmed}"));
    }

    if policy.forbid_testbench_edits && looks_like_testbench(trimmed) {
        return Err(format!("testbench edits are forbidden: {trimmed}"));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PathPolicy {
        PathPolicy {
            allowed_extensions: vec![".v".to_string(), ".sv".to_string()],
            forbid_testbench_edits: true,
        }
    }

    #[test]
    fn accepts_plain_rtl_paths() {
        assert_eq!(
            validate_generated_path("rtl/top.v", &policy()),
            Ok(PathBuf::from("rtl/top.v"))
        );
        assert_eq!(
            validate_generated_path("./alu.SV", &policy()),
            Ok(PathBuf::from("alu.SV"))
        );
    }

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        let err = validate_generated_path("../outside.v", &policy()).unwrap_err();
        assert!(err.contains("traversal"));
        let err = validate_generated_path("rtl/../../x.v", &policy()).unwrap_err();
        assert!(err.contains("traversal"));
        let err = validate_generated_path("/etc/top.v", &policy()).unwrap_err();
        assert!(err.contains("absolute"));
    }

    #[test]
    fn rejects_disallowed_extensions() {
        let err = validate_generated_path("rtl/top.vhd", &policy()).unwrap_err();
        assert!(err.contains("extension"));
        let err = validate_generated_path("Makefile", &policy()).unwrap_err();
        assert!(err.contains("extension"));
    }

    #[test]
    fn rejects_testbench_paths_when_forbidden() {
        for path in ["tb.v", "rtl/counter_tb.sv", "sim/test/driver.v", "tests/x.v"] {
            let err = validate_generated_path(path, &policy()).unwrap_err();
            assert!(err.contains("testbench"), "{path}: {err}");
        }

        let permissive = PathPolicy {
            forbid_testbench_edits: false,
            ..policy()
        };
        assert!(validate_generated_path("tb.v", &permissive).is_ok());
    }

    #[test]
    fn testbench_heuristic() {
        assert!(looks_like_testbench("tb_top.v"));
        assert!(looks_like_testbench("rtl/TB/stim.v"));
        assert!(looks_like_testbench("test/foo.v"));
        assert!(!looks_like_testbench("rtl/alu.v"));
        assert!(!looks_like_testbench("rtl/contest.v"));
    }
}
