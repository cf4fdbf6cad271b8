//! Filesystem helpers for tests.

use std::path::PathBuf;

/// Returns the workspace root directory.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    // test-utils lives at crates/test-utils
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .map(PathBuf::from)
        .unwrap_or(manifest_dir)
}

/// Example configuration shipped with the CLI.
pub fn example_config_path() -> PathBuf {
    workspace_root()
        .join("services")
        .join("pipecast")
        .join("config")
        .join("pipecast.yaml")
}

/// Preset configuration `<name>.yaml` shipped next to the example.
pub fn preset_config_path(name: &str) -> PathBuf {
    example_config_path().with_file_name(format!("{}.yaml", name))
}

/// Creates a temporary directory for test output, removed on drop.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates a temporary directory with a specific prefix.
pub fn temp_test_dir_with_prefix(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root_is_valid() {
        let root = workspace_root();
        assert!(
            root.join("Cargo.toml").exists(),
            "Workspace root should contain Cargo.toml: {:?}",
            root
        );
    }

    #[test]
    fn test_temp_test_dir_with_prefix() {
        let dir = temp_test_dir_with_prefix("pipecast_test_");
        assert!(dir.path().to_string_lossy().contains("pipecast_test_"));
    }
}
