//! Workspace members share one version, and the internal dependency pins
//! in the root manifest follow it.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn manifest(dir: &Path) -> toml::Value {
    std::fs::read_to_string(dir.join("Cargo.toml"))
        .unwrap()
        .parse()
        .unwrap()
}

fn members(root: &toml::Value) -> Vec<String> {
    root["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap().to_string())
        .collect()
}

/// Test: every member inherits the workspace version
#[test]
fn test_members_inherit_workspace_version() {
    let root_dir = workspace_root();
    let root = manifest(&root_dir);

    for member in members(&root) {
        let doc = manifest(&root_dir.join(&member));
        let inherited = doc["package"]["version"]
            .get("workspace")
            .and_then(|v| v.as_bool());
        assert_eq!(inherited, Some(true), "{member} pins its own version");
    }
}

/// Test: internal crate pins match the workspace version
#[test]
fn test_internal_pins_match_workspace_version() {
    let root = manifest(&workspace_root());
    let version = root["workspace"]["package"]["version"].as_str().unwrap();
    let deps = &root["workspace"]["dependencies"];

    for name in ["complog-store", "complog-core"] {
        let pinned = deps[name]["version"].as_str().unwrap();
        assert_eq!(pinned, version, "{name} is pinned to {pinned}");
    }
}

/// Test: the exported version string is the package version
#[test]
fn test_exported_version_matches_package() {
    let root = manifest(&workspace_root());
    let version = root["workspace"]["package"]["version"].as_str().unwrap();
    assert_eq!(complog_core::VERSION, version);
    assert_eq!(env!("CARGO_PKG_VERSION"), version);
}
