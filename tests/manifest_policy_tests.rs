#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests for Guess Duel Client.
//!
//! These tests read `Cargo.toml` and fail if the panic-free lint set, the
//! feature layout or the demo registrations drift.

use std::path::PathBuf;

fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn read_project_file(relative_path: &str) -> String {
    let path = project_root().join(relative_path);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {}", path.display(), e))
}

const REQUIRED_DENY_LINTS: &[&str] = &[
    "unwrap_used",
    "expect_used",
    "panic",
    "todo",
    "unimplemented",
    "indexing_slicing",
];

#[test]
fn cargo_toml_has_all_panic_free_lints() {
    let cargo = read_project_file("Cargo.toml");
    assert!(
        cargo.contains("[lints.clippy]"),
        "Cargo.toml is missing the [lints.clippy] section."
    );
    for lint in REQUIRED_DENY_LINTS {
        let pattern = format!("{lint} = \"deny\"");
        assert!(
            cargo.contains(&pattern),
            "Cargo.toml is missing `{pattern}` in [lints.clippy]."
        );
    }
}

#[test]
fn cargo_toml_declares_msrv() {
    let cargo = read_project_file("Cargo.toml");
    assert!(
        cargo.lines().any(|l| l.starts_with("rust-version = \"")),
        "Cargo.toml must declare a quoted rust-version."
    );
}

#[test]
fn default_features_enable_http_lobby_and_websocket() {
    let cargo = read_project_file("Cargo.toml");
    let default_line = cargo
        .lines()
        .find(|l| l.starts_with("default = "))
        .expect("Cargo.toml must declare default features");
    assert!(default_line.contains("\"transport-websocket\""));
    assert!(default_line.contains("\"lobby-http\""));
}

#[test]
fn registered_demos_exist() {
    let cargo = read_project_file("Cargo.toml");
    let demo_paths: Vec<&str> = cargo
        .lines()
        .filter_map(|l| l.strip_prefix("path = \"demos/"))
        .map(|rest| rest.trim_end_matches('"'))
        .collect();
    assert!(!demo_paths.is_empty(), "no demos registered in Cargo.toml");
    for file in demo_paths {
        let path = project_root().join("demos").join(file);
        assert!(path.is_file(), "registered demo {} is missing", path.display());
    }
}
