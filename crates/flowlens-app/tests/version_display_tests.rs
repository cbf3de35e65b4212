//! Integration tests for VERSION propagation into the banner and `--version`.

use std::fs;

use clap::CommandFactory;
use flowlens_app::{AppConfig, app_version};

fn root_version() -> String {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../VERSION");
    fs::read_to_string(path)
        .expect("VERSION should be readable")
        .trim()
        .to_string()
}

#[test]
fn version_display_tests_matches_root_version_file() {
    assert_eq!(app_version(), root_version());
}

#[test]
fn version_display_tests_cli_reports_same_version() {
    let command = AppConfig::command();
    assert_eq!(command.get_version(), Some(root_version().as_str()));
}
