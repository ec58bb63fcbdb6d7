//! Integration tests for the trademark-pages CLI
//!
//! These tests run the actual binary, offline, against the fixture pages.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get the binary to test
fn pages_cmd() -> Command {
    let mut cmd = Command::cargo_bin("trademark-pages").unwrap();
    cmd.env("NO_COLOR", "1")
        .env_remove("TRADEMARK_PAGES_ORIGIN")
        .env_remove("TRADEMARK_PAGES_BASE_URL");
    cmd
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[test]
fn test_help_flag() {
    pages_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("trademark search pages"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_render_help() {
    pages_cmd()
        .args(["render", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--offline"))
        .stdout(predicate::str::contains("--query"));
}

// ============================================================================
// Render
// ============================================================================

#[test]
fn test_render_offline_binds_snapshot() {
    pages_cmd()
        .arg("render")
        .arg(fixture("search.html"))
        .arg("--offline")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"data-trademark-id="T1""#))
        .stdout(predicate::str::contains("status-pending"))
        .stdout(predicate::str::contains("Đang tải...").not())
        .stderr(predicate::str::contains("data: fallback"));
}

#[test]
fn test_render_to_file() {
    let temp_dir = TempDir::new().unwrap();
    let out = temp_dir.path().join("home.out.html");

    pages_cmd()
        .arg("render")
        .arg(fixture("home.html"))
        .arg("--offline")
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("Wrote"));

    let html = fs::read_to_string(&out).unwrap();
    assert!(html.contains("Tra cứu nhãn hiệu Việt Nam"));
    assert!(html.contains(r#"data-action="view-article""#));
}

#[test]
fn test_render_detail_with_forced_kind() {
    let temp_dir = TempDir::new().unwrap();
    let page = temp_dir.path().join("bare.html");
    fs::write(&page, "<html><body><h1 data-bind=\"trademarkName\">?</h1></body></html>").unwrap();

    // No template element: detection fails without --page
    pages_cmd()
        .arg("render")
        .arg(&page)
        .arg("--offline")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TMP-0"));

    pages_cmd()
        .arg("render")
        .arg(&page)
        .args(["--offline", "--page", "trademark", "--id", "T1"])
        .assert()
        .success()
        .stderr(predicate::str::contains("data: empty"));
}

// ============================================================================
// Click and upload
// ============================================================================

#[test]
fn test_click_bookmark_offline_reports_failure() {
    pages_cmd()
        .arg("click")
        .arg(fixture("search.html"))
        .arg(".bookmark-btn")
        .arg("--offline")
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""outcome": "failed""#))
        .stderr(predicate::str::contains("Không thể lưu nhãn hiệu"));
}

#[test]
fn test_click_copy_prints_effect() {
    pages_cmd()
        .arg("click")
        .arg(fixture("trademark.html"))
        .arg(".copy-btn")
        .arg("--offline")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""type": "copy_to_clipboard""#))
        .stdout(predicate::str::contains("4-2019-00001"));
}

#[test]
fn test_click_missing_element() {
    pages_cmd()
        .arg("click")
        .arg(fixture("home.html"))
        .arg("#nope")
        .arg("--offline")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("#nope"));
}

#[test]
fn test_upload_rejects_unsupported_image() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("logo.bmp");
    fs::write(&image, b"BM fake").unwrap();

    pages_cmd()
        .arg("upload")
        .arg(fixture("home.html"))
        .arg(&image)
        .arg("--offline")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Vui lòng chọn đúng định dạng hình ảnh!"));

    pages_cmd()
        .arg("upload")
        .arg(fixture("search.html"))
        .arg(&image)
        .arg("--offline")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Chỉ hỗ trợ file JPG, PNG, GIF."));
}

// ============================================================================
// Validate
// ============================================================================

#[test]
fn test_validate_fixtures_dir() {
    pages_cmd()
        .arg("validate")
        .arg(fixture(""))
        .assert()
        .success()
        .stdout(predicate::str::contains("(home)"))
        .stdout(predicate::str::contains("(search)"))
        .stdout(predicate::str::contains("(trademark)"))
        .stdout(predicate::str::contains("Pages checked: 3"));
}

#[test]
fn test_validate_broken_page() {
    let temp_dir = TempDir::new().unwrap();
    let page = temp_dir.path().join("broken.html");
    fs::write(
        &page,
        r#"<html><head><script type="application/json" id="api-config">{"baseUrl": </script></head>
<body>
<button data-action="launch-rockets">Go</button>
<button data-action="export">Export</button>
<script type="application/json" id="home-data-template">{"hero": </script>
</body></html>"#,
    )
    .unwrap();

    pages_cmd()
        .arg("validate")
        .arg(&page)
        .assert()
        .failure()
        .stdout(predicate::str::contains("✗"))
        .stdout(predicate::str::contains("TMP-0"))
        .stdout(predicate::str::contains("#home-data-template is not valid JSON"))
        .stdout(predicate::str::contains("unknown action 'launch-rockets'"))
        .stdout(predicate::str::contains("action 'export' has no handler on this page"));
}

#[test]
fn test_validate_skips_other_html() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("about.html"), "<html><body>hi</body></html>").unwrap();

    pages_cmd()
        .arg("validate")
        .arg(temp_dir.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("skipped"))
        .stderr(predicate::str::contains("Error:"));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_shows_endpoint_urls() {
    pages_cmd()
        .arg("config")
        .arg(fixture("home.html"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Base URL: /api"))
        .stdout(predicate::str::contains("http://localhost:8080/api/search"))
        .stdout(predicate::str::contains("http://localhost:8080/api/trademark/ID"));
}

#[test]
fn test_config_settings_override_base_url() {
    let temp_dir = TempDir::new().unwrap();
    let settings = temp_dir.path().join("settings.yaml");
    fs::write(
        &settings,
        "origin: https://tracuu.example.vn\nbase_url: https://api.example.vn/v2\n",
    )
    .unwrap();

    pages_cmd()
        .arg("config")
        .arg(fixture("trademark.html"))
        .arg("--settings")
        .arg(&settings)
        .assert()
        .success()
        .stdout(predicate::str::contains("Base URL: https://api.example.vn/v2"))
        .stdout(predicate::str::contains("https://api.example.vn/v2/bookmarks"));
}
