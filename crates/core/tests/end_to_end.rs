//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

//! End-to-end integration tests spanning package build/read and the hybrid
//! authenticator, exercising the full data flows described for the security
//! core rather than any single module in isolation.

use std::fs;
use std::path::Path;

use aipk_core::builder::{create_package, BuildOptions, Compression};
use aipk_core::reader::PackageReader;
use aipk_core::{AuthState, HybridAuthenticator, IdentityClient, Vault};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path as wiremock_path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_chart(dir: &Path, airport: &str, category: &str, filename: &str, body: &[u8]) {
    let cat_dir = dir.join(airport).join(category);
    fs::create_dir_all(&cat_dir).unwrap();
    fs::write(cat_dir.join(filename), body).unwrap();
}

#[test]
fn build_then_open_full_round_trip_across_multiple_airports_and_categories() {
    let src = TempDir::new().unwrap();
    let sid_body = b"%PDF-1.4\nSID chart contents\n%%EOF\n".to_vec();
    let iac_body = b"%PDF-1.4\nIAC chart contents\n%%EOF\n".to_vec();
    let star_body = b"%PDF-1.4\nSTAR chart contents\n%%EOF\n".to_vec();

    write_chart(
        src.path(),
        "ZBAA",
        "SID",
        "ZBAA-7A01-SID RNAV RWY01-36L-36R(IDKEX).pdf",
        &sid_body,
    );
    write_chart(src.path(), "ZBAA", "IAC", "ZBAA-9A02-ILS RWY18(VOR).pdf", &iac_body);
    write_chart(src.path(), "ZSSS", "STAR", "plain-name.pdf", &star_body);

    let out_dir = TempDir::new().unwrap();
    let out_path = out_dir.path().join("multi-airport.aipk");

    let stats = create_package(
        src.path(),
        &out_path,
        BuildOptions {
            password: "TestPassword123!".to_string(),
            compression: Compression::Gzip,
            level: 6,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.airports_count, 2);

    let mut reader = PackageReader::open(&out_path, "TestPassword123!").unwrap();
    assert_eq!(reader.list().len(), 3);

    let sid_entry = reader
        .list()
        .iter()
        .find(|e| e.category == "SID")
        .unwrap()
        .id
        .clone();
    assert_eq!(reader.open_entry(&sid_entry).unwrap(), sid_body);

    let star_entry = reader
        .list()
        .iter()
        .find(|e| e.category == "STAR")
        .unwrap()
        .id
        .clone();
    assert_eq!(reader.open_entry(&star_entry).unwrap(), star_body);
}

#[test]
fn no_compression_round_trip_preserves_plaintext_with_high_ratio() {
    let src = TempDir::new().unwrap();
    let body = format!("%PDF-1.4\n{}\n%%EOF\n", "Test content line\n".repeat(1000));
    write_chart(
        src.path(),
        "ZBAA",
        "SID",
        "ZBAA-7A01-SID RNAV RWY01-36L-36R(IDKEX).pdf",
        body.as_bytes(),
    );

    let out_dir = TempDir::new().unwrap();
    let out_path = out_dir.path().join("uncompressed.aipk");

    let stats = create_package(
        src.path(),
        &out_path,
        BuildOptions {
            password: "TestPassword123!".to_string(),
            compression: Compression::None,
            ..Default::default()
        },
    )
    .unwrap();

    assert!(stats.compression_ratio > 0.95);

    let mut reader = PackageReader::open(&out_path, "TestPassword123!").unwrap();
    let id = reader.list()[0].id.clone();
    assert_eq!(reader.open_entry(&id).unwrap(), body.as_bytes());
}

#[tokio::test]
async fn authenticate_online_then_offline_after_server_goes_dark() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(wiremock_path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(wiremock_path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "token": "jwt-xyz",
            "user": {"username": "pilot", "email": "pilot@example.com", "permissions": ["read"]}
        })))
        .mount(&server)
        .await;

    let cache_dir = TempDir::new().unwrap();
    let server_uri = server.uri();
    let cache_path = cache_dir.path().to_path_buf();

    let first_run_ok = tokio::task::spawn_blocking({
        let cache_path = cache_path.clone();
        let server_uri = server_uri.clone();
        move || {
            let mut auth = HybridAuthenticator::new(
                IdentityClient::new(server_uri, "1.0.0"),
                Vault::open(&cache_path, 7).unwrap(),
                "Aviation2025!ComplexDistributionPassword",
            );
            let ok = auth.authenticate("pilot", "Aviation2025!");
            assert_eq!(auth.state(), AuthState::Online);
            ok
        }
    })
    .await
    .unwrap();
    assert!(first_run_ok);

    // Server is now unreachable; a fresh authenticator must fall back offline.
    let (offline_ok, wrong_password_ok) = tokio::task::spawn_blocking(move || {
        let mut auth = HybridAuthenticator::new(
            IdentityClient::new("http://127.0.0.1:1", "1.0.0"),
            Vault::open(&cache_path, 7).unwrap(),
            "Aviation2025!ComplexDistributionPassword",
        );
        let ok = auth.authenticate("pilot", "Aviation2025!");
        assert_eq!(auth.state(), AuthState::Offline);
        assert!(auth.get_distribution_password().is_ok());
        auth.logout();
        assert_eq!(auth.state(), AuthState::Unauthenticated);

        let mut auth_wrong = HybridAuthenticator::new(
            IdentityClient::new("http://127.0.0.1:1", "1.0.0"),
            Vault::open(&cache_path, 7).unwrap(),
            "Aviation2025!ComplexDistributionPassword",
        );
        let wrong_ok = auth_wrong.authenticate("pilot", "definitely-wrong");
        (ok, wrong_ok)
    })
    .await
    .unwrap();

    assert!(offline_ok);
    assert!(!wrong_password_ok);
}
