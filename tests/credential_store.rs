//! Credential-store scenarios against an on-disk sqlite file.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::str_to_string)]

use std::sync::Arc;

use tokio::sync::watch;

use vqd::config::WorkerConfig;
use vqd::db;
use vqd::models::NewEndpoint;
use vqd::worker::{RestClientFactory, run_manager};

#[tokio::test]
async fn store_survives_reopening_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vqd.db");
    let url = path.to_str().expect("utf-8 path").to_string();

    {
        let mut conn = db::establish(&url).await.expect("open store");
        db::run_migrations(&mut conn).await.expect("migrate");
        let new = NewEndpoint {
            host: "vc01.example.org",
            user: "svc-query",
            pwd: "secret",
            enabled: 1,
        };
        db::add_update_endpoint(&mut conn, &new)
            .await
            .expect("add endpoint");
    }

    let mut conn = db::establish(&url).await.expect("reopen store");
    db::run_migrations(&mut conn).await.expect("migrations idempotent");
    let endpoints = db::get_endpoints(&mut conn, true).await.expect("list");
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].host, "vc01.example.org");
    assert_eq!(endpoints[0].user, "svc-query");
}

#[tokio::test]
async fn manager_refuses_to_start_without_enabled_endpoints() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("empty.db");

    let config = WorkerConfig {
        db: path.to_str().expect("utf-8 path").to_string(),
        ..WorkerConfig::default()
    };
    let (tx, rx) = watch::channel(false);
    let result = run_manager(config, Arc::new(RestClientFactory), tx, rx).await;

    let error = result.expect_err("startup must fail");
    assert!(
        error.to_string().contains("no registered or enabled"),
        "{error}"
    );
}
