// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

async fn start_test_server() -> String {
    let app = Router::new()
        .route("/a", get(|| async { "page a" }))
        .route("/b", get(|| async { StatusCode::NOT_FOUND.into_response() }))
        .route("/c", get(|| async { "page c" }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn settings(batch_size: usize) -> ScraperSettings {
    ScraperSettings {
        batch_size,
        cooldown_secs: 0,
        ..ScraperSettings::default()
    }
}

fn scraper(order: usize, batch_size: usize) -> Scraper {
    let profile = Profile::new("shop", 2);
    Scraper::new(&profile, "listing", order, Vec::new(), &settings(batch_size)).unwrap()
}

async fn run_with(scraper: Scraper, inputs: Vec<Package>) -> Vec<Package> {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    for package in inputs {
        in_tx.send(package).unwrap();
    }
    scraper.run(in_rx, out_tx).await.unwrap();

    let mut emitted = Vec::new();
    while let Ok(package) = out_rx.try_recv() {
        emitted.push(package);
    }
    emitted
}

#[tokio::test]
async fn test_failed_item_is_filtered_in_order() {
    let base = start_test_server().await;
    let urls = vec![
        json!(format!("{}/a", base)),
        json!(format!("{}/b", base)),
        json!(format!("{}/c", base)),
    ];

    let emitted = run_with(
        scraper(0, 200),
        vec![Package::new("shop", 0, urls, None), Package::sentinel("shop", 0)],
    )
    .await;

    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[0].data, vec![json!("page a"), json!("page c")]);
    assert_eq!(emitted[0].step_order_id, 0);
    assert_eq!(emitted[0].selectors, Some(SelectorsRef::for_step("shop", 0)));
    assert!(!emitted[0].closed_inbound);
    assert!(emitted[1].is_sentinel());
}

#[tokio::test]
async fn test_each_batch_becomes_a_package() {
    let base = start_test_server().await;
    let urls: Vec<Value> = (0..5).map(|_| json!(format!("{}/a", base))).collect();

    let emitted = run_with(
        scraper(0, 2),
        vec![Package::new("shop", 0, urls, None), Package::sentinel("shop", 0)],
    )
    .await;

    let sizes: Vec<usize> = emitted.iter().map(|p| p.data.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1, 0]);
    assert!(emitted[3].is_sentinel());
}

#[tokio::test]
async fn test_sentinel_is_restamped_with_own_position() {
    let emitted = run_with(scraper(2, 200), vec![Package::sentinel("shop", 1)]).await;

    assert_eq!(emitted, vec![Package::sentinel("shop", 2)]);
}

#[tokio::test]
async fn test_network_error_skips_batch_and_continues() {
    let base = start_test_server().await;
    let broken = Package::new("shop", 0, vec![json!("http://127.0.0.1:1/")], None);
    let healthy = Package::new("shop", 0, vec![json!(format!("{}/c", base))], None);

    let emitted = run_with(
        scraper(0, 200),
        vec![broken, healthy, Package::sentinel("shop", 0)],
    )
    .await;

    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[0].data, vec![json!("page c")]);
    assert!(emitted[1].is_sentinel());
}

#[tokio::test]
async fn test_aborted_batch_waits_for_cooldown() {
    let profile = Profile::new("shop", 2);
    let cooling = ScraperSettings {
        cooldown_secs: 1,
        ..settings(200)
    };
    let scraper = Scraper::new(&profile, "listing", 0, Vec::new(), &cooling).unwrap();
    let broken = Package::new("shop", 0, vec![json!("http://127.0.0.1:1/")], None);

    let started = std::time::Instant::now();
    let emitted = run_with(scraper, vec![broken, Package::sentinel("shop", 0)]).await;

    assert!(started.elapsed() >= std::time::Duration::from_secs(1));
    assert_eq!(emitted, vec![Package::sentinel("shop", 0)]);
}

#[tokio::test]
async fn test_verify_mode_reports_liveness() {
    let base = start_test_server().await;
    let urls = vec![json!(format!("{}/a", base)), json!(format!("{}/b", base))];

    let emitted = run_with(
        scraper(0, 200).with_mode(ScrapeMode::Verify),
        vec![Package::new("shop", 0, urls, None), Package::sentinel("shop", 0)],
    )
    .await;

    assert_eq!(emitted[0].data, vec![json!("active"), json!("inactive")]);
}

#[tokio::test]
async fn test_closed_inbound_without_sentinel_still_signals_end() {
    let (in_tx, in_rx) = mpsc::unbounded_channel::<Package>();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    drop(in_tx);

    scraper(1, 200).run(in_rx, out_tx).await.unwrap();

    assert_eq!(out_rx.try_recv().unwrap(), Package::sentinel("shop", 1));
}
