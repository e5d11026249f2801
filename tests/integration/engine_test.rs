// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{books_definition, scraper_settings, start_bookstore, EngineHarness};
use crowrs::infrastructure::repositories::memory_sink::MemorySink;
use serde_json::{json, Value};
use std::sync::Arc;

fn sorted_rows(sink: &MemorySink, name: &str) -> Vec<Value> {
    let mut rows: Vec<Value> = sink.rows(name).into_iter().map(Value::Object).collect();
    rows.sort_by(|a, b| a["title"].as_str().cmp(&b["title"].as_str()));
    rows
}

#[tokio::test]
async fn test_two_stage_pipeline_stores_detail_records() {
    let base = start_bookstore().await;
    let sink = Arc::new(MemorySink::new());
    let harness = EngineHarness::in_process(5, sink.clone());

    let pipeline = books_definition("books", &base)
        .into_pipeline(&scraper_settings())
        .unwrap();
    harness.engine.submit(pipeline).unwrap();
    harness.wait_until_idle().await;

    assert!(sink.is_finished("books"));
    assert_eq!(
        sink.columns("books"),
        Some(vec!["title".to_string(), "price".to_string()])
    );
    assert_eq!(
        sorted_rows(&sink, "books"),
        vec![
            json!({"title": "Dune", "price": "12"}),
            json!({"title": "Emma", "price": "9"}),
        ]
    );
    harness.stop().await;
}

#[tokio::test]
async fn test_pipelines_share_one_extractor() {
    let base = start_bookstore().await;
    let sink = Arc::new(MemorySink::new());
    let harness = EngineHarness::in_process(2, sink.clone());

    let names = ["alpha", "beta", "gamma", "delta"];
    for name in names {
        let pipeline = books_definition(name, &base)
            .into_pipeline(&scraper_settings())
            .unwrap();
        harness.engine.submit(pipeline).unwrap();
    }
    assert!(harness.engine.active_count() <= 2);
    harness.wait_until_idle().await;

    for name in names {
        assert!(sink.is_finished(name), "{} did not finish", name);
        let titles: Vec<Value> = sorted_rows(&sink, name)
            .into_iter()
            .map(|row| row["title"].clone())
            .collect();
        assert_eq!(titles, vec![json!("Dune"), json!("Emma")]);
    }
    assert_eq!(harness.engine.active_count(), 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_unreachable_seed_still_finishes() {
    let sink = Arc::new(MemorySink::new());
    let harness = EngineHarness::in_process(5, sink.clone());

    let pipeline = books_definition("offline", "http://127.0.0.1:1")
        .into_pipeline(&scraper_settings())
        .unwrap();
    harness.engine.submit(pipeline).unwrap();
    harness.wait_until_idle().await;

    assert!(sink.is_finished("offline"));
    assert!(sink.rows("offline").is_empty());
    harness.stop().await;
}
