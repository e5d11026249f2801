// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{books_definition, scraper_settings, start_bookstore, EngineHarness};
use crowrs::infrastructure::repositories::sqlite_sink::SqliteSink;
use crowrs::queue::transport::{StreamSink, StreamSource};
use sqlx::sqlite::SqlitePoolOptions;
use std::io::{BufReader, BufWriter};
use std::process::{Command, Stdio};
use std::sync::Arc;

#[tokio::test]
async fn test_extractor_process_round_trip_into_sqlite() {
    let base = start_bookstore().await;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let sink = Arc::new(SqliteSink::new(pool.clone()));

    let mut child = Command::new(env!("CARGO_BIN_EXE_crowrs-extractor"))
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .unwrap();
    let stdin = child.stdin.take().unwrap();
    let stdout = child.stdout.take().unwrap();

    let harness = EngineHarness::start(
        5,
        Box::new(StreamSink::new(BufWriter::new(stdin))),
        Box::new(StreamSource::new(BufReader::new(stdout))),
        sink,
    );
    let pipeline = books_definition("books", &base)
        .into_pipeline(&scraper_settings())
        .unwrap();
    harness.engine.submit(pipeline).unwrap();
    harness.wait_until_idle().await;
    harness.stop().await;

    let status = tokio::task::spawn_blocking(move || child.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(status.success());

    let rows: Vec<(String, String)> =
        sqlx::query_as(r#"SELECT title, price FROM "books" ORDER BY title"#)
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(
        rows,
        vec![
            ("Dune".to_string(), "12".to_string()),
            ("Emma".to_string(), "9".to_string()),
        ]
    );
}
