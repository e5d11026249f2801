// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use crowrs::config::settings::{EngineSettings, ScraperSettings};
use crowrs::domain::models::definition::PipelineDefinition;
use crowrs::domain::repositories::persistence::PersistenceSink;
use crowrs::engines::async_engine::AsyncEngine;
use crowrs::engines::sync_engine::SyncEngine;
use crowrs::queue::transport::{channel, FrameSink, FrameSource};
use crowrs::utils::errors::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const LISTING: &str = r#"<html><body>
<a class="book" href="/book/1">Dune</a>
<a class="book" href="/book/2">Emma</a>
<a class="book" href="/book/3">Gone</a>
</body></html>"#;

/// 启动一个本地书店站点，第3本书返回404
pub async fn start_bookstore() -> String {
    let app = Router::new()
        .route("/", get(|| async { LISTING }))
        .route(
            "/book/1",
            get(|| async { "<html><body><h1>Dune</h1><p class=\"price\">$12</p></body></html>" }),
        )
        .route(
            "/book/2",
            get(|| async { "<html><body><h1>Emma</h1><p class=\"price\">$9</p></body></html>" }),
        )
        .route("/book/3", get(|| async { StatusCode::NOT_FOUND.into_response() }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// 两步流水线：列表页提取详情链接，详情页提取书名与价格
pub fn books_definition(name: &str, base: &str) -> PipelineDefinition {
    let raw = format!(
        r#"
profile:
  name: {name}
  burst_rate: 2
steps:
  - name: listing
    initial_url: {base}/
    selectors:
      - name: links
        type: regex
        method: all
        directive: 'href="(/book/\d+)"'
        post_processor:
          op: format
          template: "{base}{{}}"
  - name: detail
    selectors:
      - name: title
        type: css
        directive: h1
        required: true
      - name: price
        type: regex
        directive: '\$(\d+)'
"#
    );
    PipelineDefinition::from_yaml(&raw).unwrap()
}

pub fn scraper_settings() -> ScraperSettings {
    ScraperSettings {
        batch_size: 2,
        cooldown_secs: 0,
        request_timeout_secs: 5,
        ..ScraperSettings::default()
    }
}

pub struct EngineHarness {
    pub engine: Arc<AsyncEngine>,
    runner: JoinHandle<Result<(), EngineError>>,
    extractor: Option<std::thread::JoinHandle<()>>,
}

impl EngineHarness {
    /// 使用给定的传输启动引擎
    pub fn start(
        max_active_pipelines: usize,
        to_extractor: Box<dyn FrameSink>,
        from_extractor: Box<dyn FrameSource>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        let engine = Arc::new(AsyncEngine::new(
            &EngineSettings {
                max_active_pipelines,
            },
            to_extractor,
            from_extractor,
            sink,
        ));
        let runner = tokio::spawn(Arc::clone(&engine).run());
        Self {
            engine,
            runner,
            extractor: None,
        }
    }

    /// 在同一进程的线程中运行提取引擎
    pub fn in_process(max_active_pipelines: usize, sink: Arc<dyn PersistenceSink>) -> Self {
        let (to_extractor, extractor_in) = channel();
        let (extractor_out, from_extractor) = channel();
        let extractor = std::thread::spawn(move || {
            SyncEngine::new(extractor_in, extractor_out)
                .initiate()
                .expect("extractor failed");
        });
        let mut harness = Self::start(
            max_active_pipelines,
            Box::new(to_extractor),
            Box::new(from_extractor),
            sink,
        );
        harness.extractor = Some(extractor);
        harness
    }

    pub async fn wait_until_idle(&self) {
        tokio::time::timeout(Duration::from_secs(20), self.engine.wait_until_idle())
            .await
            .expect("pipelines did not finish in time");
    }

    pub async fn stop(self) {
        self.engine.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), self.runner)
            .await
            .expect("engine did not stop")
            .unwrap();
        assert!(result.is_ok(), "engine failed: {:?}", result);
        if let Some(extractor) = self.extractor {
            extractor.join().unwrap();
        }
    }
}
