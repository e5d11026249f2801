// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Context;
use crowrs::config::settings::Settings;
use crowrs::domain::models::definition::load_definitions;
use crowrs::engines::async_engine::AsyncEngine;
use crowrs::infrastructure::database::connection;
use crowrs::infrastructure::metrics;
use crowrs::infrastructure::repositories::sqlite_sink::SqliteSink;
use crowrs::queue::transport::{StreamSink, StreamSource};
use crowrs::utils::telemetry;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 主函数
///
/// 加载流水线定义，启动提取进程，并运行协调引擎直到全部流水线结束
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let settings = Settings::new()?;

    // 2. Initialize logging and metrics
    telemetry::init_telemetry(settings.logging.format);
    info!("Starting crowrs...");
    metrics::init_metrics(&settings.metrics);

    // 3. Build pipelines
    let directory = Path::new(&settings.pipelines.directory);
    let mut pipelines = Vec::new();
    for (path, definition) in load_definitions(directory)
        .with_context(|| format!("failed to load pipelines from {}", directory.display()))?
    {
        let pipeline = definition
            .into_pipeline(&settings.scraper)
            .with_context(|| format!("invalid pipeline in {}", path.display()))?;
        pipelines.push(pipeline);
    }
    if pipelines.is_empty() {
        warn!("No pipeline definitions found in {}", directory.display());
        return Ok(());
    }

    // 4. Connect to database
    let pool = connection::create_pool(&settings.database).await?;
    let sink = Arc::new(SqliteSink::new(pool));
    info!("Database connection established");

    // 5. Start extractor process
    let program = settings.extractor.resolve_program()?;
    let mut child = Command::new(&program)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("failed to start extractor {}", program.display()))?;
    let stdin = child.stdin.take().context("extractor stdin unavailable")?;
    let stdout = child.stdout.take().context("extractor stdout unavailable")?;
    info!("Extractor started (pid {})", child.id());

    // 6. Run engine
    let engine = Arc::new(AsyncEngine::new(
        &settings.engine,
        Box::new(StreamSink::new(BufWriter::new(stdin))),
        Box::new(StreamSource::new(BufReader::new(stdout))),
        sink,
    ));
    for pipeline in pipelines {
        engine.submit(pipeline)?;
    }

    let mut runner = tokio::spawn(Arc::clone(&engine).run());
    let stopped = tokio::select! {
        _ = engine.wait_until_idle() => {
            info!("All pipelines finished");
            None
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
            None
        }
        joined = &mut runner => Some(joined),
    };
    engine.shutdown();
    let result = match stopped {
        Some(joined) => joined?,
        None => runner.await?,
    };

    let status = tokio::task::spawn_blocking(move || child.wait()).await??;
    if !status.success() {
        warn!("Extractor exited with {}", status);
    }

    if let Err(err) = &result {
        error!("Engine failed: {}", err);
    }
    result?;
    info!("crowrs stopped");
    Ok(())
}
