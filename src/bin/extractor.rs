// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crowrs::config::settings::Settings;
use crowrs::engines::sync_engine::SyncEngine;
use crowrs::queue::transport::{StreamSink, StreamSource};
use crowrs::utils::telemetry;
use std::io::{BufReader, BufWriter};

/// 提取进程入口
///
/// 从标准输入读取帧，把提取结果写回标准输出，日志写入标准错误。
fn main() -> anyhow::Result<()> {
    let settings = Settings::new()?;
    telemetry::init_stderr_telemetry(settings.logging.format);

    let inbound = StreamSource::new(BufReader::new(std::io::stdin()));
    let outbound = StreamSink::new(BufWriter::new(std::io::stdout()));
    SyncEngine::new(inbound, outbound).initiate()?;
    Ok(())
}
