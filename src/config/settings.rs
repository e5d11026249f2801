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

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含引擎、抓取、数据库、提取进程、日志和指标等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 引擎配置
    pub engine: EngineSettings,
    /// 抓取步骤配置
    pub scraper: ScraperSettings,
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 提取进程配置
    pub extractor: ExtractorSettings,
    /// 流水线定义配置
    pub pipelines: PipelinesSettings,
    /// 日志配置
    pub logging: LoggingSettings,
    /// 指标配置
    pub metrics: MetricsSettings,
}

/// 引擎配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// 同时运行的流水线上限
    pub max_active_pipelines: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_active_pipelines: 5,
        }
    }
}

/// 抓取步骤配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperSettings {
    /// 每批次的最大URL数量
    pub batch_size: usize,
    /// 批次出现丢弃项后的冷却时间（秒）
    pub cooldown_secs: u64,
    /// 单个请求的超时时间（秒）
    pub request_timeout_secs: u64,
    /// 视为成功的HTTP状态码
    pub acceptable_statuses: Vec<u16>,
    /// 请求使用的User-Agent
    pub user_agent: String,
}

impl ScraperSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            batch_size: 200,
            cooldown_secs: 5,
            request_timeout_secs: 30,
            acceptable_statuses: vec![200, 302],
            user_agent: "Mozilla/5.0 (compatible; crowrs/0.1)".to_string(),
        }
    }
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
}

/// 提取进程配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorSettings {
    /// 提取进程可执行文件路径，未设置时使用与当前程序同目录的 `crowrs-extractor`
    pub program: Option<String>,
}

impl ExtractorSettings {
    /// 解析提取进程可执行文件的位置
    pub fn resolve_program(&self) -> std::io::Result<PathBuf> {
        if let Some(program) = &self.program {
            return Ok(PathBuf::from(program));
        }
        let current = std::env::current_exe()?;
        let name = format!("crowrs-extractor{}", std::env::consts::EXE_SUFFIX);
        Ok(current.with_file_name(name))
    }
}

/// 流水线定义配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct PipelinesSettings {
    /// 存放YAML流水线定义的目录
    pub directory: String,
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// 日志配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub format: LogFormat,
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启用Prometheus导出
    pub enabled: bool,
    /// 导出监听地址
    pub addr: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加默认值、`config/default`、`config/{APP_ENVIRONMENT}` 与 `CROWRS__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Engine
            .set_default("engine.max_active_pipelines", 5)?
            // Scraper
            .set_default("scraper.batch_size", 200)?
            .set_default("scraper.cooldown_secs", 5)?
            .set_default("scraper.request_timeout_secs", 30)?
            .set_default("scraper.acceptable_statuses", vec![200, 302])?
            .set_default("scraper.user_agent", "Mozilla/5.0 (compatible; crowrs/0.1)")?
            // Database
            .set_default("database.url", "sqlite://crowrs.db?mode=rwc")?
            .set_default("database.max_connections", 5)?
            .set_default("database.connect_timeout", 10)?
            // Pipelines and logging
            .set_default("pipelines.directory", "pipelines")?
            .set_default("logging.format", "pretty")?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.addr", "0.0.0.0:9000")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("CROWRS")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("scraper.acceptable_statuses")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
