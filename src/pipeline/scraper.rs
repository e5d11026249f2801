// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::step::Step;
use crate::config::settings::ScraperSettings;
use crate::domain::models::package::{Package, SelectorsRef};
use crate::domain::models::profile::Profile;
use crate::domain::selectors::SelectorConfig;
use crate::engines::reqwest_engine::ReqwestFetcher;
use crate::utils::batches::to_batches;
use crate::utils::errors::{FetchError, StepError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// 抓取模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    /// 抓取页面正文
    #[default]
    Fetch,
    /// 只校验URL是否存活
    Verify,
}

/// HTTP抓取步骤
pub struct Scraper {
    pipeline_name: String,
    name: String,
    pipeline_order_id: usize,
    selectors: Vec<SelectorConfig>,
    initial_url: Option<String>,
    mode: ScrapeMode,
    fetcher: ReqwestFetcher,
    batch_size: usize,
    cooldown: Duration,
}

impl Scraper {
    /// 创建抓取步骤
    ///
    /// # 参数
    ///
    /// * `profile` - 所属流水线的档案
    /// * `name` - 步骤名称
    /// * `pipeline_order_id` - 步骤位置
    /// * `selectors` - 解释本步骤输出的选择器
    /// * `settings` - 抓取配置
    ///
    /// # 返回值
    ///
    /// * `Ok(Scraper)` - 抓取步骤
    /// * `Err(FetchError)` - HTTP客户端构建失败
    pub fn new(
        profile: &Profile,
        name: impl Into<String>,
        pipeline_order_id: usize,
        selectors: Vec<SelectorConfig>,
        settings: &ScraperSettings,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            pipeline_name: profile.name.clone(),
            name: name.into(),
            pipeline_order_id,
            selectors,
            initial_url: None,
            mode: ScrapeMode::Fetch,
            fetcher: ReqwestFetcher::new(profile, settings)?,
            batch_size: settings.batch_size,
            cooldown: settings.cooldown(),
        })
    }

    pub fn with_initial_url(mut self, url: impl Into<String>) -> Self {
        self.initial_url = Some(url.into());
        self
    }

    pub fn with_mode(mut self, mode: ScrapeMode) -> Self {
        self.mode = mode;
        self
    }

    /// 处理一个批次
    ///
    /// # 返回值
    ///
    /// * `Some((data, dropped))` - 批次结果与被丢弃的项数
    /// * `None` - 批次因网络错误整体失败
    async fn scrape_batch(&self, batch: &[Value]) -> Option<(Vec<Value>, usize)> {
        match self.mode {
            ScrapeMode::Verify => {
                let statuses = self.fetcher.verify_batch(batch).await;
                let data = statuses
                    .into_iter()
                    .map(|s| Value::String(s.as_str().to_string()))
                    .collect();
                Some((data, 0))
            }
            ScrapeMode::Fetch => match self.fetcher.fetch_batch(batch).await {
                Ok(results) => {
                    let total = results.len();
                    let data: Vec<Value> = results.into_iter().flatten().map(Value::String).collect();
                    let dropped = total - data.len();
                    metrics::counter!("crowrs_pages_fetched_total").increment(data.len() as u64);
                    metrics::counter!("crowrs_pages_dropped_total").increment(dropped as u64);
                    Some((data, dropped))
                }
                Err(err) => {
                    error!(step = %self.name, "Batch of {} aborted: {}", batch.len(), err);
                    None
                }
            },
        }
    }

    /// 将一个数据包切分为批次逐一抓取，每个批次产出一个新数据包
    async fn scrape_until_final(
        &self,
        package: &Package,
        outbound: &UnboundedSender<Package>,
    ) -> Result<(), StepError> {
        for batch in to_batches(&package.data, self.batch_size) {
            if batch.is_empty() {
                continue;
            }
            let Some((data, dropped)) = self.scrape_batch(&batch).await else {
                // 传输错误同样退避
                tokio::time::sleep(self.cooldown).await;
                continue;
            };

            debug!(
                step = %self.name,
                "Batch done: {} kept, {} dropped",
                data.len(),
                dropped
            );
            let emitted = Package {
                pipeline_name: package.pipeline_name.clone(),
                step_order_id: self.pipeline_order_id,
                data,
                selectors: Some(SelectorsRef::for_step(
                    &self.pipeline_name,
                    self.pipeline_order_id,
                )),
                closed_inbound: package.closed_inbound,
            };
            outbound
                .send(emitted)
                .map_err(|_| StepError::OutboundClosed(self.name.clone()))?;

            if dropped > 0 {
                tokio::time::sleep(self.cooldown).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Step for Scraper {
    fn name(&self) -> &str {
        &self.name
    }

    fn pipeline_order_id(&self) -> usize {
        self.pipeline_order_id
    }

    fn selectors(&self) -> &[SelectorConfig] {
        &self.selectors
    }

    fn initial_url(&self) -> Option<&str> {
        self.initial_url.as_deref()
    }

    async fn run(
        &self,
        mut inbound: UnboundedReceiver<Package>,
        outbound: UnboundedSender<Package>,
    ) -> Result<(), StepError> {
        info!(step = %self.name, pipeline = %self.pipeline_name, "Scraper started");
        while let Some(package) = inbound.recv().await {
            if package.is_sentinel() {
                outbound
                    .send(package.restamped(self.pipeline_order_id))
                    .map_err(|_| StepError::OutboundClosed(self.name.clone()))?;
                while let Ok(late) = inbound.try_recv() {
                    warn!(step = %self.name, "Discarding package received after end of input: {} items", late.data.len());
                }
                info!(step = %self.name, "Scraper finished");
                return Ok(());
            }
            self.scrape_until_final(&package, &outbound).await?;
        }

        warn!(step = %self.name, "Inbound closed without an end signal");
        outbound
            .send(Package::sentinel(&self.pipeline_name, self.pipeline_order_id))
            .map_err(|_| StepError::OutboundClosed(self.name.clone()))
    }
}

#[cfg(test)]
#[path = "scraper_test.rs"]
mod tests;
