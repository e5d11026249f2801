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

use crate::config::settings::ScraperSettings;
use crate::domain::models::profile::Profile;
use crate::utils::errors::FetchError;
use futures::future::{join_all, try_join_all};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::{redirect, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

/// 校验模式下的存活状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Active,
    Inactive,
}

impl Liveness {
    pub fn as_str(self) -> &'static str {
        match self {
            Liveness::Active => "active",
            Liveness::Inactive => "inactive",
        }
    }
}

/// 抓取引擎
///
/// 基于reqwest的HTTP抓取器。在途请求数由 `permits` 信号量限制在档案的 `burst_rate` 以内，
/// 每个请求在整个收发过程中持有一个许可。连接池的 `pool_max_idle_per_host` 只决定
/// 可复用的空闲连接数，不限制并发。
pub struct ReqwestFetcher {
    /// 跟随重定向的抓取客户端
    client: Client,
    /// 不跟随重定向的校验客户端
    verify_client: Client,
    /// 在途请求许可，唯一的并发上限
    permits: Arc<Semaphore>,
    /// 视为成功的状态码
    acceptable_statuses: Vec<u16>,
}

impl ReqwestFetcher {
    /// 根据档案与抓取配置创建抓取器
    ///
    /// # 参数
    ///
    /// * `profile` - 提供请求头、Cookie与并发上限的档案
    /// * `settings` - 抓取配置
    ///
    /// # 返回值
    ///
    /// * `Ok(ReqwestFetcher)` - 抓取器
    /// * `Err(FetchError)` - 请求头无效或客户端构建失败
    pub fn new(profile: &Profile, settings: &ScraperSettings) -> Result<Self, FetchError> {
        let headers = default_headers(profile)?;
        let burst_rate = profile.burst_rate.max(1);

        let builder = || {
            Client::builder()
                .user_agent(settings.user_agent.as_str())
                .default_headers(headers.clone())
                .timeout(settings.request_timeout())
                .pool_max_idle_per_host(burst_rate)
        };
        let client = builder().build()?;
        let verify_client = builder().redirect(redirect::Policy::none()).build()?;

        Ok(Self {
            client,
            verify_client,
            permits: Arc::new(Semaphore::new(burst_rate)),
            acceptable_statuses: settings.acceptable_statuses.clone(),
        })
    }

    /// 抓取单个URL
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(String))` - 状态码可接受时的响应正文
    /// * `Ok(None)` - 状态码不可接受
    /// * `Err(FetchError)` - 网络或解码错误
    pub async fn fetch(&self, url: &str) -> Result<Option<String>, FetchError> {
        let Some(parsed) = parse_url(url) else {
            return Ok(None);
        };
        // The semaphore is never closed.
        let _permit = self.permits.acquire().await.ok();
        let response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !self.acceptable_statuses.contains(&status.as_u16()) {
            debug!("Dropping {} with status {}", url, status);
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }

    /// 校验单个URL是否存活，不跟随重定向
    pub async fn verify(&self, url: &str) -> Liveness {
        let Some(parsed) = parse_url(url) else {
            return Liveness::Inactive;
        };
        let _permit = self.permits.acquire().await.ok();
        match self.verify_client.get(parsed).send().await {
            Ok(response) if response.status() == StatusCode::OK => Liveness::Active,
            Ok(_) => Liveness::Inactive,
            Err(err) => {
                debug!("Verify request to {} failed: {}", url, err);
                Liveness::Inactive
            }
        }
    }

    /// 并发抓取一批URL
    ///
    /// 结果与输入一一对应、顺序一致；非字符串项无法请求，记为 `None`。
    /// 任一请求出现网络错误时整批失败。
    pub async fn fetch_batch(&self, urls: &[Value]) -> Result<Vec<Option<String>>, FetchError> {
        try_join_all(urls.iter().map(|item| async move {
            match item.as_str() {
                Some(url) => self.fetch(url).await,
                None => {
                    warn!("Skipping non-text item {}", item);
                    Ok(None)
                }
            }
        }))
        .await
    }

    /// 并发校验一批URL，结果顺序与输入一致
    pub async fn verify_batch(&self, urls: &[Value]) -> Vec<Liveness> {
        join_all(urls.iter().map(|item| async move {
            match item.as_str() {
                Some(url) => self.verify(url).await,
                None => Liveness::Inactive,
            }
        }))
        .await
    }
}

/// 无法解析的URL不发起请求，按丢弃处理
fn parse_url(raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(err) => {
            warn!("Skipping invalid URL `{}`: {}", raw, err);
            None
        }
    }
}

fn default_headers(profile: &Profile) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    for (k, v) in &profile.headers {
        let name = HeaderName::from_bytes(k.as_bytes())
            .map_err(|_| FetchError::InvalidHeader(k.clone()))?;
        let value = HeaderValue::from_str(v).map_err(|_| FetchError::InvalidHeader(k.clone()))?;
        headers.insert(name, value);
    }
    if let Some(cookie) = profile.cookie_header() {
        let value = HeaderValue::from_str(&cookie)
            .map_err(|_| FetchError::InvalidHeader(COOKIE.to_string()))?;
        headers.insert(COOKIE, value);
    }
    Ok(headers)
}

#[cfg(test)]
#[path = "reqwest_engine_test.rs"]
mod tests;
