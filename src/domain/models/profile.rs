// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;

/// 抓取配置档案
///
/// 一条流水线的共享配置：请求头、Cookie 与并发上限。运行期间只读，
/// 只有抓取历史会在每次运行开始时追加一条时间戳。
#[derive(Debug)]
pub struct Profile {
    /// 档案名称，同时作为流水线名称
    pub name: String,
    /// 单条流水线的HTTP并发上限
    pub burst_rate: usize,
    /// 每个请求附带的请求头
    pub headers: BTreeMap<String, String>,
    /// 每个请求附带的Cookie
    pub cookies: BTreeMap<String, String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    crawl_history: RwLock<Vec<DateTime<Utc>>>,
}

impl Profile {
    /// 创建新的档案
    ///
    /// # 参数
    ///
    /// * `name` - 档案名称
    /// * `burst_rate` - HTTP并发上限，至少为1
    pub fn new(name: impl Into<String>, burst_rate: usize) -> Self {
        Self {
            name: name.into(),
            burst_rate: burst_rate.max(1),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            created_at: Utc::now(),
            crawl_history: RwLock::new(Vec::new()),
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_cookies(mut self, cookies: BTreeMap<String, String>) -> Self {
        self.cookies = cookies;
        self
    }

    /// 从另一个档案迁移请求头、Cookie 与并发上限
    pub fn migrate_profile(&mut self, other: &Profile) {
        self.headers = other.headers.clone();
        self.cookies = other.cookies.clone();
        self.burst_rate = other.burst_rate;
    }

    /// 记录一次抓取的开始时间
    pub fn record_crawl(&self) -> DateTime<Utc> {
        let now = Utc::now();
        self.crawl_history.write().push(now);
        now
    }

    pub fn crawl_history(&self) -> Vec<DateTime<Utc>> {
        self.crawl_history.read().clone()
    }

    /// 将Cookie拼接为单个 `Cookie` 请求头的值
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        Some(pairs.join("; "))
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
