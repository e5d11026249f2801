// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::selectors::SelectorConfig;
use crate::utils::errors::SinkError;
use async_trait::async_trait;
use serde_json::Value;

/// 存储表的保留列名
pub const RESERVED_COLUMNS: [&str; 2] = ["id", "scraped_date"];

/// 持久化接收端特质
///
/// 最后一个步骤的提取结果最终写入这里。
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// 确保流水线对应的存储表存在（幂等）
    ///
    /// # 参数
    ///
    /// * `pipeline_name` - 流水线名称，作为表名
    /// * `selectors` - 最后一个步骤的选择器，其名称作为列名
    async fn ensure_table(
        &self,
        pipeline_name: &str,
        selectors: &[SelectorConfig],
    ) -> Result<(), SinkError>;

    /// 追加记录
    ///
    /// 单行写入失败只记录日志，不中断整批写入。
    ///
    /// # 返回值
    ///
    /// * `Ok(usize)` - 成功写入的行数
    /// * `Err(SinkError)` - 无法执行写入
    async fn bulk_insert(&self, pipeline_name: &str, records: &[Value]) -> Result<usize, SinkError>;

    /// 流水线的最后一个结束信号已到达
    async fn finish(&self, _pipeline_name: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

/// 将名称清理为安全的SQL标识符
///
/// 只保留ASCII字母、数字与下划线，以数字开头时加前缀。
pub fn sanitize_identifier(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('_').to_string();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        return Some(format!("t_{}", cleaned));
    }
    Some(cleaned)
}
