// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::persistence::PersistenceSink;
use crate::domain::selectors::SelectorConfig;
use crate::utils::errors::SinkError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Map<String, Value>>,
    finished: bool,
}

/// 内存持久化实现
///
/// 用于测试与不落库的试运行。
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self, pipeline_name: &str) -> Option<Vec<String>> {
        self.tables
            .lock()
            .get(pipeline_name)
            .map(|t| t.columns.clone())
    }

    pub fn rows(&self, pipeline_name: &str) -> Vec<Map<String, Value>> {
        self.tables
            .lock()
            .get(pipeline_name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// 是否已收到该流水线最后一个步骤的结束信号
    pub fn is_finished(&self, pipeline_name: &str) -> bool {
        self.tables
            .lock()
            .get(pipeline_name)
            .is_some_and(|t| t.finished)
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn ensure_table(
        &self,
        pipeline_name: &str,
        selectors: &[SelectorConfig],
    ) -> Result<(), SinkError> {
        let mut tables = self.tables.lock();
        let table = tables.entry(pipeline_name.to_string()).or_default();
        if table.columns.is_empty() {
            table.columns = selectors.iter().map(|s| s.name.clone()).collect();
        }
        Ok(())
    }

    async fn bulk_insert(&self, pipeline_name: &str, records: &[Value]) -> Result<usize, SinkError> {
        let mut tables = self.tables.lock();
        let table = tables.entry(pipeline_name.to_string()).or_default();
        let before = table.rows.len();
        table.rows.extend(
            records
                .iter()
                .filter_map(|record| record.as_object().cloned()),
        );
        Ok(table.rows.len() - before)
    }

    async fn finish(&self, pipeline_name: &str) -> Result<(), SinkError> {
        self.tables
            .lock()
            .entry(pipeline_name.to_string())
            .or_default()
            .finished = true;
        Ok(())
    }
}
