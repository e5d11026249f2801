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

use crate::domain::repositories::persistence::{
    sanitize_identifier, PersistenceSink, RESERVED_COLUMNS,
};
use crate::domain::selectors::SelectorConfig;
use crate::utils::errors::SinkError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

/// SQLite持久化实现
///
/// 每条流水线一张表，列为最后一个步骤的选择器名称。
pub struct SqliteSink {
    /// 数据库连接池
    pool: SqlitePool,
    /// 表名到列名的映射，由 `ensure_table` 记录
    columns: DashMap<String, Vec<String>>,
}

impl SqliteSink {
    /// 创建新的SQLite持久化实例
    ///
    /// # 参数
    ///
    /// * `pool` - 数据库连接池
    ///
    /// # 返回值
    ///
    /// 返回新的SQLite持久化实例
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            columns: DashMap::new(),
        }
    }

    fn table_name(pipeline_name: &str) -> Result<String, SinkError> {
        sanitize_identifier(pipeline_name)
            .ok_or_else(|| SinkError::InvalidTable(pipeline_name.to_string()))
    }
}

fn bind_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl PersistenceSink for SqliteSink {
    async fn ensure_table(
        &self,
        pipeline_name: &str,
        selectors: &[SelectorConfig],
    ) -> Result<(), SinkError> {
        let table = Self::table_name(pipeline_name)?;

        let mut columns = Vec::new();
        let mut definitions = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        for selector in selectors {
            let Some(column) = sanitize_identifier(&selector.name) else {
                warn!("Skipping selector `{}`: not a usable column name", selector.name);
                continue;
            };
            if RESERVED_COLUMNS.contains(&column.as_str()) || columns.contains(&column) {
                warn!("Skipping selector `{}`: column `{}` is taken", selector.name, column);
                continue;
            }
            let not_null = if selector.required { " NOT NULL" } else { "" };
            definitions.push(format!("\"{}\" TEXT{}", column, not_null));
            columns.push(column);
        }
        definitions.push("scraped_date TIMESTAMP DEFAULT CURRENT_TIMESTAMP".to_string());

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            table,
            definitions.join(", ")
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        info!("Table `{}` ready with {} columns", table, columns.len());

        self.columns.insert(table, columns);
        Ok(())
    }

    async fn bulk_insert(&self, pipeline_name: &str, records: &[Value]) -> Result<usize, SinkError> {
        let table = Self::table_name(pipeline_name)?;
        let known = self.columns.get(&table).map(|c| c.value().clone());

        let mut inserted = 0;
        for record in records {
            let Some(fields) = record.as_object() else {
                debug!("Skipping non-record value for `{}`", table);
                continue;
            };

            let mut columns = Vec::new();
            let mut values = Vec::new();
            for (key, value) in fields {
                let Some(column) = sanitize_identifier(key) else {
                    continue;
                };
                if let Some(known) = &known {
                    if !known.contains(&column) {
                        continue;
                    }
                }
                columns.push(format!("\"{}\"", column));
                values.push(bind_text(value));
            }
            if columns.is_empty() {
                continue;
            }

            let placeholders = vec!["?"; columns.len()].join(", ");
            let sql = format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for value in values {
                query = query.bind(value);
            }
            match query.execute(&self.pool).await {
                Ok(_) => inserted += 1,
                Err(err) => warn!("Failed to insert row into `{}`: {}", table, err),
            }
        }

        metrics::counter!("crowrs_rows_inserted_total").increment(inserted as u64);
        Ok(inserted)
    }
}
