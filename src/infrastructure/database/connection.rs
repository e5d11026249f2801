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

use crate::config::settings::DatabaseSettings;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;

/// 创建数据库连接池
///
/// # 参数
///
/// * `settings` - 数据库配置
///
/// # 返回值
///
/// * `Ok(SqlitePool)` - 数据库连接池
/// * `Err(sqlx::Error)` - 连接过程中出现的错误
pub async fn create_pool(settings: &DatabaseSettings) -> Result<SqlitePool, sqlx::Error> {
    let mut options = SqlitePoolOptions::new();

    if let Some(max) = settings.max_connections {
        options = options.max_connections(max);
    }

    if let Some(timeout) = settings.connect_timeout {
        options = options.acquire_timeout(Duration::from_secs(timeout));
    }

    options.connect(&settings.url).await
}
