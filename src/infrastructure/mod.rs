// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 提供领域层持久化接口的具体实现与外部系统集成：
/// - 数据库（database）：SQLite连接池
/// - 指标（metrics）：Prometheus导出
/// - 仓库实现（repositories）：SQLite与内存持久化接收端
pub mod database;
pub mod metrics;
pub mod repositories;
