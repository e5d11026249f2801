// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含数据包、档案、选择器和持久化接口
pub mod domain;

/// 引擎模块
///
/// 协调引擎、提取引擎与HTTP抓取器
pub mod engines;

/// 基础设施模块
///
/// 提供数据库连接、持久化实现与指标导出
pub mod infrastructure;

/// 流水线模块
///
/// 步骤特质、HTTP抓取步骤与流水线路由
pub mod pipeline;

/// 队列模块
///
/// 跨进程帧格式与传输
pub mod queue;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;
