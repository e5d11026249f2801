// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 包含数据包与档案等领域模型、选择器规则以及持久化抽象接口。
/// 领域层不依赖具体的HTTP或数据库实现。
pub mod models;
pub mod repositories;
pub mod selectors;
