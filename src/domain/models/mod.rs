// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// - 数据包（package）：步骤之间以及跨进程传递的数据单元
/// - 档案（profile）：一次运行共享的请求身份与突发速率
/// - 流水线定义（definition）：控制面加载的YAML描述
pub mod definition;
pub mod package;
pub mod profile;
