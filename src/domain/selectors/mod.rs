// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 提取规则模块
///
/// - 选择器（selector）：单条声明式提取规则及其配置
/// - 选择器集合（selector_list）：规则集求值、必填校验与批量提取协议
/// - 后处理（post_processor）：受限的具名值变换
pub mod post_processor;
pub mod selector;
pub mod selector_list;

pub use post_processor::PostProcessor;
pub use selector::{Selector, SelectorConfig, SelectorKind, SelectorMethod, REUSE};
pub use selector_list::{Extracted, SelectorList};
