// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::selector::{Document, Selector, SelectorConfig, SelectorMethod, REUSE};
use crate::utils::errors::SelectorError;
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// 批量提取的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// 每个输入项对应一条字段记录
    Records(Vec<Map<String, Value>>),
    /// `all` 方式：所有输入项、所有规则的值拼接为一个序列
    Flat(Vec<Value>),
    /// 单个 `REUSE` 规则作用于单个输入项时的裸值
    Reuse(Value),
    /// 空规则集，输入原样透传
    Passthrough(Vec<Value>),
}

impl Extracted {
    /// 转换为数据包负载
    pub fn into_data(self) -> Vec<Value> {
        match self {
            Extracted::Records(records) => records.into_iter().map(Value::Object).collect(),
            Extracted::Flat(values) | Extracted::Passthrough(values) => values,
            Extracted::Reuse(Value::Array(values)) => values,
            Extracted::Reuse(Value::Null) => Vec::new(),
            Extracted::Reuse(value) => vec![value],
        }
    }
}

/// 选择器集合
///
/// 按 regex → xpath → json → static → css 的顺序求值，并跟踪必填规则。
#[derive(Debug, Clone, Default)]
pub struct SelectorList {
    selectors: Vec<Selector>,
    protocol: SelectorMethod,
}

impl SelectorList {
    /// 编译选择器配置列表
    ///
    /// 第一个规则的提取方式决定整个集合的批量提取协议。
    ///
    /// # 参数
    ///
    /// * `configs` - 选择器配置列表
    ///
    /// # 返回值
    ///
    /// * `Ok(SelectorList)` - 编译后的选择器集合
    /// * `Err(SelectorError)` - 任一规则无效
    pub fn compile(configs: &[SelectorConfig]) -> Result<Self, SelectorError> {
        let protocol = configs.first().map(|c| c.method).unwrap_or_default();
        let mut selectors = configs
            .iter()
            .map(Selector::compile)
            .collect::<Result<Vec<_>, _>>()?;
        selectors.sort_by_key(|s| s.kind().evaluation_rank());
        Ok(Self {
            selectors,
            protocol,
        })
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Selector> {
        self.selectors.iter()
    }

    fn is_reuse(&self) -> bool {
        matches!(self.selectors.as_slice(), [only] if only.name == REUSE && only.method == SelectorMethod::First)
    }

    /// 对单个输入项求值全部规则
    ///
    /// 任一必填规则结果为空时，整条记录的所有字段都被置为空。
    pub fn extract(&self, item: &Value) -> Map<String, Value> {
        let text: Cow<'_, str> = match item {
            Value::String(s) => Cow::Borrowed(s),
            other => Cow::Owned(other.to_string()),
        };
        let document = Document::new(&text);

        let mut extracted = Map::new();
        for selector in &self.selectors {
            extracted.insert(selector.name.clone(), selector.extract(&document));
        }

        let missing_required = self
            .selectors
            .iter()
            .any(|s| s.required && extracted.get(&s.name).map_or(true, Value::is_null));
        if missing_required {
            for value in extracted.values_mut() {
                *value = Value::Null;
            }
        }
        extracted
    }

    /// 对一批输入项提取
    ///
    /// 输入项并行处理，结果顺序与输入一致。
    pub fn extract_batch(&self, items: &[Value]) -> Extracted {
        if self.selectors.is_empty() {
            return Extracted::Passthrough(items.to_vec());
        }

        let records: Vec<Map<String, Value>> =
            items.par_iter().map(|item| self.extract(item)).collect();

        if self.is_reuse() && records.len() == 1 {
            let value = records
                .into_iter()
                .next()
                .and_then(|mut record| record.remove(REUSE))
                .unwrap_or(Value::Null);
            return Extracted::Reuse(value);
        }

        match self.protocol {
            SelectorMethod::First => Extracted::Records(records),
            SelectorMethod::All => Extracted::Flat(self.flatten(records)),
        }
    }

    fn flatten(&self, records: Vec<Map<String, Value>>) -> Vec<Value> {
        let mut flat = Vec::new();
        for mut record in records {
            for selector in &self.selectors {
                match record.remove(&selector.name) {
                    Some(Value::Array(values)) => {
                        flat.extend(values.into_iter().filter(|v| !v.is_null()))
                    }
                    Some(Value::Null) | None => {}
                    Some(value) => flat.push(value),
                }
            }
        }
        flat
    }
}

#[cfg(test)]
#[path = "selector_list_test.rs"]
mod tests;
