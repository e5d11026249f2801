// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::SelectorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// 提取结果的后处理操作
///
/// 只允许这组具名操作，不对用户输入做任何表达式求值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PostProcessor {
    /// 去除首尾空白
    Trim,
    /// 转为小写
    Lowercase,
    /// 解析为数字，整数优先
    ToNumber,
    /// 用分隔符拼接数组
    Join {
        #[serde(default)]
        separator: String,
    },
    /// 正则替换
    RegexReplace { pattern: String, replacement: String },
    /// 将值填入模板中的 `{}`
    Format { template: String },
}

impl PostProcessor {
    /// 预编译后处理操作
    pub fn compile(&self) -> Result<Transform, SelectorError> {
        Ok(match self {
            PostProcessor::Trim => Transform::Trim,
            PostProcessor::Lowercase => Transform::Lowercase,
            PostProcessor::ToNumber => Transform::ToNumber,
            PostProcessor::Join { separator } => Transform::Join(separator.clone()),
            PostProcessor::RegexReplace {
                pattern,
                replacement,
            } => Transform::RegexReplace {
                regex: Regex::new(pattern).map_err(|source| SelectorError::InvalidRegex {
                    pattern: pattern.clone(),
                    source,
                })?,
                replacement: replacement.clone(),
            },
            PostProcessor::Format { template } => Transform::Format(template.clone()),
        })
    }
}

/// 编译后的后处理操作
#[derive(Debug, Clone)]
pub enum Transform {
    Trim,
    Lowercase,
    ToNumber,
    Join(String),
    RegexReplace { regex: Regex, replacement: String },
    Format(String),
}

impl Transform {
    /// 对提取值应用后处理
    ///
    /// 数组按元素逐个处理（`Join` 除外），空值原样返回。
    ///
    /// # 返回值
    ///
    /// * `Ok(Value)` - 处理后的值
    /// * `Err(SelectorError)` - 值的类型或内容不适用于该操作
    pub fn apply(&self, value: &Value) -> Result<Value, SelectorError> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Transform::Join(separator), Value::Array(items)) => {
                let parts: Vec<String> = items.iter().filter_map(text_of).collect();
                Ok(Value::String(parts.join(separator)))
            }
            (Transform::Join(_), Value::String(_)) => Ok(value.clone()),
            (_, Value::Array(items)) => items
                .iter()
                .map(|item| self.apply(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (Transform::Trim, Value::String(s)) => Ok(Value::String(s.trim().to_string())),
            (Transform::Lowercase, Value::String(s)) => Ok(Value::String(s.to_lowercase())),
            (Transform::ToNumber, Value::Number(_)) => Ok(value.clone()),
            (Transform::ToNumber, Value::String(s)) => parse_number(s),
            (Transform::RegexReplace { regex, replacement }, Value::String(s)) => Ok(
                Value::String(regex.replace_all(s, replacement.as_str()).into_owned()),
            ),
            (Transform::Format(template), other) => match text_of(other) {
                Some(text) => Ok(Value::String(template.replace("{}", &text))),
                None => Err(SelectorError::PostProcess(format!(
                    "cannot format {}",
                    other
                ))),
            },
            (transform, other) => Err(SelectorError::PostProcess(format!(
                "{:?} does not apply to {}",
                transform, other
            ))),
        }
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn parse_number(raw: &str) -> Result<Value, SelectorError> {
    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Ok(Value::Number(int.into()));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| SelectorError::PostProcess(format!("`{}` is not a number", raw)))
}
