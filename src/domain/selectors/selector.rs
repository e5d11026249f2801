// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::post_processor::{PostProcessor, Transform};
use crate::utils::errors::SelectorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use once_cell::unsync::OnceCell;
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use validator::Validate;

/// 特殊选择器名称：提取值直接作为下一步骤的输入
pub const REUSE: &str = "REUSE";

/// 选择器类型
///
/// 名称解析不区分大小写。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SelectorKind {
    Regex,
    Xpath,
    Json,
    Static,
    Css,
}

impl SelectorKind {
    /// 规则集中的求值顺序
    pub fn evaluation_rank(self) -> u8 {
        match self {
            SelectorKind::Regex => 0,
            SelectorKind::Xpath => 1,
            SelectorKind::Json => 2,
            SelectorKind::Static => 3,
            SelectorKind::Css => 4,
        }
    }
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SelectorKind::Regex => write!(f, "regex"),
            SelectorKind::Xpath => write!(f, "xpath"),
            SelectorKind::Json => write!(f, "json"),
            SelectorKind::Static => write!(f, "static"),
            SelectorKind::Css => write!(f, "css"),
        }
    }
}

impl FromStr for SelectorKind {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "regex" => Ok(SelectorKind::Regex),
            "xpath" => Ok(SelectorKind::Xpath),
            "json" => Ok(SelectorKind::Json),
            "static" => Ok(SelectorKind::Static),
            "css" => Ok(SelectorKind::Css),
            _ => Err(SelectorError::UnknownKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for SelectorKind {
    type Error = SelectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SelectorKind> for String {
    fn from(kind: SelectorKind) -> Self {
        kind.to_string()
    }
}

/// 提取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum SelectorMethod {
    /// 只取第一个匹配
    #[default]
    First,
    /// 取全部匹配
    All,
}

impl fmt::Display for SelectorMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SelectorMethod::First => write!(f, "first"),
            SelectorMethod::All => write!(f, "all"),
        }
    }
}

impl FromStr for SelectorMethod {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(SelectorMethod::First),
            "all" => Ok(SelectorMethod::All),
            _ => Err(SelectorError::UnknownMethod(s.to_string())),
        }
    }
}

impl TryFrom<String> for SelectorMethod {
    type Error = SelectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SelectorMethod> for String {
    fn from(method: SelectorMethod) -> Self {
        method.to_string()
    }
}

/// 选择器配置
///
/// 可序列化的选择器描述，出现在流水线定义与跨进程的注册帧中。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SelectorConfig {
    /// 字段名称，同时作为存储列名
    #[validate(length(min = 1, max = 30))]
    pub name: String,
    /// 选择器类型
    #[serde(rename = "type", alias = "kind")]
    pub kind: SelectorKind,
    /// 提取方式
    #[serde(default)]
    pub method: SelectorMethod,
    /// 规则内容，含义取决于类型
    pub directive: String,
    /// 是否为必填字段
    #[serde(default)]
    pub required: bool,
    /// 未匹配时的默认值
    #[serde(default)]
    pub default_return: Option<String>,
    /// 后处理操作
    #[serde(default)]
    pub post_processor: Option<PostProcessor>,
}

impl SelectorConfig {
    /// 创建只取第一个匹配的选择器配置
    pub fn new(name: impl Into<String>, kind: SelectorKind, directive: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            method: SelectorMethod::First,
            directive: directive.into(),
            required: false,
            default_return: None,
            post_processor: None,
        }
    }

    pub fn all(mut self) -> Self {
        self.method = SelectorMethod::All;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default_return: impl Into<String>) -> Self {
        self.default_return = Some(default_return.into());
        self
    }

    pub fn with_post_processor(mut self, post_processor: PostProcessor) -> Self {
        self.post_processor = Some(post_processor);
        self
    }
}

/// JSON路径片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// 解析JSON路径
///
/// 支持JSON数组形式（`["items", 0, "title"]`）与点分形式（`items.0.title`）。
pub fn parse_json_path(directive: &str) -> Result<Vec<PathSegment>, SelectorError> {
    let trimmed = directive.trim();
    if trimmed.starts_with('[') {
        let raw: Vec<Value> = serde_json::from_str(trimmed)
            .map_err(|e| SelectorError::InvalidJsonPath(format!("{}: {}", directive, e)))?;
        return raw
            .into_iter()
            .map(|segment| match segment {
                Value::String(key) => Ok(PathSegment::Key(key)),
                Value::Number(n) => n
                    .as_u64()
                    .map(|i| PathSegment::Index(i as usize))
                    .ok_or_else(|| SelectorError::InvalidJsonPath(directive.to_string())),
                _ => Err(SelectorError::InvalidJsonPath(directive.to_string())),
            })
            .collect();
    }
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    Ok(trimmed
        .split('.')
        .map(|segment| PathSegment::Key(segment.to_string()))
        .collect())
}

fn walk_json<'v>(root: &'v Value, path: &[PathSegment]) -> Option<&'v Value> {
    path.iter().try_fold(root, |current, segment| match (segment, current) {
        (PathSegment::Index(i), Value::Array(items)) => items.get(*i),
        (PathSegment::Key(key), Value::Object(map)) => map.get(key),
        (PathSegment::Key(key), Value::Array(items)) => {
            key.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    })
}

/// 单个输入项的延迟解析视图
///
/// 同一输入在一次提取中最多解析一次HTML、一次XPath文档与一次JSON。
pub struct Document<'a> {
    raw: &'a str,
    html: OnceCell<scraper::Html>,
    xml: OnceCell<sxd_document::Package>,
    json: OnceCell<Option<Value>>,
}

impl<'a> Document<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self {
            raw,
            html: OnceCell::new(),
            xml: OnceCell::new(),
            json: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &'a str {
        self.raw
    }

    fn html(&self) -> &scraper::Html {
        self.html
            .get_or_init(|| scraper::Html::parse_document(self.raw))
    }

    fn xml(&self) -> &sxd_document::Package {
        self.xml.get_or_init(|| sxd_html::parse_html(self.raw))
    }

    fn json(&self) -> Option<&Value> {
        self.json
            .get_or_init(|| serde_json::from_str(self.raw).ok())
            .as_ref()
    }
}

/// 编译后的规则内容
#[derive(Debug, Clone)]
pub enum Rule {
    Regex(Regex),
    Xpath(String),
    Json(Vec<PathSegment>),
    Static(String),
    Css(scraper::Selector),
}

/// 提取选择器
#[derive(Debug, Clone)]
pub struct Selector {
    pub name: String,
    pub method: SelectorMethod,
    pub required: bool,
    default_return: Value,
    transform: Option<Transform>,
    rule: Rule,
}

impl Selector {
    /// 编译选择器配置
    ///
    /// # 参数
    ///
    /// * `config` - 选择器配置
    ///
    /// # 返回值
    ///
    /// * `Ok(Selector)` - 编译后的选择器
    /// * `Err(SelectorError)` - 规则内容或后处理配置无效
    pub fn compile(config: &SelectorConfig) -> Result<Self, SelectorError> {
        let rule = match config.kind {
            SelectorKind::Regex => Rule::Regex(Regex::new(&config.directive).map_err(|source| {
                SelectorError::InvalidRegex {
                    pattern: config.directive.clone(),
                    source,
                }
            })?),
            SelectorKind::Xpath => {
                sxd_xpath::Factory::new()
                    .build(&config.directive)
                    .map_err(|e| {
                        SelectorError::InvalidXpath(format!("{}: {}", config.directive, e))
                    })?
                    .ok_or_else(|| SelectorError::InvalidXpath(config.directive.clone()))?;
                Rule::Xpath(config.directive.clone())
            }
            SelectorKind::Json => Rule::Json(parse_json_path(&config.directive)?),
            SelectorKind::Static => Rule::Static(config.directive.clone()),
            SelectorKind::Css => Rule::Css(
                scraper::Selector::parse(&config.directive)
                    .map_err(|e| SelectorError::InvalidCss(format!("{}: {}", config.directive, e)))?,
            ),
        };
        let transform = config
            .post_processor
            .as_ref()
            .map(PostProcessor::compile)
            .transpose()?;

        Ok(Self {
            name: config.name.clone(),
            method: config.method,
            required: config.required,
            default_return: config
                .default_return
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            transform,
            rule,
        })
    }

    pub fn kind(&self) -> SelectorKind {
        match self.rule {
            Rule::Regex(_) => SelectorKind::Regex,
            Rule::Xpath(_) => SelectorKind::Xpath,
            Rule::Json(_) => SelectorKind::Json,
            Rule::Static(_) => SelectorKind::Static,
            Rule::Css(_) => SelectorKind::Css,
        }
    }

    /// 按配置的提取方式提取并应用后处理
    ///
    /// 后处理失败时记录警告并返回未处理的原始值。
    pub fn extract(&self, document: &Document<'_>) -> Value {
        let raw = match self.method {
            SelectorMethod::First => self.extract_first(document),
            SelectorMethod::All => Value::Array(self.extract_all(document)),
        };
        let Some(transform) = &self.transform else {
            return raw;
        };
        match transform.apply(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(selector = %self.name, "Post processing failed, keeping raw value: {}", err);
                raw
            }
        }
    }

    /// 第一个匹配，未匹配时返回默认值
    pub fn extract_first(&self, document: &Document<'_>) -> Value {
        let found = match &self.rule {
            Rule::Regex(regex) => regex
                .captures(document.raw())
                .and_then(|caps| first_group(regex, &caps))
                .map(Value::String),
            Rule::Xpath(expr) => xpath_strings(document, expr)
                .and_then(|values| values.into_iter().next())
                .map(Value::String),
            Rule::Json(path) => document
                .json()
                .and_then(|root| walk_json(root, path))
                .filter(|value| !value.is_null())
                .cloned(),
            Rule::Static(directive) => Some(Value::String(directive.clone())),
            Rule::Css(selector) => document
                .html()
                .select(selector)
                .next()
                .map(|element| Value::String(element.text().collect())),
        };
        found.unwrap_or_else(|| self.default_return.clone())
    }

    /// 全部匹配，出错时返回空序列
    pub fn extract_all(&self, document: &Document<'_>) -> Vec<Value> {
        match &self.rule {
            Rule::Regex(regex) => regex
                .captures_iter(document.raw())
                .filter_map(|caps| first_group(regex, &caps))
                .map(Value::String)
                .collect(),
            Rule::Xpath(expr) => xpath_strings(document, expr)
                .unwrap_or_default()
                .into_iter()
                .map(Value::String)
                .collect(),
            // Json does not support `all`.
            Rule::Json(_) => Vec::new(),
            Rule::Static(directive) => vec![Value::String(directive.clone())],
            Rule::Css(selector) => document
                .html()
                .select(selector)
                .map(|element| Value::String(element.text().collect()))
                .collect(),
        }
    }
}

fn first_group(regex: &Regex, caps: &regex::Captures<'_>) -> Option<String> {
    let group = if regex.captures_len() > 1 { 1 } else { 0 };
    caps.get(group).map(|m| m.as_str().to_string())
}

fn xpath_strings(document: &Document<'_>, expr: &str) -> Option<Vec<String>> {
    let package = document.xml();
    let dom = package.as_document();
    let evaluated = sxd_xpath::evaluate_xpath(&dom, expr);
    match evaluated {
        Ok(sxd_xpath::Value::Nodeset(nodes)) => Some(
            nodes
                .document_order()
                .into_iter()
                .map(|node| node.string_value())
                .collect(),
        ),
        Ok(sxd_xpath::Value::String(s)) => Some(vec![s]),
        Ok(sxd_xpath::Value::Number(n)) => Some(vec![n.to_string()]),
        Ok(sxd_xpath::Value::Boolean(b)) => Some(vec![b.to_string()]),
        Err(err) => {
            warn!("XPath `{}` failed: {}", expr, err);
            None
        }
    }
}
