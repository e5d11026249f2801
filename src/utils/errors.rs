// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

/// 选择器编译错误类型
#[derive(Error, Debug)]
pub enum SelectorError {
    #[error("无效的正则表达式 `{pattern}`: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("无效的CSS选择器: {0}")]
    InvalidCss(String),

    #[error("无效的XPath表达式: {0}")]
    InvalidXpath(String),

    #[error("无效的JSON路径: {0}")]
    InvalidJsonPath(String),

    #[error("未知的选择器类型: {0}")]
    UnknownKind(String),

    #[error("未知的提取方式: {0}")]
    UnknownMethod(String),

    #[error("后处理失败: {0}")]
    PostProcess(String),
}

/// HTTP抓取错误类型
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP客户端错误: {0}")]
    Client(#[from] reqwest::Error),

    #[error("无效的请求头 `{0}`")]
    InvalidHeader(String),
}

/// 流水线步骤错误类型
#[derive(Error, Debug)]
pub enum StepError {
    #[error("步骤 `{0}` 的出站通道已关闭")]
    OutboundClosed(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

/// 流水线错误类型
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("流水线 `{0}` 没有任何步骤")]
    Empty(String),

    #[error("流水线 `{0}` 的首个步骤缺少初始URL")]
    MissingInitialUrl(String),

    #[error("流水线 `{0}` 已经启动")]
    AlreadyInitiated(String),

    #[error("步骤构建失败: {0}")]
    Fetch(#[from] FetchError),
}

/// 持久化错误类型
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("无效的表名: {0}")]
    InvalidTable(String),
}

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("流水线名称不能为空")]
    EmptyName,

    #[error("流水线 `{0}` 已在队列中或正在运行")]
    DuplicatePipeline(String),

    #[error("流水线名称 `{0}` 无法作为结果表名")]
    InvalidName(String),

    #[error("流水线 `{name}` 与 `{existing}` 共用结果表 `{table}`")]
    TableCollision {
        name: String,
        existing: String,
        table: String,
    },

    #[error("引擎已关闭")]
    Closed,

    #[error("提取进程已断开")]
    ExtractorClosed,

    #[error("传输错误: {0}")]
    Transport(#[from] crate::queue::transport::TransportError),

    #[error("持久化错误: {0}")]
    Sink(#[from] SinkError),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// 流水线定义加载错误类型
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("读取定义文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("解析YAML失败: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("定义校验失败: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("选择器错误: {0}")]
    Selector(#[from] SelectorError),

    #[error("流水线错误: {0}")]
    Pipeline(#[from] PipelineError),
}
