// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 选择器集合引用
///
/// 跨进程传递时不序列化完整的规则集，只携带引用，由接收端解析。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorsRef(String);

impl SelectorsRef {
    /// 为流水线中的某个步骤生成引用
    pub fn for_step(pipeline_name: &str, step_order_id: usize) -> Self {
        Self(format!("{}#{}", pipeline_name, step_order_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SelectorsRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 数据包
///
/// 在所有队列之间流转的工作单元。`closed_inbound` 为真时表示后续不再有输入，
/// 此时数据包只作为结束信号被逐级转发，不会被抓取或提取。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// 所属流水线名称
    pub pipeline_name: String,
    /// 产生（或预期消费）该数据包的步骤序号
    pub step_order_id: usize,
    /// 负载：第0步为URL，抓取后为页面文本，提取后为结构化记录
    #[serde(default)]
    pub data: Vec<Value>,
    /// 解释 `data` 所需的选择器集合引用
    #[serde(default)]
    pub selectors: Option<SelectorsRef>,
    /// 结束信号标志
    #[serde(default)]
    pub closed_inbound: bool,
}

impl Package {
    /// 创建携带数据的数据包
    ///
    /// # 参数
    ///
    /// * `pipeline_name` - 所属流水线名称
    /// * `step_order_id` - 步骤序号
    /// * `data` - 负载数据
    /// * `selectors` - 选择器集合引用
    pub fn new(
        pipeline_name: impl Into<String>,
        step_order_id: usize,
        data: Vec<Value>,
        selectors: Option<SelectorsRef>,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            step_order_id,
            data,
            selectors,
            closed_inbound: false,
        }
    }

    /// 创建结束信号数据包
    pub fn sentinel(pipeline_name: impl Into<String>, step_order_id: usize) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            step_order_id,
            data: Vec::new(),
            selectors: None,
            closed_inbound: true,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.closed_inbound
    }

    /// 以新的负载派生数据包，保留名称、序号与结束标志
    pub fn with_data(&self, data: Vec<Value>) -> Self {
        Self {
            pipeline_name: self.pipeline_name.clone(),
            step_order_id: self.step_order_id,
            data,
            selectors: None,
            closed_inbound: self.closed_inbound,
        }
    }

    /// 以指定步骤序号重新标记结束信号
    ///
    /// 结束信号每经过一个步骤都需要带上该步骤的序号，路由器才能把它交给下一个步骤。
    pub fn restamped(self, step_order_id: usize) -> Self {
        Self {
            step_order_id,
            ..self
        }
    }
}
