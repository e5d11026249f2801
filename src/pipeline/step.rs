// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::package::{Package, SelectorsRef};
use crate::domain::selectors::SelectorConfig;
use crate::utils::errors::StepError;
use async_trait::async_trait;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// 流水线步骤特质
///
/// 每个步骤从自己的入站通道读取数据包，直到遇到结束信号；
/// 处理结果与结束信号都写入共享的出站通道。
#[async_trait]
pub trait Step: Send + Sync {
    /// 步骤名称
    fn name(&self) -> &str;

    /// 在流水线中的位置，从0开始
    fn pipeline_order_id(&self) -> usize;

    /// 用于解释本步骤输出的选择器
    fn selectors(&self) -> &[SelectorConfig];

    /// 初始URL，只有第0步需要
    fn initial_url(&self) -> Option<&str> {
        None
    }

    /// 运行步骤
    ///
    /// # 参数
    ///
    /// * `inbound` - 本步骤的入站通道
    /// * `outbound` - 引擎级共享出站通道
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 已转发结束信号
    /// * `Err(StepError)` - 出站通道已关闭等无法继续的情况
    async fn run(
        &self,
        inbound: UnboundedReceiver<Package>,
        outbound: UnboundedSender<Package>,
    ) -> Result<(), StepError>;
}

/// 本步骤输出所绑定的选择器集合引用
pub fn selectors_ref(pipeline_name: &str, step: &dyn Step) -> SelectorsRef {
    SelectorsRef::for_step(pipeline_name, step.pipeline_order_id())
}
