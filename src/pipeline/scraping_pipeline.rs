// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::step::{selectors_ref, Step};
use crate::domain::models::package::Package;
use crate::domain::models::profile::Profile;
use crate::utils::errors::{PipelineError, StepError};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 流水线内部路由器
///
/// 把第 `k` 步的提取结果交给第 `k + 1` 步。最后一步的结果由引擎送往持久化，
/// 不应出现在这里。
#[derive(Clone)]
pub struct PackageRouter {
    pipeline_name: String,
    inbounds: Vec<UnboundedSender<Package>>,
}

impl PackageRouter {
    pub fn new(pipeline_name: impl Into<String>, inbounds: Vec<UnboundedSender<Package>>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            inbounds,
        }
    }

    /// 路由单个数据包
    ///
    /// # 返回值
    ///
    /// 数据包是否已交给下一步骤；违反路由约束或目标已关闭时记录错误并丢弃
    pub fn route(&self, package: Package) -> bool {
        let last = self.inbounds.len().saturating_sub(1);
        if package.step_order_id >= last {
            error!(
                pipeline = %self.pipeline_name,
                "Dropping package from step {}: only steps before {} may be routed internally",
                package.step_order_id,
                last
            );
            return false;
        }
        let next = package.step_order_id + 1;
        match self.inbounds[next].send(package) {
            Ok(()) => {
                debug!(pipeline = %self.pipeline_name, "Package distributed to step {}", next);
                true
            }
            Err(_) => {
                error!(pipeline = %self.pipeline_name, "Step {} no longer accepts packages", next);
                false
            }
        }
    }

    /// 持续分发 `general_inbound` 中的数据包，直到收到停止信号
    ///
    /// 停止时已在队列中的数据包仍会被分发。
    pub async fn distribute_packages(
        self,
        mut general_inbound: UnboundedReceiver<Package>,
        stop_distributing: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                received = general_inbound.recv() => match received {
                    Some(package) => {
                        self.route(package);
                    }
                    None => break,
                },
                _ = stop_distributing.cancelled() => {
                    while let Ok(package) = general_inbound.try_recv() {
                        self.route(package);
                    }
                    break;
                }
            }
        }
        debug!(pipeline = %self.pipeline_name, "Router stopped");
    }
}

type StepHandle = (String, JoinHandle<Result<(), StepError>>);

/// 抓取流水线
///
/// 一组有序步骤加一个共享档案，代表一次抓取运行。
pub struct ScrapingPipeline {
    profile: Arc<Profile>,
    steps: Vec<Arc<dyn Step>>,
    run_id: Uuid,
    general_tx: UnboundedSender<Package>,
    general_rx: Mutex<Option<UnboundedReceiver<Package>>>,
    inbounds: Mutex<Vec<UnboundedSender<Package>>>,
    outbound: Mutex<Option<UnboundedSender<Package>>>,
    step_handles: Mutex<Vec<StepHandle>>,
    router: Mutex<Option<JoinHandle<()>>>,
    stop_distributing: CancellationToken,
    terminal: watch::Sender<bool>,
}

impl ScrapingPipeline {
    /// 组装流水线
    ///
    /// # 参数
    ///
    /// * `profile` - 流水线档案
    /// * `steps` - 步骤列表，按 `pipeline_order_id` 排序
    pub fn new(profile: Arc<Profile>, mut steps: Vec<Arc<dyn Step>>) -> Self {
        steps.sort_by_key(|s| s.pipeline_order_id());
        for (position, step) in steps.iter().enumerate() {
            if step.pipeline_order_id() != position {
                warn!(
                    pipeline = %profile.name,
                    "Step `{}` declares position {} but sits at {}",
                    step.name(),
                    step.pipeline_order_id(),
                    position
                );
            }
        }
        let (general_tx, general_rx) = mpsc::unbounded_channel();
        let (terminal, _) = watch::channel(false);
        Self {
            profile,
            steps,
            run_id: Uuid::new_v4(),
            general_tx,
            general_rx: Mutex::new(Some(general_rx)),
            inbounds: Mutex::new(Vec::new()),
            outbound: Mutex::new(None),
            step_handles: Mutex::new(Vec::new()),
            router: Mutex::new(None),
            stop_distributing: CancellationToken::new(),
            terminal,
        }
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &Arc<Profile> {
        &self.profile
    }

    pub fn steps(&self) -> &[Arc<dyn Step>] {
        &self.steps
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 最后一个步骤的位置
    pub fn last_stage_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    /// 按名称查找步骤位置
    pub fn step_order_by_name(&self, name: &str) -> Option<usize> {
        self.steps
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.pipeline_order_id())
    }

    /// 引擎向流水线回送提取结果的入口
    pub fn general_inbound(&self) -> &UnboundedSender<Package> {
        &self.general_tx
    }

    /// 标记最后一个步骤的结束信号已到达持久化端
    pub fn mark_terminal(&self) {
        self.terminal.send_replace(true);
    }

    pub fn is_terminal(&self) -> bool {
        *self.terminal.borrow()
    }

    /// 启动流水线
    ///
    /// 为每个步骤创建新的入站通道，启动路由器与全部步骤，最后向第0步投放初始数据包与结束信号。
    ///
    /// # 参数
    ///
    /// * `outbound` - 引擎级共享出站通道
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 启动成功
    /// * `Err(PipelineError)` - 流水线为空、缺少初始URL或重复启动
    pub fn initiate(&self, outbound: UnboundedSender<Package>) -> Result<(), PipelineError> {
        let first = self
            .steps
            .first()
            .ok_or_else(|| PipelineError::Empty(self.name().to_string()))?;
        if first.initial_url().is_none() {
            return Err(PipelineError::MissingInitialUrl(self.name().to_string()));
        }
        let general_rx = self
            .general_rx
            .lock()
            .take()
            .ok_or_else(|| PipelineError::AlreadyInitiated(self.name().to_string()))?;

        let (inbounds, receivers): (Vec<UnboundedSender<Package>>, Vec<UnboundedReceiver<Package>>) =
            self.steps.iter().map(|_| mpsc::unbounded_channel()).unzip();

        let router = PackageRouter::new(self.name(), inbounds.clone());
        let stop = self.stop_distributing.clone();
        *self.router.lock() = Some(tokio::spawn(router.distribute_packages(general_rx, stop)));
        info!(pipeline = %self.name(), run_id = %self.run_id, "Started package distribution");

        let mut handles = Vec::with_capacity(self.steps.len());
        for (step, inbound) in self.steps.iter().zip(receivers) {
            let step = Arc::clone(step);
            let outbound = outbound.clone();
            let name = step.name().to_string();
            handles.push((name, tokio::spawn(async move { step.run(inbound, outbound).await })));
        }
        *self.step_handles.lock() = handles;
        *self.inbounds.lock() = inbounds;
        *self.outbound.lock() = Some(outbound);

        self.send_initial_packages();
        info!(pipeline = %self.name(), "Initial packages sent");
        Ok(())
    }

    /// 向第0步投放初始URL，紧随其后投放结束信号
    pub fn send_initial_packages(&self) {
        let inbounds = self.inbounds.lock();
        let (Some(first_inbound), Some(first)) = (inbounds.first(), self.steps.first()) else {
            error!(pipeline = %self.name(), "No step to seed");
            return;
        };
        let data: Vec<Value> = first
            .initial_url()
            .map(|url| Value::String(url.to_string()))
            .into_iter()
            .collect();
        let seed = Package::new(
            self.name(),
            0,
            data,
            Some(selectors_ref(self.name(), first.as_ref())),
        );
        if first_inbound.send(seed).is_err()
            || first_inbound.send(Package::sentinel(self.name(), 0)).is_err()
        {
            error!(pipeline = %self.name(), "First step stopped before it was seeded");
        }
    }

    /// 结束流水线
    ///
    /// 依次等待每个步骤结束，再等待最后一步的结束信号到达持久化端，
    /// 此时所有路由流量都已排空，随后停止路由器。
    ///
    /// 失败或崩溃的步骤来不及发出结束信号，由这里代为发出，下游步骤照常收尾。
    pub async fn clean_up_scrapers(&self) {
        let handles = std::mem::take(&mut *self.step_handles.lock());
        for ((name, handle), step) in handles.into_iter().zip(&self.steps) {
            match handle.await {
                Ok(Ok(())) => {
                    debug!(pipeline = %self.name(), "Step `{}` finished", name);
                    continue;
                }
                Ok(Err(err)) => error!(pipeline = %self.name(), "Step `{}` failed: {}", name, err),
                Err(err) => error!(pipeline = %self.name(), "Step `{}` panicked: {}", name, err),
            }
            self.close_on_behalf_of(step.pipeline_order_id());
        }

        let mut terminal = self.terminal.subscribe();
        if terminal.wait_for(|done| *done).await.is_err() {
            warn!(pipeline = %self.name(), "Terminal signal dropped");
        }

        self.stop_distributing.cancel();
        let router = self.router.lock().take();
        if let Some(router) = router {
            if let Err(err) = router.await {
                error!(pipeline = %self.name(), "Router task failed: {}", err);
            }
        }
        self.inbounds.lock().clear();
        self.outbound.lock().take();
        info!(pipeline = %self.name(), run_id = %self.run_id, "Pipeline cleaned up");
    }

    /// 代替已退出的步骤发出结束信号
    fn close_on_behalf_of(&self, step_order_id: usize) {
        let sentinel = Package::sentinel(self.name(), step_order_id);
        let sent = self
            .outbound
            .lock()
            .as_ref()
            .is_some_and(|outbound| outbound.send(sentinel).is_ok());
        if !sent {
            warn!(pipeline = %self.name(), "Outbound closed, not waiting for results");
            self.mark_terminal();
        }
    }

    /// 立即停止路由器与全部步骤
    pub fn abort(&self) {
        self.stop_distributing.cancel();
        for (_, handle) in self.step_handles.lock().iter() {
            handle.abort();
        }
        if let Some(router) = self.router.lock().as_ref() {
            router.abort();
        }
    }
}

impl fmt::Debug for ScrapingPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapingPipeline")
            .field("name", &self.profile.name)
            .field("steps", &self.steps.len())
            .field("run_id", &self.run_id)
            .finish()
    }
}

#[cfg(test)]
#[path = "scraping_pipeline_test.rs"]
mod tests;
