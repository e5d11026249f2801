// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::EngineSettings;
use crate::domain::models::package::Package;
use crate::domain::repositories::persistence::{sanitize_identifier, PersistenceSink};
use crate::pipeline::step::selectors_ref;
use crate::pipeline::ScrapingPipeline;
use crate::queue::frame::Frame;
use crate::queue::transport::{FrameSink, FrameSource, TransportError};
use crate::utils::errors::EngineError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type ExtractorSink = Arc<Mutex<Option<Box<dyn FrameSink>>>>;

/// 协调引擎
///
/// 负责流水线准入、与提取进程之间的双向中继以及结果持久化。
/// 同时运行的流水线数量受 `max_active_pipelines` 限制，其余在队列中等待。
pub struct AsyncEngine {
    max_active: usize,
    slots: Arc<Semaphore>,
    backlog_tx: UnboundedSender<Arc<ScrapingPipeline>>,
    backlog_rx: Mutex<Option<UnboundedReceiver<Arc<ScrapingPipeline>>>>,
    pipeline_outbound: UnboundedSender<Package>,
    pipeline_outbound_rx: Mutex<Option<UnboundedReceiver<Package>>>,
    control_tx: UnboundedSender<Frame>,
    control_rx: Mutex<Option<UnboundedReceiver<Frame>>>,
    database_tx: UnboundedSender<Package>,
    database_rx: Mutex<Option<UnboundedReceiver<Package>>>,
    pipelines: DashMap<String, Arc<ScrapingPipeline>>,
    /// 结果表名到流水线名称
    tables: DashMap<String, String>,
    queued: AtomicUsize,
    outstanding: watch::Sender<usize>,
    extractor_tx: ExtractorSink,
    extractor_rx: Mutex<Option<Box<dyn FrameSource>>>,
    persistence: Arc<dyn PersistenceSink>,
    shutdown: CancellationToken,
}

impl AsyncEngine {
    /// 创建协调引擎
    ///
    /// # 参数
    ///
    /// * `settings` - 引擎配置
    /// * `extractor_tx` - 发往提取进程的帧
    /// * `extractor_rx` - 来自提取进程的帧
    /// * `persistence` - 最后一步结果的落地位置
    pub fn new(
        settings: &EngineSettings,
        extractor_tx: Box<dyn FrameSink>,
        extractor_rx: Box<dyn FrameSource>,
        persistence: Arc<dyn PersistenceSink>,
    ) -> Self {
        let max_active = settings.max_active_pipelines.max(1);
        let (backlog_tx, backlog_rx) = mpsc::unbounded_channel();
        let (pipeline_outbound, pipeline_outbound_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (database_tx, database_rx) = mpsc::unbounded_channel();
        let (outstanding, _) = watch::channel(0);

        Self {
            max_active,
            slots: Arc::new(Semaphore::new(max_active)),
            backlog_tx,
            backlog_rx: Mutex::new(Some(backlog_rx)),
            pipeline_outbound,
            pipeline_outbound_rx: Mutex::new(Some(pipeline_outbound_rx)),
            control_tx,
            control_rx: Mutex::new(Some(control_rx)),
            database_tx,
            database_rx: Mutex::new(Some(database_rx)),
            pipelines: DashMap::new(),
            tables: DashMap::new(),
            queued: AtomicUsize::new(0),
            outstanding,
            extractor_tx: Arc::new(Mutex::new(Some(extractor_tx))),
            extractor_rx: Mutex::new(Some(extractor_rx)),
            persistence,
            shutdown: CancellationToken::new(),
        }
    }

    /// 提交流水线
    ///
    /// 流水线先进入等待队列，由准入循环在有空位时启动。
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 已入队
    /// * `Err(EngineError)` - 名称为空或无法作为表名、同名流水线已在队列或运行中、
    ///   与在册流水线映射到同一张结果表、引擎已停止
    pub fn submit(&self, pipeline: ScrapingPipeline) -> Result<(), EngineError> {
        let name = pipeline.name().to_string();
        if name.trim().is_empty() {
            return Err(EngineError::EmptyName);
        }
        let table =
            sanitize_identifier(&name).ok_or_else(|| EngineError::InvalidName(name.clone()))?;
        match self.tables.entry(table.clone()) {
            Entry::Occupied(entry) if entry.get() == &name => {
                return Err(EngineError::DuplicatePipeline(name));
            }
            Entry::Occupied(entry) => {
                return Err(EngineError::TableCollision {
                    name,
                    existing: entry.get().clone(),
                    table,
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(name.clone());
            }
        }

        self.queued.fetch_add(1, Ordering::SeqCst);
        self.outstanding.send_modify(|n| *n += 1);
        if self.backlog_tx.send(Arc::new(pipeline)).is_err() {
            if self.tables.remove(&table).is_some() {
                self.leave_backlog(1);
            }
            return Err(EngineError::Closed);
        }
        info!(pipeline = %name, "Pipeline queued");
        self.update_gauges();
        Ok(())
    }

    /// 从等待计数与未结束计数中扣除
    fn leave_backlog(&self, count: usize) {
        let _ = self
            .queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(count)));
        self.outstanding.send_modify(|n| *n = n.saturating_sub(count));
    }

    /// 释放仍在队列中的流水线
    ///
    /// 准入循环停止后调用。队列接收端此时已被丢弃，登记在册却未进入运行表的
    /// 名称就是未能启动的流水线。
    fn release_backlog(&self) {
        let mut abandoned = Vec::new();
        self.tables.retain(|_, name| {
            let queued = !self.pipelines.contains_key(name.as_str());
            if queued {
                abandoned.push(name.clone());
            }
            !queued
        });
        if abandoned.is_empty() {
            return;
        }
        for name in &abandoned {
            warn!(pipeline = %name, "Engine stopped before pipeline could start");
        }
        self.leave_backlog(abandoned.len());
        self.update_gauges();
    }

    /// 正在运行的流水线数量
    pub fn active_count(&self) -> usize {
        self.max_active - self.slots.available_permits()
    }

    /// 等待启动的流水线数量
    pub fn queued_count(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.pipelines.contains_key(name)
    }

    /// 等待所有已提交的流水线结束
    pub async fn wait_until_idle(&self) {
        let mut outstanding = self.outstanding.subscribe();
        let _ = outstanding.wait_for(|n| *n == 0).await;
    }

    /// 请求停止引擎
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// 运行引擎
    ///
    /// 并发运行准入循环、两个中继方向与持久化写入，直到停止或任一部分失败。
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 已按请求停止
    /// * `Err(EngineError)` - 提取进程断开、传输或持久化失败，或重复调用
    pub async fn run(self: Arc<Self>) -> Result<(), EngineError> {
        info!("Engine running with up to {} active pipelines", self.max_active);
        let result = tokio::try_join!(
            self.track_new_pipelines(),
            self.forward_to_extractor(),
            self.forward_from_extractor(),
            self.export_to_database(),
        );
        match result {
            Ok(_) => {
                self.release_backlog();
                info!("Engine stopped");
                Ok(())
            }
            Err(err) => {
                error!("Engine failed: {}", err);
                self.shutdown.cancel();
                self.extractor_tx.lock().take();
                self.release_backlog();
                Err(err)
            }
        }
    }

    /// 准入循环
    ///
    /// 按提交顺序取出流水线，取得空位后登记并启动。
    async fn track_new_pipelines(self: &Arc<Self>) -> Result<(), EngineError> {
        let mut backlog = self.backlog_rx.lock().take().ok_or(EngineError::Closed)?;
        loop {
            let pipeline = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                next = backlog.recv() => match next {
                    Some(pipeline) => pipeline,
                    None => return Ok(()),
                },
            };
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                permit = Arc::clone(&self.slots).acquire_owned() => {
                    permit.map_err(|_| EngineError::Closed)?
                }
            };

            self.queued.fetch_sub(1, Ordering::SeqCst);
            self.pipelines
                .insert(pipeline.name().to_string(), Arc::clone(&pipeline));
            self.update_gauges();

            let engine = Arc::clone(self);
            tokio::spawn(async move { engine.handle_pipeline(pipeline, permit).await });
        }
    }

    /// 单条流水线的完整生命周期
    async fn handle_pipeline(
        self: Arc<Self>,
        pipeline: Arc<ScrapingPipeline>,
        permit: OwnedSemaphorePermit,
    ) {
        let name = pipeline.name().to_string();
        info!(pipeline = %name, run_id = %pipeline.run_id(), "New pipeline is being handled");

        if let Some(last) = pipeline.steps().last() {
            if let Err(err) = self.persistence.ensure_table(&name, last.selectors()).await {
                error!(pipeline = %name, "Failed to prepare result table: {}", err);
            }
        }
        for step in pipeline.steps() {
            let frame = Frame::Register {
                selectors_ref: selectors_ref(&name, step.as_ref()),
                selectors: step.selectors().to_vec(),
            };
            if self.control_tx.send(frame).is_err() {
                warn!(pipeline = %name, "Extractor relay stopped before registration");
            }
        }

        pipeline.profile().record_crawl();
        match pipeline.initiate(self.pipeline_outbound.clone()) {
            Ok(()) => {
                tokio::select! {
                    _ = pipeline.clean_up_scrapers() => {}
                    _ = self.shutdown.cancelled() => {
                        warn!(pipeline = %name, "Engine stopping, aborting pipeline");
                        pipeline.abort();
                    }
                }
            }
            Err(err) => error!(pipeline = %name, "Pipeline failed to start: {}", err),
        }

        for step in pipeline.steps() {
            let _ = self.control_tx.send(Frame::Release {
                selectors_ref: selectors_ref(&name, step.as_ref()),
            });
        }
        self.pipelines.remove(&name);
        if let Some(table) = sanitize_identifier(&name) {
            self.tables.remove_if(&table, |_, owner| owner == &name);
        }
        drop(permit);
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
        self.update_gauges();
        info!(pipeline = %name, "Pipeline finished");
    }

    /// 把控制帧与流水线出站数据包转发给提取进程
    ///
    /// 控制帧优先，保证选择器注册先于使用它的数据包到达。
    async fn forward_to_extractor(&self) -> Result<(), EngineError> {
        let mut packages = self
            .pipeline_outbound_rx
            .lock()
            .take()
            .ok_or(EngineError::Closed)?;
        let mut control = self.control_rx.lock().take().ok_or(EngineError::Closed)?;

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(frame) = control.recv() => frame,
                Some(package) = packages.recv() => Frame::Package(package),
                else => break,
            };
            let sink = Arc::clone(&self.extractor_tx);
            tokio::task::spawn_blocking(move || match sink.lock().as_mut() {
                Some(sink) => sink.send(&frame),
                None => Err(TransportError::Closed),
            })
            .await??;
            metrics::counter!("crowrs_packages_relayed_total", "direction" => "out").increment(1);
        }

        // 关闭写端，提取进程读到结束后退出
        self.extractor_tx.lock().take();
        debug!("Outbound relay stopped");
        Ok(())
    }

    /// 接收提取进程的结果并分发
    ///
    /// 阻塞读取在独立线程中进行。最后一步的结果进入持久化队列，其余交给所属流水线。
    async fn forward_from_extractor(&self) -> Result<(), EngineError> {
        let mut source = self.extractor_rx.lock().take().ok_or(EngineError::Closed)?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Result<Option<Frame>, TransportError>>();
        std::thread::Builder::new()
            .name("crowrs-extractor-reader".to_string())
            .spawn(move || loop {
                let next = source.recv();
                let last = !matches!(next, Ok(Some(_)));
                if tx.send(next).is_err() || last {
                    break;
                }
            })
            .map_err(TransportError::Io)?;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                next = rx.recv() => next,
            };
            match next {
                Some(Ok(Some(Frame::Package(package)))) => self.dispatch_extracted(package),
                Some(Ok(Some(other))) => warn!("Ignoring unexpected frame from extractor: {:?}", other),
                Some(Err(err)) => return Err(err.into()),
                Some(Ok(None)) | None => {
                    if self.shutdown.is_cancelled() {
                        return Ok(());
                    }
                    return Err(EngineError::ExtractorClosed);
                }
            }
        }
    }

    fn dispatch_extracted(&self, package: Package) {
        metrics::counter!("crowrs_packages_relayed_total", "direction" => "in").increment(1);
        let Some(pipeline) = self
            .pipelines
            .get(&package.pipeline_name)
            .map(|entry| Arc::clone(entry.value()))
        else {
            warn!(pipeline = %package.pipeline_name, "Dropping package for unknown pipeline");
            return;
        };

        if package.step_order_id == pipeline.last_stage_index() {
            if self.database_tx.send(package).is_err() {
                error!(pipeline = %pipeline.name(), "Result writer stopped");
            }
        } else if pipeline.general_inbound().send(package).is_err() {
            warn!(pipeline = %pipeline.name(), "Pipeline no longer accepts packages");
        }
    }

    /// 把最后一步的结果写入持久化端
    ///
    /// 结束信号写完后标记所属流水线，允许其清理。
    async fn export_to_database(&self) -> Result<(), EngineError> {
        let mut results = self.database_rx.lock().take().ok_or(EngineError::Closed)?;
        loop {
            let package = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                next = results.recv() => match next {
                    Some(package) => package,
                    None => return Ok(()),
                },
            };

            if package.is_sentinel() {
                self.persistence.finish(&package.pipeline_name).await?;
                if let Some(pipeline) = self
                    .pipelines
                    .get(&package.pipeline_name)
                    .map(|entry| Arc::clone(entry.value()))
                {
                    pipeline.mark_terminal();
                }
                debug!(pipeline = %package.pipeline_name, "Results complete");
                continue;
            }
            if package.data.is_empty() {
                continue;
            }
            let inserted = self
                .persistence
                .bulk_insert(&package.pipeline_name, &package.data)
                .await?;
            debug!(pipeline = %package.pipeline_name, "Stored {} records", inserted);
        }
    }

    fn update_gauges(&self) {
        metrics::gauge!("crowrs_active_pipelines").set(self.active_count() as f64);
        metrics::gauge!("crowrs_queued_pipelines").set(self.queued_count() as f64);
    }
}

#[cfg(test)]
#[path = "async_engine_test.rs"]
mod tests;
