// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::package::{Package, SelectorsRef};
use crate::domain::selectors::{SelectorConfig, SelectorList};
use crate::queue::frame::Frame;
use crate::queue::transport::{FrameSink, FrameSource, TransportError};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// 提取引擎
///
/// 运行在独立进程中，对收到的数据包执行选择器提取并把结果送回协调进程。
/// 唯一的状态是已注册的选择器集合。
pub struct SyncEngine<S, K> {
    inbound: S,
    outbound: K,
    selectors: HashMap<SelectorsRef, SelectorList>,
}

impl<S: FrameSource, K: FrameSink> SyncEngine<S, K> {
    /// 创建提取引擎
    ///
    /// # 参数
    ///
    /// * `inbound` - 来自协调进程的帧
    /// * `outbound` - 发往协调进程的帧
    pub fn new(inbound: S, outbound: K) -> Self {
        Self {
            inbound,
            outbound,
            selectors: HashMap::new(),
        }
    }

    /// 处理入站帧，直到对端关闭
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 入站通道已关闭
    /// * `Err(TransportError)` - 读写失败
    pub fn initiate(&mut self) -> Result<(), TransportError> {
        info!("Extractor ready");
        while let Some(frame) = self.inbound.recv()? {
            match frame {
                Frame::Register {
                    selectors_ref,
                    selectors,
                } => self.register(selectors_ref, &selectors),
                Frame::Release { selectors_ref } => {
                    if self.selectors.remove(&selectors_ref).is_some() {
                        debug!("Released selectors {}", selectors_ref);
                    }
                }
                Frame::Package(package) => {
                    if let Some(processed) = self.process_package(package) {
                        self.outbound.send(&Frame::Package(processed))?;
                    }
                }
            }
        }
        info!("Inbound closed, extractor stopping");
        Ok(())
    }

    fn register(&mut self, selectors_ref: SelectorsRef, configs: &[SelectorConfig]) {
        let list = match SelectorList::compile(configs) {
            Ok(list) => list,
            Err(err) => {
                error!("Selectors {} failed to compile, data will pass through: {}", selectors_ref, err);
                SelectorList::default()
            }
        };
        debug!("Registered {} selectors as {}", list.len(), selectors_ref);
        self.selectors.insert(selectors_ref, list);
    }

    /// 处理单个数据包
    ///
    /// 结束信号原样返回；引用了未注册选择器的数据包被丢弃；
    /// 未绑定选择器的数据包原样透传数据。
    pub fn process_package(&self, package: Package) -> Option<Package> {
        if package.is_sentinel() {
            return Some(package);
        }
        let extracted = match &package.selectors {
            None => package.data.clone(),
            Some(selectors_ref) => match self.selectors.get(selectors_ref) {
                Some(list) => list.extract_batch(&package.data).into_data(),
                None => {
                    warn!(
                        pipeline = %package.pipeline_name,
                        "Dropping package bound to unknown selectors {}",
                        selectors_ref
                    );
                    return None;
                }
            },
        };
        Some(package.with_data(extracted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::selectors::SelectorKind;
    use crate::queue::transport::channel;
    use serde_json::json;

    fn register(name: &str, order: usize, selectors: Vec<SelectorConfig>) -> Frame {
        Frame::Register {
            selectors_ref: SelectorsRef::for_step(name, order),
            selectors,
        }
    }

    fn run(frames: Vec<Frame>, noise: Vec<Vec<u8>>) -> Vec<Frame> {
        let (mut to_engine, engine_in) = channel();
        let (engine_out, mut from_engine) = channel();
        for bytes in noise {
            to_engine.send_raw(bytes).unwrap();
        }
        for frame in &frames {
            to_engine.send(frame).unwrap();
        }
        drop(to_engine);

        SyncEngine::new(engine_in, engine_out).initiate().unwrap();

        let mut out = Vec::new();
        while let Some(frame) = from_engine.recv().unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn test_sentinel_passes_unchanged() {
        let sentinel = Package::sentinel("books", 1);

        let out = run(vec![Frame::Package(sentinel.clone())], Vec::new());

        assert_eq!(out, vec![Frame::Package(sentinel)]);
    }

    #[test]
    fn test_registered_selectors_extract() {
        let out = run(
            vec![
                register(
                    "books",
                    0,
                    vec![SelectorConfig::new("price", SelectorKind::Regex, r"\$(\d+)")],
                ),
                Frame::Package(Package::new(
                    "books",
                    0,
                    vec![json!("<p>$12</p>")],
                    Some(SelectorsRef::for_step("books", 0)),
                )),
            ],
            Vec::new(),
        );

        let Frame::Package(package) = &out[0] else {
            panic!("expected a package");
        };
        assert_eq!(package.data, vec![json!({"price": "12"})]);
        assert_eq!(package.step_order_id, 0);
        assert!(package.selectors.is_none());
    }

    #[test]
    fn test_noise_and_unknown_refs_are_dropped() {
        let out = run(
            vec![
                Frame::Package(Package::new(
                    "books",
                    0,
                    vec![json!("x")],
                    Some(SelectorsRef::for_step("books", 0)),
                )),
                Frame::Package(Package::sentinel("books", 0)),
            ],
            vec![b"\x00\x01".to_vec(), br#"{"type":"package"}"#.to_vec()],
        );

        assert_eq!(out, vec![Frame::Package(Package::sentinel("books", 0))]);
    }

    #[test]
    fn test_released_selectors_are_forgotten() {
        let selectors_ref = SelectorsRef::for_step("books", 0);
        let out = run(
            vec![
                register("books", 0, Vec::new()),
                Frame::Release {
                    selectors_ref: selectors_ref.clone(),
                },
                Frame::Package(Package::new("books", 0, vec![json!("x")], Some(selectors_ref))),
            ],
            Vec::new(),
        );

        assert!(out.is_empty());
    }

    #[test]
    fn test_unbound_package_passes_data_through() {
        let out = run(
            vec![Frame::Package(Package::new("books", 0, vec![json!("a")], None))],
            Vec::new(),
        );

        assert_eq!(
            out,
            vec![Frame::Package(Package::new("books", 0, vec![json!("a")], None))]
        );
    }
}
