// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::package::{Package, SelectorsRef};
use crate::domain::selectors::SelectorConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 单帧最大字节数
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// 跨进程消息帧
///
/// 协调进程与提取进程之间唯一的传输单元。选择器集合先以 `Register` 注册，
/// 之后的数据包只携带引用。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// 注册一个步骤的选择器集合
    Register {
        selectors_ref: SelectorsRef,
        selectors: Vec<SelectorConfig>,
    },
    /// 释放已注册的选择器集合
    Release { selectors_ref: SelectorsRef },
    /// 数据包
    Package(Package),
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// 解码帧，无法识别的内容视为噪声返回 `None`
    pub fn decode(bytes: &[u8]) -> Option<Frame> {
        match serde_json::from_slice(bytes) {
            Ok(frame) => Some(frame),
            Err(err) => {
                debug!("Discarding undecodable frame ({} bytes): {}", bytes.len(), err);
                None
            }
        }
    }
}

impl From<Package> for Frame {
    fn from(package: Package) -> Self {
        Frame::Package(package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::selectors::SelectorKind;
    use serde_json::json;

    #[test]
    fn test_package_frame_is_tagged_flat() {
        let frame = Frame::Package(Package::new(
            "books",
            0,
            vec![json!("https://books.example")],
            Some(SelectorsRef::for_step("books", 0)),
        ));

        let value: serde_json::Value = serde_json::from_slice(&frame.encode().unwrap()).unwrap();

        assert_eq!(value["type"], json!("package"));
        assert_eq!(value["pipeline_name"], json!("books"));
        assert_eq!(value["selectors"], json!("books#0"));
        assert_eq!(value["closed_inbound"], json!(false));
    }

    #[test]
    fn test_register_frame_decodes() {
        let frame = Frame::Register {
            selectors_ref: SelectorsRef::for_step("books", 1),
            selectors: vec![SelectorConfig::new("title", SelectorKind::Css, "h1")],
        };

        assert_eq!(Frame::decode(&frame.encode().unwrap()), Some(frame));
    }

    #[test]
    fn test_noise_is_not_a_frame() {
        assert_eq!(Frame::decode(b"not json"), None);
        assert_eq!(Frame::decode(br#"{"type": "unknown"}"#), None);
        assert_eq!(Frame::decode(br#"[1, 2, 3]"#), None);
    }
}
