// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 协调进程与提取进程之间的帧协议与传输实现
pub mod frame;
pub mod transport;
