// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 持久化接收端实现
pub mod memory_sink;
pub mod sqlite_sink;
