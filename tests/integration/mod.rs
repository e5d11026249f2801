// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod engine_test;
pub mod extractor_process_test;
pub mod helpers;
