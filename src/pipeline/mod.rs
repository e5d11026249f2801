// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 流水线模块
///
/// - 步骤（step）：流水线阶段特质
/// - 抓取步骤（scraper）：基于HTTP的步骤实现
/// - 抓取流水线（scraping_pipeline）：步骤链与内部路由
pub mod scraper;
pub mod scraping_pipeline;
pub mod step;

pub use scraper::{ScrapeMode, Scraper};
pub use scraping_pipeline::{PackageRouter, ScrapingPipeline};
pub use step::Step;
