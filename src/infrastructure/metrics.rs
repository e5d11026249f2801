// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::MetricsSettings;
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 初始化指标系统
///
/// 未启用时不安装导出器，各处的指标宏退化为空操作。
pub fn init_metrics(settings: &MetricsSettings) {
    if !settings.enabled {
        return;
    }

    let addr: SocketAddr = match settings.addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address `{}`: {}", settings.addr, e);
            return;
        }
    };

    // Ignore error if address is already in use (for development/testing)
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}. This might happen if the port is already in use.", e);
        return;
    }

    describe_gauge!("crowrs_active_pipelines", "Pipelines currently admitted");
    describe_gauge!("crowrs_queued_pipelines", "Pipelines waiting for a slot");
    describe_counter!(
        "crowrs_packages_relayed_total",
        "Packages moved across the extractor boundary"
    );
    describe_counter!("crowrs_pages_fetched_total", "Pages fetched with an acceptable status");
    describe_counter!("crowrs_pages_dropped_total", "Items dropped from fetch batches");
    describe_counter!("crowrs_rows_inserted_total", "Rows written to the persistence sink");

    info!("Metrics exporter listening on {}", addr);
}
