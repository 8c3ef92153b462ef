// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! `harvester serve` — run the REST API.

use crate::config::HarvesterConfig;
use crate::rest;
use anyhow::Result;
use tracing::info;

pub async fn run(config: &HarvesterConfig) -> Result<()> {
    info!(
        "starting harvester v{} for {}",
        env!("CARGO_PKG_VERSION"),
        config.base_url
    );
    let service = super::build_service(config).await?;

    tokio::select! {
        result = rest::start(&config.http_host, config.http_port, service) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}
