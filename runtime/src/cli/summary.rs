// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! `harvester summary` — company count and latest update.

use crate::config::HarvesterConfig;
use anyhow::Result;

pub async fn run(config: &HarvesterConfig, json: bool) -> Result<()> {
    let service = super::build_service(config).await?;
    let summary = service.summary().await?;

    if json {
        return super::print_json(&summary);
    }

    println!("Companies:     {}", summary.total_companies);
    match summary.last_updated {
        Some(at) => println!("Last updated:  {}", at.to_rfc3339()),
        None => println!("Last updated:  never"),
    }
    Ok(())
}
