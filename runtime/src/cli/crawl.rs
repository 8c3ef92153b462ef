// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! `harvester crawl` — one crawl pass, then exit.

use crate::config::HarvesterConfig;
use anyhow::Result;

pub async fn run(config: &HarvesterConfig, json: bool) -> Result<()> {
    let service = super::build_service(config).await?;
    let outcome = service.trigger_crawl().await?;

    if json {
        return super::print_json(&outcome);
    }

    println!("Crawled {} companies from {}", outcome.crawled, config.base_url);
    println!("  enriched:  {}", outcome.enriched);
    println!("  created:   {}", outcome.saved.created);
    println!("  updated:   {}", outcome.saved.updated);
    println!("  failed:    {}", outcome.saved.failed);
    println!("  stored:    {}", outcome.companies.len());
    println!("  duration:  {}ms", outcome.duration_ms);
    Ok(())
}
