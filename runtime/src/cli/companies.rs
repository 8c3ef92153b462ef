// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! `harvester companies` — list stored companies.

use crate::config::HarvesterConfig;
use crate::model::StoredCompany;
use anyhow::Result;

fn headquarters(company: &StoredCompany) -> String {
    let location = &company.company.location;
    [&location.city, &location.state, &location.country]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn run(config: &HarvesterConfig, refresh: bool, json: bool) -> Result<()> {
    let service = super::build_service(config).await?;
    let companies = service.list_companies(refresh).await?;

    if json {
        return super::print_json(&companies);
    }

    if companies.is_empty() {
        println!("No companies stored yet. Run 'harvester crawl' first.");
        return Ok(());
    }
    for company in &companies {
        let general = &company.company.general;
        println!(
            "{:>5}  {:<40}  {:<30}  {}",
            company.company_id,
            general.name,
            general.website_url.as_deref().unwrap_or("-"),
            headquarters(company)
        );
    }
    println!("{} companies", companies.len());
    Ok(())
}
