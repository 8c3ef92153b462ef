// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Text mining over success-story pages.

use crate::model::ScrapedRecord;
use regex::Regex;
use std::sync::LazyLock;

/// Text blocks read per page.
pub const MAX_BLOCKS: usize = 10;

/// Elements whose text counts as a block.
pub const BLOCK_SELECTOR: &str = "p, h1, h2, h3, h4, h5, h6, span, div";

const LEADERSHIP_ROLES: &[&str] = &[
    "CEO",
    "Chairman",
    "President",
    "Deputy Executive Chairman",
    "Managing Director",
    "Executive Director",
    "Director",
    "COO",
    "CFO",
    "CTO",
    "Vice President",
    "Managing Partner",
    "Partner",
    "Chief Executive Officer",
    "Chief Operating Officer",
    "Chief Financial Officer",
    "Chief Technology Officer",
];

const PERSON: &str = r"[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+";

static EMPLOYEES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:over|more than|all of its)?\s*([\d,]+\+?)\s*(?:employees|employee-owners|colleagues)",
    )
    .expect("valid regex")
});

static ROLES: LazyLock<String> = LazyLock::new(|| {
    LEADERSHIP_ROLES
        .iter()
        .map(|r| r.replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|")
});

static NAME_THEN_ROLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"({PERSON}),?\s*({})", *ROLES)).expect("valid regex")
});

static ROLE_THEN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?:[A-Z]{{2,4}}\s+)?({})\s+({PERSON})", *ROLES)).expect("valid regex")
});

static ACQUISITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:In|After|Since|bought|acquired|joined).*?(?:in\s+)?((?:January|February|March|April|May|June|July|August|September|October|November|December)?\s*\d{4}),?\s+([\s\S]*?)(?:\.\s|$)",
    )
    .expect("valid regex")
});

/// Facts mined from one page. `None`/empty means "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryFacts {
    pub employee_count: Option<String>,
    pub executives: Vec<String>,
    pub year_of_investment: Option<String>,
    pub ownership_details: Option<String>,
}

impl StoryFacts {
    /// A nameless partial record for deep-merging into the real one.
    pub fn into_record(self) -> ScrapedRecord {
        ScrapedRecord {
            employee_count: self.employee_count,
            executive_members: self.executives,
            year_of_investment: self.year_of_investment,
            ownership_details: self.ownership_details,
            ..ScrapedRecord::default()
        }
    }
}

/// Mine the first text blocks of a page.
///
/// `known_year` picks between several acquisition sentences.
pub fn mine_story(blocks: &[String], known_year: Option<&str>) -> StoryFacts {
    let text = blocks.join(" ");
    let first_block = blocks.first().map(|b| b.trim().to_string());

    let (year_of_investment, narrative) = acquisition(&text, known_year);
    let ownership_details = narrative
        .filter(|n| !n.is_empty())
        .or(first_block)
        .filter(|n| !n.is_empty());

    StoryFacts {
        employee_count: employee_count(&text),
        executives: executives(&text),
        year_of_investment,
        ownership_details,
    }
}

pub fn employee_count(text: &str) -> Option<String> {
    EMPLOYEES
        .captures(text)
        .map(|c| c[1].replace(',', ""))
        .filter(|n| !n.is_empty())
}

/// `Name (Role)` pairs in both orders, first occurrence wins.
pub fn executives(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |name: &str, role: &str| {
        let entry = format!("{} ({})", name.trim(), role.trim());
        if !found.contains(&entry) {
            found.push(entry);
        }
    };

    for caps in NAME_THEN_ROLE.captures_iter(text) {
        push(&caps[1], &caps[2]);
    }
    for caps in ROLE_THEN_NAME.captures_iter(text) {
        push(&caps[2], &caps[1]);
    }
    found
}

/// The acquisition year and narrative. With one candidate it is used; with
/// several the one mentioning `known_year` is.
pub fn acquisition(text: &str, known_year: Option<&str>) -> (Option<String>, Option<String>) {
    let candidates: Vec<(String, String)> = ACQUISITION
        .captures_iter(text)
        .map(|c| (c[1].trim().to_string(), c[2].trim().to_string()))
        .collect();

    let selected = match (candidates.len(), known_year.map(str::trim)) {
        (1, _) => candidates.into_iter().next(),
        (n, Some(year)) if n > 1 && !year.is_empty() => {
            candidates.into_iter().find(|(y, _)| y.contains(year))
        }
        _ => None,
    };

    match selected {
        Some((year, narrative)) => (Some(year).filter(|y| !y.is_empty()), Some(narrative)),
        None => (None, None),
    }
}
