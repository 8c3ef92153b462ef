// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Selector queries over an HTML snapshot.
//!
//! `scraper::Html` is not `Send`, so every query parses, reads, and drops the
//! document inside one synchronous call.

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector {selector:?}: {e:?}"))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

pub fn count(html: &str, selector: &str) -> Result<usize> {
    let sel = parse_selector(selector)?;
    let doc = Html::parse_document(html);
    Ok(doc.select(&sel).count())
}

/// Trimmed text of each match, empty strings included.
pub fn texts(html: &str, selector: &str) -> Result<Vec<String>> {
    let sel = parse_selector(selector)?;
    let doc = Html::parse_document(html);
    Ok(doc.select(&sel).map(element_text).collect())
}

/// `attribute` of each match that has it.
pub fn attributes(html: &str, selector: &str, attribute: &str) -> Result<Vec<String>> {
    let sel = parse_selector(selector)?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&sel)
        .filter_map(|el| el.value().attr(attribute).map(str::to_string))
        .collect())
}

pub fn row_cells(html: &str, row_selector: &str, cell_selector: &str) -> Result<Vec<Vec<String>>> {
    let rows = parse_selector(row_selector)?;
    let cells = parse_selector(cell_selector)?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&rows)
        .map(|row| row.select(&cells).map(element_text).collect())
        .collect())
}

/// Text of the first `limit` non-empty blocks inside the first `container`.
pub fn text_blocks(html: &str, container: &str, blocks: &str, limit: usize) -> Result<Vec<String>> {
    let container_sel = parse_selector(container)?;
    let block_sel = parse_selector(blocks)?;
    let doc = Html::parse_document(html);
    let Some(root) = doc.select(&container_sel).next() else {
        return Ok(Vec::new());
    };
    Ok(root
        .select(&block_sel)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .take(limit)
        .collect())
}

/// Split a selector list on its top-level commas. Commas inside quoted
/// values, attribute brackets or pseudo-class arguments are kept.
fn split_selector_list(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in selector.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&selector[start..]);
    parts
}

/// Prefix every part of the selector list `selector` with `scope`.
pub fn scoped(scope: Option<&str>, selector: &str) -> String {
    match scope {
        Some(scope) if !scope.trim().is_empty() => split_selector_list(selector)
            .into_iter()
            .map(|part| format!("{} {}", scope.trim(), part.trim()))
            .collect::<Vec<_>>()
            .join(", "),
        _ => selector.to_string(),
    }
}

/// Quote a value for use inside an attribute selector.
pub fn quote_attr(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
