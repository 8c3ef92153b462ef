// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Harvester runtime library — crawl a JavaScript-rendered investment
//! portfolio site, reconcile the companies it lists, and persist them.
//!
//! The binary in `main.rs` is a thin CLI over these modules; integration
//! tests drive them directly.

pub mod cli;
pub mod company;
pub mod config;
pub mod extraction;
pub mod geo;
pub mod merge;
pub mod model;
pub mod proxy;
pub mod rate_limit;
pub mod renderer;
pub mod rest;
pub mod retry;
pub mod service;
pub mod session;
pub mod stealth;
pub mod store;
pub mod strategy;
