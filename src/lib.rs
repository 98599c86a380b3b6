//! Viewmeter - Rate-Limited View Counting Service
//!
//! This crate implements the admission-control and usage-aggregation layer of
//! a small HTTP analytics service. Every client address gets a token bucket
//! that gates its requests, idle clients are swept away in the background,
//! and admitted views and clicks are aggregated per content category and
//! minute in a concurrent counter store.

pub mod app;
pub mod clock;
pub mod config;
pub mod counters;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod task;
