//! rejection-sorter - Labels job-application rejections in a Gmail inbox
//!
//! This crate provides the sweep that scans the inbox, filters messages with
//! local keyword heuristics, classifies the remainder with an LLM, and
//! applies labels, plus the driver that re-invokes it until the inbox is done.

pub mod config;
pub mod domain;
pub mod providers;
pub mod services;
pub mod storage;
