//! Generation service client for the imgagent pipeline.
//!
//! [`BailianClient`] talks to Alibaba Cloud Bailian (DashScope): chat
//! completion for role and scene extraction, asynchronous image synthesis
//! tasks, and speech synthesis. Every failure is classified as transient or
//! permanent so the pipeline can decide whether to retry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod dto;
mod extraction;
mod prompts;

pub use client::{BailianClient, classify_status};
pub use config::{BailianConfig, BailianConfigBuilder};
pub use extraction::{extract_json, parse_role_drafts, parse_scene_drafts};
