//! Shared test doubles for pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use imgagent_core::{RoleDraft, SceneDraft};
use imgagent_error::{GenerationError, GenerationErrorKind, LeaseError, LeaseErrorKind};
use imgagent_interface::{GenerationClient, LeaseStore};
use imgagent_lease::InMemoryLeaseStore;
use imgagent_pipeline::PipelineConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Generation operations the mock can script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ExtractRoles,
    ExtractScenes,
    GenerateImage,
    GenerateVoice,
}

#[derive(Debug, Clone)]
struct FailurePlan {
    op: Op,
    needle: String,
    remaining: u32,
    transient: bool,
}

#[derive(Debug, Default)]
struct MockState {
    failures: Vec<FailurePlan>,
    calls: Vec<(Op, String)>,
    in_flight: HashMap<String, usize>,
}

/// Scripted generation client.
///
/// Roles come from `with_roles` (one role per document by default). Scenes
/// are the non-empty lines of the chapter text. Media URLs are derived from
/// the scene text, so reruns produce identical URLs.
#[derive(Debug, Clone, Default)]
pub struct MockGenerationClient {
    roles: Vec<RoleDraft>,
    delays: HashMap<Op, Duration>,
    hang: Option<Op>,
    state: Arc<Mutex<MockState>>,
    overlap: Arc<AtomicBool>,
}

impl MockGenerationClient {
    pub fn new() -> Self {
        Self {
            roles: vec![RoleDraft {
                name: "Lin".to_string(),
                gender: "female".to_string(),
                character: "a lighthouse keeper".to_string(),
                appearance: "grey coat, lantern in hand".to_string(),
            }],
            ..Self::default()
        }
    }

    pub fn with_roles(mut self, roles: Vec<RoleDraft>) -> Self {
        self.roles = roles;
        self
    }

    /// Fail `times` calls of `op` whose input contains `needle`.
    pub fn fail_times(self, op: Op, needle: &str, times: u32, transient: bool) -> Self {
        self.state.lock().unwrap().failures.push(FailurePlan {
            op,
            needle: needle.to_string(),
            remaining: times,
            transient,
        });
        self
    }

    /// Sleep before answering `op`.
    pub fn with_delay(mut self, op: Op, delay: Duration) -> Self {
        self.delays.insert(op, delay);
        self
    }

    /// Never answer `op`.
    pub fn hang_on(mut self, op: Op) -> Self {
        self.hang = Some(op);
        self
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(o, _)| *o == op)
            .count()
    }

    pub fn calls_containing(&self, op: Op, needle: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(o, input)| *o == op && input.contains(needle))
            .count()
    }

    /// Inputs of `op` in call order.
    pub fn inputs(&self, op: Op) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, input)| input.clone())
            .collect()
    }

    /// Whether two calls with the same input ever ran at the same time.
    pub fn saw_overlap(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    async fn call(&self, op: Op, input: &str) -> Result<(), GenerationError> {
        let planned = {
            let mut state = self.state.lock().unwrap();
            state.calls.push((op, input.to_string()));
            let entry = state.in_flight.entry(input.to_string()).or_insert(0);
            *entry += 1;
            if *entry > 1 {
                self.overlap.store(true, Ordering::SeqCst);
            }
            state
                .failures
                .iter_mut()
                .find(|f| f.op == op && f.remaining > 0 && input.contains(&f.needle))
                .map(|f| {
                    f.remaining -= 1;
                    f.transient
                })
        };

        if self.hang == Some(op) {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delays.get(&op) {
            tokio::time::sleep(*delay).await;
        }

        if let Some(entry) = self.state.lock().unwrap().in_flight.get_mut(input) {
            *entry -= 1;
        }

        match planned {
            Some(true) => Err(GenerationError::new(GenerationErrorKind::Http {
                status_code: 503,
                message: "ServiceUnavailable".to_string(),
            })),
            Some(false) => Err(GenerationError::new(GenerationErrorKind::ContentRejected(
                "DataInspectionFailed".to_string(),
            ))),
            None => Ok(()),
        }
    }
}

fn media_url(kind: &str, text: &str) -> String {
    format!(
        "https://media.test/{}/{}",
        kind,
        Uuid::new_v5(&Uuid::NAMESPACE_URL, text.as_bytes())
    )
}

#[async_trait]
impl GenerationClient for MockGenerationClient {
    async fn extract_roles(&self, text: &str) -> Result<Vec<RoleDraft>, GenerationError> {
        self.call(Op::ExtractRoles, text).await?;
        Ok(self.roles.clone())
    }

    async fn extract_scenes(&self, chapter_text: &str) -> Result<Vec<SceneDraft>, GenerationError> {
        self.call(Op::ExtractScenes, chapter_text).await?;
        Ok(chapter_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| SceneDraft {
                content: line.to_string(),
            })
            .collect())
    }

    async fn generate_image(&self, scene_text: &str) -> Result<String, GenerationError> {
        self.call(Op::GenerateImage, scene_text).await?;
        Ok(media_url("image", scene_text))
    }

    async fn generate_voice(&self, scene_text: &str) -> Result<String, GenerationError> {
        self.call(Op::GenerateVoice, scene_text).await?;
        Ok(media_url("voice", scene_text))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Lease store whose renewals start failing once revoked or partitioned.
#[derive(Debug, Clone, Default)]
pub struct RevocableLeaseStore {
    inner: InMemoryLeaseStore,
    revoked: Arc<AtomicBool>,
    partitioned: Arc<AtomicBool>,
}

impl RevocableLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share the lease entries of another store.
    pub fn over(inner: InMemoryLeaseStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Renewals report a backend error, so the holder never learns of loss.
    pub fn partition(&self) {
        self.partitioned.store(true, Ordering::SeqCst);
    }

    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LeaseStore for RevocableLeaseStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LeaseError> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        if self.partitioned.load(Ordering::SeqCst) {
            return Err(LeaseError::new(LeaseErrorKind::Connection(
                "partitioned".to_string(),
            )));
        }
        if self.revoked.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.compare_and_extend(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, LeaseError> {
        self.inner.compare_and_delete(key, value).await
    }
}

/// Settings with millisecond-scale timings.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig::builder()
        .workers(2usize)
        .batch_size(4usize)
        .poll_interval_ms(5u64)
        .max_idle_backoff_ms(20u64)
        .lease_ttl_ms(2_000u64)
        .lease_renew_interval_ms(100u64)
        .stage_timeout_ms(5_000u64)
        .shutdown_grace_ms(2_000u64)
        .max_attempts(5u32)
        .retry_base_ms(5u64)
        .retry_max_ms(20u64)
        .build()
        .unwrap()
}
