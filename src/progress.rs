use crate::http::env_secs;
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const TOTAL_STEPS: u8 = 5;

/// Generation stages, in the only order they may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AnalyzingPhotos,
    SearchingSimilarItems,
    GeneratingContent,
    SettingPrice,
    CreatingDraft,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::AnalyzingPhotos,
        Stage::SearchingSimilarItems,
        Stage::GeneratingContent,
        Stage::SettingPrice,
        Stage::CreatingDraft,
    ];

    /// Steps completed while this stage is running.
    pub fn index(self) -> u8 {
        match self {
            Stage::AnalyzingPhotos => 0,
            Stage::SearchingSimilarItems => 1,
            Stage::GeneratingContent => 2,
            Stage::SettingPrice => 3,
            Stage::CreatingDraft => 4,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Stage::AnalyzingPhotos => "analyzing_photos",
            Stage::SearchingSimilarItems => "searching_similar_items",
            Stage::GeneratingContent => "generating_content",
            Stage::SettingPrice => "setting_price",
            Stage::CreatingDraft => "creating_draft",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProgressStatus {
    Lifecycle(Lifecycle),
    Stage(Stage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    NotStarted,
    Started,
    Completed,
    Error,
}

impl ProgressStatus {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            ProgressStatus::Lifecycle(Lifecycle::Completed | Lifecycle::Error)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub job_id: String,
    #[serde(skip)]
    pub owner_id: String,
    pub status: ProgressStatus,
    pub current_step: Option<Stage>,
    pub steps_completed: u8,
    pub total_steps: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<String>,
    #[serde(skip)]
    finished_at: Option<Instant>,
}

impl ProgressState {
    pub fn not_started(job_id: &str, owner_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            owner_id: owner_id.to_string(),
            status: ProgressStatus::Lifecycle(Lifecycle::NotStarted),
            current_step: None,
            steps_completed: 0,
            total_steps: TOTAL_STEPS,
            error: None,
            listing_id: None,
            finished_at: None,
        }
    }

    fn expired(&self, ttl: Duration) -> bool {
        self.finished_at.is_some_and(|at| at.elapsed() >= ttl)
    }
}

/// Per-job progress records. Only the pipeline writes; pollers read snapshots.
/// Writes that would move a job backwards, or touch a finished job, are
/// ignored. Finished records are dropped once `ttl` has passed.
#[derive(Clone)]
pub struct ProgressTracker {
    jobs: Arc<Mutex<HashMap<String, ProgressState>>>,
    ttl: Duration,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(env_secs("PROGRESS_TTL_SECS", 3600)))
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Registers a job for `owner_id`. Returns false if the id is in use.
    pub async fn start(&self, job_id: &str, owner_id: &str) -> bool {
        let mut guard = self.jobs.lock().await;
        let ttl = self.ttl;
        guard.retain(|_, state| !state.expired(ttl));
        if guard.contains_key(job_id) {
            return false;
        }
        let mut state = ProgressState::not_started(job_id, owner_id);
        state.status = ProgressStatus::Lifecycle(Lifecycle::Started);
        guard.insert(job_id.to_string(), state);
        true
    }

    pub async fn enter(&self, job_id: &str, stage: Stage) {
        self.update(job_id, |state| {
            if state.current_step.is_some_and(|current| current.index() >= stage.index()) {
                return false;
            }
            state.status = ProgressStatus::Stage(stage);
            state.current_step = Some(stage);
            state.steps_completed = stage.index();
            true
        })
        .await;
    }

    pub async fn complete(&self, job_id: &str, listing_id: &str) {
        self.update(job_id, |state| {
            state.status = ProgressStatus::Lifecycle(Lifecycle::Completed);
            state.current_step = None;
            state.steps_completed = TOTAL_STEPS;
            state.listing_id = Some(listing_id.to_string());
            state.finished_at = Some(Instant::now());
            true
        })
        .await;
    }

    pub async fn fail(&self, job_id: &str, message: &str) {
        self.update(job_id, |state| {
            state.status = ProgressStatus::Lifecycle(Lifecycle::Error);
            state.steps_completed = 0;
            state.error = Some(message.to_string());
            state.finished_at = Some(Instant::now());
            true
        })
        .await;
    }

    pub async fn get(&self, job_id: &str) -> Option<ProgressState> {
        self.jobs
            .lock()
            .await
            .get(job_id)
            .filter(|state| !state.expired(self.ttl))
            .cloned()
    }

    async fn update(&self, job_id: &str, apply: impl FnOnce(&mut ProgressState) -> bool) {
        let mut guard = self.jobs.lock().await;
        let Some(state) = guard.get_mut(job_id) else {
            warn!(target = "snaplist.progress", job_id, "write_for_unregistered_job_ignored");
            return;
        };
        if state.status.is_terminal() {
            warn!(target = "snaplist.progress", job_id, status = ?state.status, "write_after_terminal_ignored");
            return;
        }
        if apply(state) {
            debug!(target = "snaplist.progress", job_id, status = ?state.status, steps = state.steps_completed, "progress_updated");
        }
    }
}
