use crate::assembler::{DraftParts, ListingAssembler, pick_category};
use crate::content::{ContentEngine, ContentRequest, GeneratedContent};
use crate::images::{ImageHostClient, ImageRef, InlineImage};
use crate::models::{Category, ListingDraft, StageReport};
use crate::pricing::suggest_price;
use crate::progress::{ProgressTracker, Stage};
use crate::search::{SearchEvidence, SimilaritySearch};
use crate::signal::Signal;
use serde::Serialize;
use serde_json::{Value, json};
use std::{future::Future, time::Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Everything one generation job needs, owned by the job.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub owner_id: String,
    pub condition: String,
    pub condition_level: u8,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub job_id: String,
    pub listing_id: String,
    pub stages: Vec<StageReport>,
}

#[derive(Clone)]
pub struct Pipeline {
    search: SimilaritySearch,
    content: ContentEngine,
    assembler: ListingAssembler,
    progress: ProgressTracker,
    images: ImageHostClient,
    currency: &'static str,
    max_images: usize,
}

impl Pipeline {
    pub fn new(
        search: SimilaritySearch,
        content: ContentEngine,
        assembler: ListingAssembler,
        progress: ProgressTracker,
        images: ImageHostClient,
        currency: &'static str,
        max_images: usize,
    ) -> Self {
        Self {
            search,
            content,
            assembler,
            progress,
            images,
            currency,
            max_images,
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Claims a progress record for `job_id` so pollers see `started` before
    /// any stage runs.
    pub async fn register(&self, job_id: &str, owner_id: &str) -> Result<(), PipelineError> {
        if self.progress.start(job_id, owner_id).await {
            Ok(())
        } else {
            Err(PipelineError::invalid_input("register", format!("job id `{job_id}` already in use")))
        }
    }

    pub async fn run(&self, ctx: JobContext) -> Result<GenerationReport, PipelineError> {
        self.register(&ctx.job_id, &ctx.owner_id).await?;
        self.execute(ctx).await
    }

    /// Runs the five stages for an already registered job. Any error is
    /// recorded on the progress record before it is returned.
    pub async fn execute(&self, ctx: JobContext) -> Result<GenerationReport, PipelineError> {
        let job_id = ctx.job_id.clone();
        match self.run_stages(&ctx).await {
            Ok(report) => {
                self.progress.complete(&job_id, &report.listing_id).await;
                info!(target = "snaplist.pipeline", job_id = %job_id, listing_id = %report.listing_id, "generation_completed");
                Ok(report)
            }
            Err(err) => {
                warn!(target = "snaplist.pipeline", job_id = %job_id, stage = err.stage(), error = %err.detail(), "generation_failed");
                self.progress.fail(&job_id, &err.to_string()).await;
                Err(err)
            }
        }
    }

    async fn run_stages(&self, ctx: &JobContext) -> Result<GenerationReport, PipelineError> {
        let mut stages = Vec::new();

        let photo = self
            .capture_stage(&ctx.job_id, Stage::AnalyzingPhotos, &mut stages, {
                stages::analyze_photos(&ctx.images, self.max_images, &self.images)
            })
            .await?;

        let evidence = self
            .capture_stage(&ctx.job_id, Stage::SearchingSimilarItems, &mut stages, {
                stages::search_similar(&self.search, &ctx.owner_id, photo.as_ref())
            })
            .await?;

        let content = self
            .capture_stage(&ctx.job_id, Stage::GeneratingContent, &mut stages, {
                stages::generate_content(&self.content, ctx, &evidence, photo.as_ref())
            })
            .await?;

        let price = self
            .capture_stage(&ctx.job_id, Stage::SettingPrice, &mut stages, {
                stages::set_price(&evidence)
            })
            .await?;

        let draft = self
            .capture_stage(&ctx.job_id, Stage::CreatingDraft, &mut stages, {
                stages::create_draft(
                    &self.assembler,
                    &self.search,
                    ctx,
                    &evidence,
                    &content,
                    price,
                    self.currency,
                )
            })
            .await?;

        Ok(GenerationReport {
            job_id: ctx.job_id.clone(),
            listing_id: draft.id,
            stages,
        })
    }

    async fn capture_stage<T, Fut>(
        &self,
        job_id: &str,
        stage: Stage,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        self.progress.enter(job_id, stage).await;
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(stage.id(), elapsed_ms);
        stages.push(StageReport::new(
            stage.id(),
            stage.index(),
            elapsed_ms,
            outcome.output,
        ));
        Ok(outcome.value)
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

pub mod stages {
    use super::*;

    /// Checks the photo references and picks the primary photo used for
    /// search and vision. A remote primary is downloaded best effort.
    pub async fn analyze_photos(
        images: &[String],
        max_images: usize,
        host: &ImageHostClient,
    ) -> Result<StageOutcome<Option<InlineImage>>, PipelineError> {
        const STAGE: &str = "analyzing_photos";
        if images.is_empty() {
            return Err(PipelineError::invalid_input(STAGE, "no images provided"));
        }
        if images.len() > max_images {
            return Err(PipelineError::invalid_input(
                STAGE,
                format!("too_many_images: {} > {max_images}", images.len()),
            ));
        }
        let mut parsed = Vec::with_capacity(images.len());
        for (idx, raw) in images.iter().enumerate() {
            let image = ImageRef::parse(raw).map_err(|err| {
                PipelineError::invalid_input(STAGE, format!("image {idx}: {err}"))
            })?;
            parsed.push(image);
        }

        let primary = match parsed.swap_remove(0) {
            ImageRef::Inline(image) => Signal::Found(image),
            ImageRef::Remote(url) => match host.download(&url).await {
                Ok(image) => Signal::Found(image),
                Err(err) => Signal::Failed(err.to_string()),
            },
        };
        if let Signal::Failed(err) = &primary {
            warn!(target = "snaplist.pipeline", error = %err, "primary_photo_unavailable");
        }
        let source = primary.label();
        let photo = match primary {
            Signal::Found(image) => Some(image),
            Signal::Empty | Signal::Failed(_) => None,
        };
        Ok(StageOutcome::new(
            photo.clone(),
            json!({
                "count": images.len(),
                "primary": source,
                "mime_type": photo.as_ref().map(|p| p.mime_type.clone()),
            }),
        ))
    }

    pub async fn search_similar(
        search: &SimilaritySearch,
        owner_id: &str,
        photo: Option<&InlineImage>,
    ) -> Result<StageOutcome<SearchEvidence>, PipelineError> {
        let evidence = search.gather(owner_id, photo).await;
        let output = json!({
            "results": evidence.results.len(),
            "sold": evidence.sold.len(),
            "keywords": evidence.keywords,
        });
        Ok(StageOutcome::new(evidence, output))
    }

    pub async fn generate_content(
        engine: &ContentEngine,
        ctx: &JobContext,
        evidence: &SearchEvidence,
        photo: Option<&InlineImage>,
    ) -> Result<StageOutcome<GeneratedContent>, PipelineError> {
        let (details, detail_source) = engine.product_details(evidence, photo).await;
        let (content, generator) = engine
            .generate(&ContentRequest {
                product_details: &details,
                condition: &ctx.condition,
                condition_level: ctx.condition_level,
            })
            .await;
        let output = json!({
            "details_source": detail_source,
            "generator": generator,
            "title": content.title,
        });
        Ok(StageOutcome::new(content, output))
    }

    pub async fn set_price(
        evidence: &SearchEvidence,
    ) -> Result<StageOutcome<String>, PipelineError> {
        let price = suggest_price(&evidence.sold, &evidence.results);
        Ok(StageOutcome::new(price.clone(), json!({ "price": price })))
    }

    pub async fn create_draft(
        assembler: &ListingAssembler,
        search: &SimilaritySearch,
        ctx: &JobContext,
        evidence: &SearchEvidence,
        content: &GeneratedContent,
        price: String,
        currency: &'static str,
    ) -> Result<StageOutcome<ListingDraft>, PipelineError> {
        let category = resolve_category(search, &ctx.owner_id, evidence, &content.title).await;
        let draft = assembler.build(DraftParts {
            owner_id: &ctx.owner_id,
            evidence,
            content,
            price,
            currency,
            condition: &ctx.condition,
            category,
            images: ctx.images.clone(),
        });
        let draft = assembler
            .persist(draft)
            .await
            .map_err(|err| PipelineError::internal("creating_draft", err.to_string()))?;
        let output = json!({
            "listing_id": draft.id,
            "category": draft.category_name,
            "category_id": draft.category_id,
            "specifics": draft.item_specifics.len(),
        });
        Ok(StageOutcome::new(draft, output))
    }

    /// Evidence category first; a taxonomy suggestion for the title fills in
    /// a missing id (or the whole category when evidence had none).
    async fn resolve_category(
        search: &SimilaritySearch,
        owner_id: &str,
        evidence: &SearchEvidence,
        title: &str,
    ) -> Option<Category> {
        let picked = pick_category(evidence);
        if picked.as_ref().is_some_and(|c| c.id.is_some()) {
            return picked;
        }
        let suggested = search.suggest_category(owner_id, title).await;
        match (picked, suggested) {
            (Some(picked), Some(suggested)) => Some(Category {
                id: suggested.id,
                name: picked.name,
            }),
            (picked, suggested) => suggested.or(picked),
        }
    }
}
