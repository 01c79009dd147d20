use crate::{
    http::env_usize,
    models::{ApiError, GenerateRequest},
    pipeline::{JobContext, Pipeline},
    security::AuthContext,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, info};
use uuid::Uuid;

/// Background generation. Status lives in the pipeline's progress tracker,
/// keyed by job id; the queue only hands jobs to the dispatcher.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<JobContext>,
    pipeline: Pipeline,
}

impl JobQueue {
    pub fn spawn(pipeline: Pipeline) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<JobContext>(env_usize("QUEUE_CAPACITY", 64));
        let dispatcher = pipeline.clone();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // One task per job; nothing cancels it once started.
                let pipeline = dispatcher.clone();
                tokio::spawn(run_job(pipeline, job));
            }
        });

        (Self { tx, pipeline }, handle)
    }

    pub async fn enqueue(
        &self,
        request: GenerateRequest,
        context: &AuthContext,
    ) -> Result<String, ApiError> {
        let job = job_context(request, context);
        let job_id = job.job_id.clone();
        self.pipeline
            .register(&job_id, &context.owner_id)
            .await
            .map_err(|err| ApiError::new("job_id_in_use", err.detail()))?;
        if self.tx.send(job).await.is_err() {
            self.pipeline
                .progress()
                .fail(&job_id, "worker not available")
                .await;
            return Err(ApiError::new("queue_send_failed", "worker not available"));
        }
        info!(target = "snaplist.jobs", job_id = %job_id, owner_id = %context.owner_id, "job_enqueued");
        Ok(job_id)
    }
}

/// Turns an API request into the per-job context, minting a job id if the
/// caller did not supply one.
pub fn job_context(request: GenerateRequest, context: &AuthContext) -> JobContext {
    let job_id = request
        .job_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    JobContext {
        job_id,
        owner_id: context.owner_id.clone(),
        condition: request.condition,
        condition_level: request.condition_level,
        images: request.images,
    }
}

async fn run_job(pipeline: Pipeline, job: JobContext) {
    let job_id = job.job_id.clone();
    let worker = pipeline.clone();
    let outcome = tokio::spawn(async move { worker.execute(job).await }).await;
    // A panicking stage never reaches the pipeline's own error path.
    if let Err(join_err) = outcome {
        error!(target = "snaplist.jobs", job_id = %job_id, error = %join_err, "job_aborted");
        pipeline
            .progress()
            .fail(&job_id, &format!("job aborted: {join_err}"))
            .await;
    }
}
