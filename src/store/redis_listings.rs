use super::{ListingRepository, MarkPushed, StoreError};
use crate::http::env_secs;
use crate::models::{ListingDraft, ListingStatus};
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

const DEFAULT_CLAIM_SECS: u64 = 300;

/// Drafts stored as JSON under `listing:{id}`. The external id is recorded
/// under `listing:{id}:external` with `SET NX`, so a draft is marked pushed at
/// most once. That alone does not stop two instances from both creating an
/// offer; publishers serialize on `listing:{id}:publishing`, an expiring
/// `SET NX PX` claim taken before the first marketplace write.
#[derive(Clone)]
pub struct RedisListingRepository {
    client: redis::Client,
    claim_ttl_ms: u64,
}

impl RedisListingRepository {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            claim_ttl_ms: env_secs("PUBLISH_CLAIM_SECS", DEFAULT_CLAIM_SECS) * 1000,
        }
    }

    pub fn from_env() -> Option<Self> {
        let url = std::env::var("REDIS_URL").ok()?;
        redis::Client::open(url).ok().map(Self::new)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))
    }
}

fn draft_key(id: &str) -> String {
    format!("listing:{id}")
}

fn external_key(id: &str) -> String {
    format!("listing:{id}:external")
}

fn claim_key(id: &str) -> String {
    format!("listing:{id}:publishing")
}

async fn load(
    conn: &mut MultiplexedConnection,
    id: &str,
) -> Result<Option<ListingDraft>, StoreError> {
    let raw: Option<String> = conn
        .get(draft_key(id))
        .await
        .map_err(|err| StoreError::Request(err.to_string()))?;
    raw.map(|json| serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string())))
        .transpose()
}

async fn save(conn: &mut MultiplexedConnection, draft: &ListingDraft) -> Result<(), StoreError> {
    let json = serde_json::to_string(draft).map_err(|err| StoreError::Corrupt(err.to_string()))?;
    conn.set::<_, _, ()>(draft_key(&draft.id), json)
        .await
        .map_err(|err| StoreError::Request(err.to_string()))
}

#[async_trait]
impl ListingRepository for RedisListingRepository {
    async fn insert(&self, draft: ListingDraft) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        save(&mut conn, &draft).await
    }

    async fn get(&self, id: &str) -> Result<Option<ListingDraft>, StoreError> {
        let mut conn = self.connection().await?;
        load(&mut conn, id).await
    }

    async fn mark_pushed(&self, id: &str, external_id: &str) -> Result<MarkPushed, StoreError> {
        let mut conn = self.connection().await?;
        let mut draft = load(&mut conn, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let claimed: bool = conn
            .set_nx(external_key(id), external_id)
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        if !claimed {
            let existing: Option<String> = conn
                .get(external_key(id))
                .await
                .map_err(|err| StoreError::Request(err.to_string()))?;
            draft.status = ListingStatus::Pushed;
            draft.external_id = existing.or(draft.external_id);
            return Ok(MarkPushed::AlreadyPushed(draft));
        }

        draft.status = ListingStatus::Pushed;
        draft.external_id = Some(external_id.to_string());
        draft.updated_at = Utc::now();
        save(&mut conn, &draft).await?;
        Ok(MarkPushed::Updated(draft))
    }

    async fn claim_publish(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(claim_key(id))
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(self.claim_ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        Ok(reply.is_some())
    }

    async fn release_publish(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(claim_key(id))
            .await
            .map_err(|err| StoreError::Request(err.to_string()))
    }
}
