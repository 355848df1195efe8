//! Episodic Memory manager (§3, §4.5). Indexed field `details_embedding`,
//! lexical field `content`, append-only (no per-user serialisation needed).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::memory::{EpisodicItem, EpisodicRepo, MemoryHeader, Scored, SearchMethod, SearchParams};
use mnemo_core::provider::Embedder;
use mnemo_core::util::{content_hash, pad_to, truncate_to};
use mnemo_entities::episodic_memory::{ActiveModel, Column, Entity, Model};

use crate::convert::{embedding_to_json, json_to_embedding};
use crate::dimension::DimensionRegistry;
use crate::hybrid::{default_weights, merge_weighted};
use crate::lexical::LexicalIndex;
use crate::scoring::cosine_similarity;

pub const CLASS: &str = "episodic";
pub const LEXICAL_FIELD: &str = "content";
pub const DEFAULT_DECAY_FLOOR: f64 = 0.01;

pub struct EpisodicManager {
    db: DatabaseConnection,
    embedder: Arc<dyn Embedder>,
    lexical: Arc<LexicalIndex>,
    dimensions: Arc<DimensionRegistry>,
    pad_width: usize,
}

impl EpisodicManager {
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        embedder: Arc<dyn Embedder>,
        lexical: Arc<LexicalIndex>,
        dimensions: Arc<DimensionRegistry>,
        pad_width: usize,
    ) -> Self {
        Self {
            db,
            embedder,
            lexical,
            dimensions,
            pad_width,
        }
    }

    async fn rows_for_user(&self, user_id: &str) -> EngineResult<Vec<Model>> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::IsDeleted.eq(false))
            .all(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))
    }
}

fn row_to_domain(model: Model) -> EpisodicItem {
    EpisodicItem {
        header: MemoryHeader {
            id: model.id,
            user_id: model.user_id,
            organization_id: model.organization_id,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
            is_deleted: model.is_deleted,
            metadata: model.metadata,
            content_hash: model.content_hash,
            reinforcement_count: model.reinforcement_count,
            user_dimension: model.user_dimension,
        },
        content: model.content,
        timestamp: model.timestamp.into(),
        importance: model.importance,
        details_embedding: model.details_embedding.as_ref().and_then(json_to_embedding),
    }
}

#[async_trait]
impl EpisodicRepo for EpisodicManager {
    async fn create(&self, item: EpisodicItem) -> EngineResult<EpisodicItem> {
        let raw = self.embedder.embed(&item.content).await?;
        self.dimensions
            .check_and_record(&item.header.user_id, i32::try_from(raw.len()).unwrap_or(i32::MAX))?;
        let padded = pad_to(raw, self.pad_width);

        let id = Uuid::now_v7();
        let now = Utc::now();
        let row = ActiveModel {
            id: Set(id),
            user_id: Set(item.header.user_id.clone()),
            organization_id: Set(item.header.organization_id.clone()),
            content: Set(item.content.clone()),
            timestamp: Set(item.timestamp.into()),
            importance: Set(item.importance),
            details_embedding: Set(Some(embedding_to_json(&padded))),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            is_deleted: Set(false),
            metadata: Set(item.header.metadata.clone()),
            content_hash: Set(content_hash(CLASS, &item.content)),
            reinforcement_count: Set(0),
            user_dimension: Set(Some(i32::try_from(self.embedder.dimension()).unwrap_or(i32::MAX))),
        };
        let saved = row
            .insert(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        self.lexical
            .upsert(&item.header.user_id, CLASS, id, LEXICAL_FIELD, &item.content)?;
        self.lexical.commit()?;
        Ok(row_to_domain(saved))
    }

    async fn soft_delete(&self, user_id: &str, id: Uuid) -> EngineResult<()> {
        let row = Entity::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(format!("episodic item {id} not found for user")))?;
        let mut active: ActiveModel = row.into();
        active.is_deleted = Set(true);
        active.updated_at = Set(Utc::now().into());
        active
            .update(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        self.lexical.remove(CLASS, id, &[LEXICAL_FIELD])?;
        self.lexical.commit()?;
        Ok(())
    }

    async fn list(&self, user_id: &str, limit: usize, offset: usize) -> EngineResult<Vec<EpisodicItem>> {
        let mut rows = self.rows_for_user(user_id).await?;
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(row_to_domain)
            .collect())
    }

    async fn search(&self, user_id: &str, params: &SearchParams) -> EngineResult<Vec<Scored<EpisodicItem>>> {
        let rows = self.rows_for_user(user_id).await?;
        search_episodic(self, user_id, params, rows).await
    }

    async fn decay_importance(&self, user_id: &str, factor: f64, floor: f64) -> EngineResult<usize> {
        let rows = self.rows_for_user(user_id).await?;
        let mut affected = 0usize;
        for row in rows {
            let new_importance = (row.importance * factor).max(floor);
            let mut active: ActiveModel = row.into();
            active.importance = Set(new_importance);
            active
                .update(&self.db)
                .await
                .map_err(|e| EngineError::Transient(e.to_string()))?;
            affected += 1;
        }
        Ok(affected)
    }
}

async fn search_episodic(
    mgr: &EpisodicManager,
    user_id: &str,
    params: &SearchParams,
    rows: Vec<Model>,
) -> EngineResult<Vec<Scored<EpisodicItem>>> {
    let by_id: std::collections::HashMap<Uuid, Model> = rows.iter().map(|r| (r.id, r.clone())).collect();

    let vector_hits = if matches!(params.method, SearchMethod::Embedding | SearchMethod::Hybrid) {
        vector_scores(mgr, user_id, &params.query, &rows).await?
    } else {
        Vec::new()
    };

    let bm25_hits = if matches!(params.method, SearchMethod::Bm25 | SearchMethod::Hybrid) {
        mgr.lexical
            .search(user_id, CLASS, LEXICAL_FIELD, &params.query, params.limit * 2)?
    } else {
        Vec::new()
    };

    let mut scored: Vec<Scored<EpisodicItem>> = match params.method {
        SearchMethod::Embedding => vector_hits
            .into_iter()
            .filter(|(_, sim)| *sim >= params.threshold)
            .filter_map(|(id, sim)| by_id.get(&id).cloned().map(|m| Scored { item: row_to_domain(m), score: sim }))
            .collect(),
        SearchMethod::Bm25 => bm25_hits
            .into_iter()
            .filter_map(|(id, score)| by_id.get(&id).cloned().map(|m| Scored { item: row_to_domain(m), score }))
            .collect(),
        SearchMethod::Hybrid => {
            let (w_vec, w_bm25) = default_weights();
            let merged = merge_weighted(&vector_hits, &bm25_hits, w_vec, w_bm25);
            merged
                .into_iter()
                .filter_map(|(id, score)| by_id.get(&id).cloned().map(|m| Scored { item: row_to_domain(m), score }))
                .collect()
        }
    };

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(params.limit);
    Ok(scored)
}

async fn vector_scores(
    mgr: &EpisodicManager,
    user_id: &str,
    query: &str,
    rows: &[Model],
) -> EngineResult<Vec<(Uuid, f64)>> {
    let raw = mgr.embedder.embed(query).await?;
    mgr.dimensions
        .check_and_record(user_id, i32::try_from(raw.len()).unwrap_or(i32::MAX))?;
    let query_vec = pad_to(raw, mgr.pad_width);

    let mut hits = Vec::new();
    for row in rows {
        let Some(ref emb_json) = row.details_embedding else { continue };
        let Some(stored) = json_to_embedding(emb_json) else { continue };
        #[allow(clippy::cast_sign_loss)]
        let d_model = row.user_dimension.unwrap_or(i32::try_from(mgr.embedder.dimension()).unwrap_or(0)) as usize;
        let truncated_query = truncate_to(query_vec.clone(), d_model);
        let truncated_stored = truncate_to(stored, d_model);
        let sim = cosine_similarity(&truncated_query, &truncated_stored);
        hits.push((row.id, sim));
    }
    hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_floor_matches_spec_default() {
        assert!((DEFAULT_DECAY_FLOOR - 0.01).abs() < 1e-9);
    }
}
