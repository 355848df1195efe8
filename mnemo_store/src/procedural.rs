//! Procedural Memory manager (§3, §4.5). Indexed field `summary_embedding`,
//! lexical field `summary`, return body `summary`+`steps`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::memory::{MemoryHeader, ProceduralItem, ProceduralRepo, Scored, SearchMethod, SearchParams};
use mnemo_core::provider::Embedder;
use mnemo_core::util::{content_hash, pad_to, truncate_to};
use mnemo_entities::procedural_memory::{ActiveModel, Column, Entity, Model};

use crate::convert::{embedding_to_json, json_to_embedding, json_to_strings, strings_to_json};
use crate::dimension::DimensionRegistry;
use crate::hybrid::{default_weights, merge_weighted};
use crate::lexical::LexicalIndex;
use crate::scoring::cosine_similarity;

pub const CLASS: &str = "procedural";
pub const LEXICAL_FIELD: &str = "summary";

pub struct ProceduralManager {
    db: DatabaseConnection,
    embedder: Arc<dyn Embedder>,
    lexical: Arc<LexicalIndex>,
    dimensions: Arc<DimensionRegistry>,
    pad_width: usize,
}

impl ProceduralManager {
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

fn row_to_domain(model: Model) -> ProceduralItem {
    ProceduralItem {
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
        summary: model.summary,
        steps: json_to_strings(&model.steps),
        summary_embedding: model.summary_embedding.as_ref().and_then(json_to_embedding),
    }
}

#[async_trait]
impl ProceduralRepo for ProceduralManager {
    async fn create(&self, item: ProceduralItem) -> EngineResult<ProceduralItem> {
        let raw = self.embedder.embed(&item.summary).await?;
        self.dimensions
            .check_and_record(&item.header.user_id, i32::try_from(raw.len()).unwrap_or(i32::MAX))?;
        let padded = pad_to(raw, self.pad_width);

        let id = Uuid::now_v7();
        let now = Utc::now();
        let row = ActiveModel {
            id: Set(id),
            user_id: Set(item.header.user_id.clone()),
            organization_id: Set(item.header.organization_id.clone()),
            summary: Set(item.summary.clone()),
            steps: Set(strings_to_json(&item.steps)),
            summary_embedding: Set(Some(embedding_to_json(&padded))),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            is_deleted: Set(false),
            metadata: Set(item.header.metadata.clone()),
            content_hash: Set(content_hash(CLASS, &item.summary)),
            reinforcement_count: Set(0),
            user_dimension: Set(Some(i32::try_from(self.embedder.dimension()).unwrap_or(i32::MAX))),
        };
        let saved = row
            .insert(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        self.lexical
            .upsert(&item.header.user_id, CLASS, id, LEXICAL_FIELD, &item.summary)?;
        self.lexical.commit()?;
        Ok(row_to_domain(saved))
    }

    async fn soft_delete(&self, user_id: &str, id: Uuid) -> EngineResult<()> {
        let row = Entity::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(format!("procedural item {id} not found for user")))?;
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

    async fn list(&self, user_id: &str, limit: usize, offset: usize) -> EngineResult<Vec<ProceduralItem>> {
        let mut rows = self.rows_for_user(user_id).await?;
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(row_to_domain)
            .collect())
    }

    async fn search(&self, user_id: &str, params: &SearchParams) -> EngineResult<Vec<Scored<ProceduralItem>>> {
        let rows = self.rows_for_user(user_id).await?;
        let by_id: std::collections::HashMap<Uuid, Model> = rows.iter().map(|r| (r.id, r.clone())).collect();

        let vector_hits = if matches!(params.method, SearchMethod::Embedding | SearchMethod::Hybrid) {
            let raw = self.embedder.embed(&params.query).await?;
            let query_vec = pad_to(raw, self.pad_width);
            let mut hits = Vec::new();
            for row in &rows {
                let Some(ref emb_json) = row.summary_embedding else { continue };
                let Some(stored) = json_to_embedding(emb_json) else { continue };
                #[allow(clippy::cast_sign_loss)]
                let d_model = row.user_dimension.unwrap_or(i32::try_from(self.embedder.dimension()).unwrap_or(0)) as usize;
                let sim = cosine_similarity(&truncate_to(query_vec.clone(), d_model), &truncate_to(stored, d_model));
                hits.push((row.id, sim));
            }
            hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            hits
        } else {
            Vec::new()
        };

        let bm25_hits = if matches!(params.method, SearchMethod::Bm25 | SearchMethod::Hybrid) {
            self.lexical.search(user_id, CLASS, LEXICAL_FIELD, &params.query, params.limit * 2)?
        } else {
            Vec::new()
        };

        let mut scored: Vec<Scored<ProceduralItem>> = match params.method {
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
                merge_weighted(&vector_hits, &bm25_hits, w_vec, w_bm25)
                    .into_iter()
                    .filter_map(|(id, score)| by_id.get(&id).cloned().map(|m| Scored { item: row_to_domain(m), score }))
                    .collect()
            }
        };
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(params.limit);
        Ok(scored)
    }
}
