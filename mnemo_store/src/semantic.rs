//! Semantic Memory manager (§3, §4.5). Indexed field `details_embedding`,
//! lexical field `details`. `upsert` merges concurrent writes for the same
//! `(user_id, concept)` by unioning `relations` (§9 open question, decided:
//! union over overwrite, since overwriting silently drops a concurrent
//! writer's edges and union is the safer default for a fact graph).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use mnemo_core::error::{EngineError, EngineResult};
use mnemo_core::memory::{MemoryHeader, Scored, SearchMethod, SearchParams, SemanticItem, SemanticRepo};
use mnemo_core::provider::Embedder;
use mnemo_core::util::{content_hash, pad_to, truncate_to};
use mnemo_entities::semantic_memory::{ActiveModel, Column, Entity, Model};

use crate::convert::{embedding_to_json, json_to_embedding, json_to_strings, strings_to_json};
use crate::dimension::DimensionRegistry;
use crate::hybrid::{default_weights, merge_weighted};
use crate::lexical::LexicalIndex;
use crate::scoring::cosine_similarity;

pub const CLASS: &str = "semantic";
pub const LEXICAL_FIELD: &str = "details";

pub struct SemanticManager {
    db: DatabaseConnection,
    embedder: Arc<dyn Embedder>,
    lexical: Arc<LexicalIndex>,
    dimensions: Arc<DimensionRegistry>,
    pad_width: usize,
}

impl SemanticManager {
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

    async fn find_existing(&self, user_id: &str, item: &SemanticItem, merge_threshold: f64) -> EngineResult<Option<Model>> {
        let rows = self.rows_for_user(user_id).await?;
        if let Some(exact) = rows.iter().find(|r| r.concept == item.concept) {
            return Ok(Some(exact.clone()));
        }
        let Some(ref query_embedding) = item.details_embedding else {
            return Ok(None);
        };
        let mut best: Option<(f64, &Model)> = None;
        for row in &rows {
            let Some(ref stored_json) = row.details_embedding else { continue };
            let Some(stored) = json_to_embedding(stored_json) else { continue };
            let sim = cosine_similarity(query_embedding, &stored);
            if sim >= merge_threshold && best.is_none_or(|(b, _)| sim > b) {
                best = Some((sim, row));
            }
        }
        Ok(best.map(|(_, r)| r.clone()))
    }

    async fn insert_new(&self, item: SemanticItem) -> EngineResult<SemanticItem> {
        let raw = self.embedder.embed(&item.details).await?;
        self.dimensions
            .check_and_record(&item.header.user_id, i32::try_from(raw.len()).unwrap_or(i32::MAX))?;
        let padded = pad_to(raw, self.pad_width);

        let id = Uuid::now_v7();
        let now = Utc::now();
        let row = ActiveModel {
            id: Set(id),
            user_id: Set(item.header.user_id.clone()),
            organization_id: Set(item.header.organization_id.clone()),
            concept: Set(item.concept.clone()),
            details: Set(item.details.clone()),
            category: Set(item.category.clone()),
            relations: Set(strings_to_json(&item.relations)),
            details_embedding: Set(Some(embedding_to_json(&padded))),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            is_deleted: Set(false),
            metadata: Set(item.header.metadata.clone()),
            content_hash: Set(content_hash(CLASS, &item.details)),
            reinforcement_count: Set(0),
            user_dimension: Set(Some(i32::try_from(self.embedder.dimension()).unwrap_or(i32::MAX))),
        };
        let saved = row
            .insert(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        self.lexical
            .upsert(&item.header.user_id, CLASS, id, LEXICAL_FIELD, &item.details)?;
        self.lexical.commit()?;
        Ok(row_to_domain(saved))
    }
}

fn row_to_domain(model: Model) -> SemanticItem {
    SemanticItem {
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
        concept: model.concept,
        details: model.details,
        category: model.category,
        relations: json_to_strings(&model.relations),
        details_embedding: model.details_embedding.as_ref().and_then(json_to_embedding),
    }
}

#[async_trait]
impl SemanticRepo for SemanticManager {
    async fn create(&self, item: SemanticItem) -> EngineResult<SemanticItem> {
        self.insert_new(item).await
    }

    async fn upsert(&self, item: SemanticItem, merge_threshold: f64) -> EngineResult<SemanticItem> {
        let Some(existing) = self.find_existing(&item.header.user_id, &item, merge_threshold).await? else {
            return self.insert_new(item).await;
        };

        let mut union: HashSet<String> = json_to_strings(&existing.relations).into_iter().collect();
        union.extend(item.relations.iter().cloned());
        let merged_relations: Vec<String> = union.into_iter().collect();

        let raw = self.embedder.embed(&item.details).await?;
        let padded = pad_to(raw, self.pad_width);

        let id = existing.id;
        let next_reinforcement = existing.reinforcement_count + 1;
        let mut active: ActiveModel = existing.into();
        active.details = Set(item.details.clone());
        active.category = Set(item.category.clone());
        active.relations = Set(strings_to_json(&merged_relations));
        active.details_embedding = Set(Some(embedding_to_json(&padded)));
        active.updated_at = Set(Utc::now().into());
        active.content_hash = Set(content_hash(CLASS, &item.details));
        active.reinforcement_count = Set(next_reinforcement);
        let saved = active
            .update(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?;
        self.lexical
            .upsert(&item.header.user_id, CLASS, id, LEXICAL_FIELD, &item.details)?;
        self.lexical.commit()?;
        Ok(row_to_domain(saved))
    }

    async fn soft_delete(&self, user_id: &str, id: Uuid) -> EngineResult<()> {
        let row = Entity::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .one(&self.db)
            .await
            .map_err(|e| EngineError::Transient(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(format!("semantic item {id} not found for user")))?;
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

    async fn list(&self, user_id: &str, limit: usize, offset: usize) -> EngineResult<Vec<SemanticItem>> {
        let mut rows = self.rows_for_user(user_id).await?;
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(row_to_domain)
            .collect())
    }

    async fn search(&self, user_id: &str, params: &SearchParams) -> EngineResult<Vec<Scored<SemanticItem>>> {
        let rows = self.rows_for_user(user_id).await?;
        let by_id: std::collections::HashMap<Uuid, Model> = rows.iter().map(|r| (r.id, r.clone())).collect();

        let vector_hits = if matches!(params.method, SearchMethod::Embedding | SearchMethod::Hybrid) {
            let raw = self.embedder.embed(&params.query).await?;
            let query_vec = pad_to(raw, self.pad_width);
            let mut hits = Vec::new();
            for row in &rows {
                let Some(ref emb_json) = row.details_embedding else { continue };
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

        let mut scored: Vec<Scored<SemanticItem>> = match params.method {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_dedups_relation_strings() {
        let mut set: HashSet<String> = vec!["a".to_string(), "b".to_string()].into_iter().collect();
        set.extend(vec!["b".to_string(), "c".to_string()]);
        let mut v: Vec<String> = set.into_iter().collect();
        v.sort();
        assert_eq!(v, vec!["a", "b", "c"]);
    }
}
