//! BM25 lexical search (§4.1 `Store::lexical_search`, §4.5 `method = "bm25"`).
//!
//! One `tantivy` index per memory class, held in memory and rebuilt from the
//! Store's own writes (`index`/`remove`) rather than from a separate
//! durability story -- the relational tables remain the source of truth;
//! this index is a derived, rebuildable artifact. Tokenizer is `tantivy`'s
//! default English analyzer (lowercase + stemmed) per the §9 open-question
//! decision for "simple analyzer + English stopwords".

use std::sync::RwLock;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, STORED, STRING, Schema, TEXT, TextFieldIndexing, TextOptions, Value};
use tantivy::{Index, IndexWriter, Term, doc};
use uuid::Uuid;

use mnemo_core::error::{EngineError, EngineResult};

const HEAP_SIZE: usize = 15_000_000;

struct Fields {
    id: tantivy::schema::Field,
    user_id: tantivy::schema::Field,
    class: tantivy::schema::Field,
    field_name: tantivy::schema::Field,
    body: tantivy::schema::Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let id = builder.add_text_field("id", STRING | STORED);
    let user_id = builder.add_text_field("user_id", STRING | STORED);
    let class = builder.add_text_field("class", STRING | STORED);
    let field_name = builder.add_text_field("field_name", STRING | STORED);
    let text_indexing = TextFieldIndexing::default()
        .set_tokenizer("en_stem")
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text_options = TextOptions::default()
        .set_indexing_options(text_indexing)
        .set_stored();
    let body = builder.add_text_field("body", text_options);
    (
        builder.build(),
        Fields {
            id,
            user_id,
            class,
            field_name,
            body,
        },
    )
}

/// One process-wide tantivy `Index` spanning every memory class, documents
/// keyed by `(class, id, field_name)` so a class with multiple lexical fields
/// (Core's `human`/`persona`) can index each independently and two classes
/// never collide on the same field name (§4.5 field-mapping table).
pub struct LexicalIndex {
    index: Index,
    fields: Fields,
    writer: RwLock<IndexWriter>,
}

impl LexicalIndex {
    /// # Errors
    /// Returns `Fatal` if the in-memory tantivy index cannot be constructed.
    pub fn new() -> EngineResult<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        let tokenizer_manager = index.tokenizers().clone();
        tokenizer_manager.register(
            "en_stem",
            tantivy::tokenizer::TextAnalyzer::builder(tantivy::tokenizer::SimpleTokenizer::default())
                .filter(tantivy::tokenizer::RemoveLongFilter::limit(64))
                .filter(tantivy::tokenizer::LowerCaser)
                .filter(tantivy::tokenizer::StopWordFilter::new(tantivy::tokenizer::Language::English).ok_or_else(|| {
                    EngineError::Fatal("failed to build English stopword filter".to_string())
                })?)
                .filter(tantivy::tokenizer::Stemmer::new(tantivy::tokenizer::Language::English))
                .build(),
        );
        let writer = index
            .writer(HEAP_SIZE)
            .map_err(|e| EngineError::Fatal(format!("tantivy writer init: {e}")))?;
        Ok(Self {
            index,
            fields,
            writer: RwLock::new(writer),
        })
    }

    /// Indexes (or re-indexes) one document's text under `field_name`, scoped
    /// to `user_id` and `class`. Call `commit` after a batch of writes.
    ///
    /// # Errors
    /// Returns `Fatal` if the tantivy writer cannot be locked or the document
    /// cannot be deleted/added.
    pub fn upsert(
        &self,
        user_id: &str,
        class: &str,
        id: Uuid,
        field_name: &str,
        text: &str,
    ) -> EngineResult<()> {
        let writer = self
            .writer
            .write()
            .map_err(|_| EngineError::Fatal("lexical index writer poisoned".to_string()))?;
        let doc_key = format!("{class}:{id}:{field_name}");
        writer.delete_term(Term::from_field_text(self.fields.id, &doc_key));
        writer.add_document(doc!(
            self.fields.id => doc_key,
            self.fields.user_id => user_id,
            self.fields.class => class,
            self.fields.field_name => field_name,
            self.fields.body => text,
        )).map_err(|e| EngineError::Fatal(format!("tantivy add_document: {e}")))?;
        Ok(())
    }

    /// Marks every field indexed for `id` under `class` as removed
    /// (soft-delete or hard delete of the owning memory item). Field names
    /// aren't known by the caller at delete time, so this deletes by prefix
    /// via a loop over the class's known field names instead of a single term.
    ///
    /// # Errors
    /// Returns `Fatal` if the writer cannot be locked.
    pub fn remove(&self, class: &str, id: Uuid, field_names: &[&str]) -> EngineResult<()> {
        let writer = self
            .writer
            .write()
            .map_err(|_| EngineError::Fatal("lexical index writer poisoned".to_string()))?;
        for field_name in field_names {
            let doc_key = format!("{class}:{id}:{field_name}");
            writer.delete_term(Term::from_field_text(self.fields.id, &doc_key));
        }
        Ok(())
    }

    /// # Errors
    /// Returns `Fatal` if the commit or reader reload fails.
    pub fn commit(&self) -> EngineResult<()> {
        let mut writer = self
            .writer
            .write()
            .map_err(|_| EngineError::Fatal("lexical index writer poisoned".to_string()))?;
        writer
            .commit()
            .map_err(|e| EngineError::Fatal(format!("tantivy commit: {e}")))?;
        self.index
            .reader()
            .map_err(|e| EngineError::Fatal(format!("tantivy reader: {e}")))?
            .reload()
            .map_err(|e| EngineError::Fatal(format!("tantivy reload: {e}")))?;
        Ok(())
    }

    /// BM25 search restricted to `user_id`, `class`, and `field_name`,
    /// returning `(item id, bm25 score)` pairs ordered by score descending.
    ///
    /// # Errors
    /// Returns `Fatal` on any tantivy query/search failure.
    pub fn search(
        &self,
        user_id: &str,
        class: &str,
        field_name: &str,
        query_text: &str,
        limit: usize,
    ) -> EngineResult<Vec<(Uuid, f64)>> {
        if query_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let reader = self
            .index
            .reader()
            .map_err(|e| EngineError::Fatal(format!("tantivy reader: {e}")))?;
        let searcher = reader.searcher();

        let parser = QueryParser::for_index(&self.index, vec![self.fields.body]);
        let text_query = parser
            .parse_query(&escape_query(query_text))
            .map_err(|e| EngineError::Fatal(format!("tantivy query parse: {e}")))?;

        let user_filter: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.fields.user_id, user_id),
            IndexRecordOption::Basic,
        ));
        let class_filter: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.fields.class, class),
            IndexRecordOption::Basic,
        ));
        let field_filter: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.fields.field_name, field_name),
            IndexRecordOption::Basic,
        ));
        let combined = BooleanQuery::new(vec![
            (Occur::Must, user_filter),
            (Occur::Must, class_filter),
            (Occur::Must, field_filter),
            (Occur::Must, text_query),
        ]);

        let hits = searcher
            .search(&combined, &TopDocs::with_limit(limit))
            .map_err(|e| EngineError::Fatal(format!("tantivy search: {e}")))?;

        let mut out = Vec::with_capacity(hits.len());
        for (score, addr) in hits {
            let retrieved = searcher
                .doc::<tantivy::TantivyDocument>(addr)
                .map_err(|e| EngineError::Fatal(format!("tantivy doc fetch: {e}")))?;
            let Some(id_value) = retrieved.get_first(self.fields.id) else {
                continue;
            };
            let Some(doc_key) = id_value.as_str() else {
                continue;
            };
            let mut parts = doc_key.splitn(3, ':');
            let (Some(_class), Some(id_str)) = (parts.next(), parts.next()) else {
                continue;
            };
            if let Ok(id) = Uuid::parse_str(id_str) {
                out.push((id, f64::from(score)));
            }
        }
        Ok(out)
    }
}

/// tantivy's query parser treats `+-&|!(){}[]^"~*?:\/` as syntax; escape
/// them so free-text user queries never error out as malformed syntax.
fn escape_query(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    for c in q.chars() {
        if "+-&|!(){}[]^\"~*?:\\/".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_indexed_document_by_keyword() {
        let idx = LexicalIndex::new().unwrap();
        let id = Uuid::now_v7();
        idx.upsert("alice", "episodic", id, "content", "I really like coffee in the morning")
            .unwrap();
        idx.commit().unwrap();
        let hits = idx.search("alice", "episodic", "content", "coffee", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, id);
    }

    #[test]
    fn respects_user_scope() {
        let idx = LexicalIndex::new().unwrap();
        let alice_id = Uuid::now_v7();
        let bob_id = Uuid::now_v7();
        idx.upsert("alice", "episodic", alice_id, "content", "I like coffee").unwrap();
        idx.upsert("bob", "episodic", bob_id, "content", "I like coffee").unwrap();
        idx.commit().unwrap();
        let hits = idx.search("bob", "episodic", "content", "coffee", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, bob_id);
    }

    #[test]
    fn respects_class_scope() {
        let idx = LexicalIndex::new().unwrap();
        let episodic_id = Uuid::now_v7();
        let resource_id = Uuid::now_v7();
        idx.upsert("alice", "episodic", episodic_id, "content", "quarterly report notes").unwrap();
        idx.upsert("alice", "resource", resource_id, "content", "quarterly report notes").unwrap();
        idx.commit().unwrap();
        let hits = idx.search("alice", "resource", "content", "quarterly", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, resource_id);
    }

    #[test]
    fn removed_document_disappears() {
        let idx = LexicalIndex::new().unwrap();
        let id = Uuid::now_v7();
        idx.upsert("alice", "episodic", id, "content", "unique marmot fact").unwrap();
        idx.commit().unwrap();
        assert_eq!(idx.search("alice", "episodic", "content", "marmot", 5).unwrap().len(), 1);
        idx.remove("episodic", id, &["content"]).unwrap();
        idx.commit().unwrap();
        assert_eq!(idx.search("alice", "episodic", "content", "marmot", 5).unwrap().len(), 0);
    }
}
