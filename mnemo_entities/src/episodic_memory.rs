use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "episodic_memory")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub user_id: String,
    pub organization_id: String,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub timestamp: DateTimeWithTimeZone,
    pub importance: f64,
    pub details_embedding: Option<Json>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub is_deleted: bool,
    pub metadata: Json,
    #[sea_orm(indexed)]
    pub content_hash: String,
    pub reinforcement_count: i32,
    pub user_dimension: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
