use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub agent_id: Uuid,
    pub user_id: String,
    pub role: String,
    #[sea_orm(column_type = "Text")]
    pub text: String,
    pub content: Json,
    pub model: Option<String>,
    pub tool_call_id: Option<String>,
    pub step_id: Uuid,
    pub group_id: Option<Uuid>,
    pub sender_id: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    #[sea_orm(default_value = false)]
    pub is_deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::agents::Entity",
        from = "Column::AgentId",
        to = "super::agents::Column::Id"
    )]
    Agent,
}

impl Related<super::agents::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Agent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
