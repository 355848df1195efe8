//! Schema bootstrap. This workspace ships `mnemo_entities` as a hand-written
//! stand-in for `sea-orm-cli generate entity` output (§3.1) rather than
//! pairing it with a migration crate, so table creation at process start
//! mirrors the reference session manager's `Schema::create_table_from_entity`
//! dance, generalized from one entity to every table in §6's persisted-state
//! layout.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Schema};

fn is_already_exists(err: &DbErr) -> bool {
    let msg = err.to_string();
    msg.contains("already exists")
}

async fn create_if_missing<E>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr>
where
    E: sea_orm::EntityTrait,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let stmt = schema.create_table_from_entity(entity);
    match db.execute_unprepared(&backend.build(&stmt).to_string()).await {
        Ok(_) => Ok(()),
        Err(e) if is_already_exists(&e) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Creates every table this engine persists to, if it doesn't already exist.
/// Idempotent: safe to call on every process start, matching the reference
/// session manager's "create or skip" behavior rather than requiring an
/// administrator to run a separate migration step first.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_if_missing(db, mnemo_entities::organizations::Entity).await?;
    create_if_missing(db, mnemo_entities::users::Entity).await?;
    create_if_missing(db, mnemo_entities::agents::Entity).await?;
    create_if_missing(db, mnemo_entities::messages::Entity).await?;
    create_if_missing(db, mnemo_entities::user_settings::Entity).await?;
    create_if_missing(db, mnemo_entities::core_memory::Entity).await?;
    create_if_missing(db, mnemo_entities::episodic_memory::Entity).await?;
    create_if_missing(db, mnemo_entities::semantic_memory::Entity).await?;
    create_if_missing(db, mnemo_entities::procedural_memory::Entity).await?;
    create_if_missing(db, mnemo_entities::resource_memory::Entity).await?;
    create_if_missing(db, mnemo_entities::knowledge_vault::Entity).await?;
    Ok(())
}
