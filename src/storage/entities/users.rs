use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub display_name: String,
    pub provider: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::chat_sessions::Entity")]
    ChatSessions,
    #[sea_orm(has_many = "super::memory_facts::Entity")]
    MemoryFacts,
}

impl Related<super::chat_sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ChatSessions.def()
    }
}

impl Related<super::memory_facts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MemoryFacts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
