use sea_orm::ActiveEnum;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use trailfund_domain::model::{
    ExpeditionId, ExpeditionRecord, ExpeditionStatus, ExplorerId, NewExpedition,
};
use trailfund_domain::storage::{ExpeditionStore, StorageError, StorageResult};

use crate::entity::expeditions::{self, ExpeditionStatusDb};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl ExpeditionStore for SeaOrmStorage {
    async fn insert_expedition(
        &self,
        expedition: NewExpedition,
    ) -> StorageResult<ExpeditionRecord> {
        let model = expeditions::ActiveModel {
            creator_id: Set(expedition.creator.value()),
            title: Set(expedition.title),
            status: Set(status_to_db(expedition.status)),
            raised: Set(0),
            sponsors_count: Set(0),
            ..Default::default()
        };
        let inserted = model
            .insert(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(expedition_to_record(inserted))
    }

    async fn find_expedition(&self, id: ExpeditionId) -> StorageResult<Option<ExpeditionRecord>> {
        let maybe = expeditions::Entity::find_by_id(id.value())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(expedition_to_record))
    }

    async fn current_expedition(
        &self,
        creator: ExplorerId,
    ) -> StorageResult<Option<ExpeditionRecord>> {
        let maybe = expeditions::Entity::find()
            .filter(expeditions::Column::CreatorId.eq(creator.value()))
            .filter(expeditions::Column::DeletedAt.is_null())
            .filter(expeditions::Column::Status.is_in([
                ExpeditionStatusDb::Planned.to_value(),
                ExpeditionStatusDb::Active.to_value(),
            ]))
            .order_by_desc(expeditions::Column::CreatedAt)
            .order_by_desc(expeditions::Column::Id)
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(expedition_to_record))
    }
}

pub(crate) fn status_to_db(status: ExpeditionStatus) -> ExpeditionStatusDb {
    match status {
        ExpeditionStatus::Planned => ExpeditionStatusDb::Planned,
        ExpeditionStatus::Active => ExpeditionStatusDb::Active,
        ExpeditionStatus::Completed => ExpeditionStatusDb::Completed,
        ExpeditionStatus::Abandoned => ExpeditionStatusDb::Abandoned,
    }
}

pub(crate) fn expedition_to_record(model: expeditions::Model) -> ExpeditionRecord {
    ExpeditionRecord {
        id: ExpeditionId(model.id),
        creator: ExplorerId(model.creator_id),
        title: model.title,
        status: match model.status {
            ExpeditionStatusDb::Planned => ExpeditionStatus::Planned,
            ExpeditionStatusDb::Active => ExpeditionStatus::Active,
            ExpeditionStatusDb::Completed => ExpeditionStatus::Completed,
            ExpeditionStatusDb::Abandoned => ExpeditionStatus::Abandoned,
        },
        raised: model.raised,
        sponsors_count: model.sponsors_count,
        deleted_at: model.deleted_at,
        created_at: model.created_at,
    }
}
