use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use trailfund_domain::model::{ExplorerId, ExplorerRecord, NewExplorer};
use trailfund_domain::storage::{ExplorerStore, StorageError, StorageResult};

use crate::entity::explorers;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl ExplorerStore for SeaOrmStorage {
    async fn insert_explorer(&self, explorer: NewExplorer) -> StorageResult<ExplorerRecord> {
        let model = explorers::ActiveModel {
            handle: Set(explorer.handle),
            email: Set(explorer.email),
            email_verified: Set(explorer.email_verified),
            connected_account_id: Set(explorer.connected_account_id),
            ..Default::default()
        };
        let inserted = model
            .insert(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(explorer_to_record(inserted))
    }

    async fn find_explorer(&self, id: ExplorerId) -> StorageResult<Option<ExplorerRecord>> {
        let maybe = explorers::Entity::find_by_id(id.value())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(explorer_to_record))
    }

    async fn find_explorer_by_handle(
        &self,
        handle: &str,
    ) -> StorageResult<Option<ExplorerRecord>> {
        let maybe = explorers::Entity::find()
            .filter(explorers::Column::Handle.eq(handle))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(explorer_to_record))
    }
}

fn explorer_to_record(model: explorers::Model) -> ExplorerRecord {
    ExplorerRecord {
        id: ExplorerId(model.id),
        handle: model.handle,
        email: model.email,
        email_verified: model.email_verified,
        connected_account_id: model.connected_account_id,
        created_at: model.created_at,
    }
}
