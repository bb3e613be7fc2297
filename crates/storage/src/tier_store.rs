use sea_orm::sea_query::{PostgresQueryBuilder, Query, SqliteQueryBuilder};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, Set, Statement,
};
use trailfund_domain::model::{
    ExplorerId, NewTier, TierBilling, TierId, TierPatch, TierRecord, TierSlot, TierSync,
};
use trailfund_domain::storage::{StorageError, StorageResult, TierStore};

use crate::entity::sponsorship_tiers::{self, TierBillingDb};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl TierStore for SeaOrmStorage {
    async fn insert_tier(&self, tier: NewTier) -> StorageResult<TierRecord> {
        let model = sponsorship_tiers::ActiveModel {
            creator_id: Set(tier.creator.value()),
            billing: Set(billing_to_db(tier.billing)),
            slot_priority: Set(tier.slot.priority()),
            price_minor: Set(tier.price_minor),
            currency: Set(tier.currency),
            description: Set(tier.description),
            is_available: Set(tier.is_available),
            ..Default::default()
        };
        let inserted = model
            .insert(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        tier_to_record(inserted)
    }

    async fn find_tier(&self, id: TierId) -> StorageResult<Option<TierRecord>> {
        let maybe = sponsorship_tiers::Entity::find_by_id(id.value())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(tier_to_record).transpose()
    }

    async fn list_tiers(&self, creator: ExplorerId) -> StorageResult<Vec<TierRecord>> {
        let models = sponsorship_tiers::Entity::find()
            .filter(sponsorship_tiers::Column::CreatorId.eq(creator.value()))
            .filter(sponsorship_tiers::Column::DeletedAt.is_null())
            .order_by_asc(sponsorship_tiers::Column::SlotPriority)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        models.into_iter().map(tier_to_record).collect()
    }

    async fn apply_tier_patch(
        &self,
        id: TierId,
        patch: TierPatch,
        sync: TierSync,
    ) -> StorageResult<Option<TierRecord>> {
        let backend = self.connection().get_database_backend();

        let mut query = Query::update();
        query.table(sponsorship_tiers::Entity);
        let mut touched = false;
        if let Some(price) = patch.price_minor {
            query.value(sponsorship_tiers::Column::PriceMinor, price);
            touched = true;
        }
        if let Some(available) = patch.is_available {
            query.value(sponsorship_tiers::Column::IsAvailable, available);
            touched = true;
        }
        if let Some(description) = patch.description {
            query.value(sponsorship_tiers::Column::Description, description);
            touched = true;
        }
        if let Some(priority) = patch.priority {
            query.value(sponsorship_tiers::Column::SlotPriority, priority);
            touched = true;
        }
        if let Some(product) = sync.product_id {
            query.value(sponsorship_tiers::Column::ProductId, product);
            touched = true;
        }
        if let Some(monthly) = sync.monthly_price_id {
            query.value(sponsorship_tiers::Column::MonthlyPriceId, monthly);
            touched = true;
        }
        if let Some(yearly) = sync.yearly_price_id {
            query.value(sponsorship_tiers::Column::YearlyPriceId, yearly);
            touched = true;
        }
        if !touched {
            // Empty patch: report the current row without issuing an UPDATE.
            return self
                .find_tier(id)
                .await
                .map(|maybe| maybe.filter(|tier| tier.deleted_at.is_none()));
        }
        query.and_where(sponsorship_tiers::Column::Id.eq(id.value()));
        query.and_where(sponsorship_tiers::Column::DeletedAt.is_null());
        query.returning_all();

        let (sql, values) = match backend {
            DatabaseBackend::Sqlite => query.build(SqliteQueryBuilder),
            DatabaseBackend::Postgres => query.build(PostgresQueryBuilder),
            DatabaseBackend::MySql => unreachable!("mysql backend is not supported"),
        };
        let stmt = Statement::from_sql_and_values(backend, sql, values);
        let maybe_row = self
            .connection()
            .query_one(stmt)
            .await
            .map_err(StorageError::from_source)?;

        match maybe_row {
            Some(row) => {
                let model = sponsorship_tiers::Model::from_query_result(&row, "")
                    .map_err(StorageError::from_source)?;
                tier_to_record(model).map(Some)
            }
            None => Ok(None),
        }
    }
}

pub(crate) fn billing_to_db(billing: TierBilling) -> TierBillingDb {
    match billing {
        TierBilling::OneTime => TierBillingDb::OneTime,
        TierBilling::Monthly => TierBillingDb::Monthly,
    }
}

pub(crate) fn tier_to_record(model: sponsorship_tiers::Model) -> StorageResult<TierRecord> {
    let slot = TierSlot::from_priority(model.slot_priority).ok_or_else(|| {
        StorageError::Database(format!(
            "tier {} has unknown slot priority {}",
            model.id, model.slot_priority
        ))
    })?;
    Ok(TierRecord {
        id: TierId(model.id),
        creator: ExplorerId(model.creator_id),
        billing: match model.billing {
            TierBillingDb::OneTime => TierBilling::OneTime,
            TierBillingDb::Monthly => TierBilling::Monthly,
        },
        slot,
        price_minor: model.price_minor,
        currency: model.currency,
        description: model.description,
        is_available: model.is_available,
        product_id: model.product_id,
        monthly_price_id: model.monthly_price_id,
        yearly_price_id: model.yearly_price_id,
        deleted_at: model.deleted_at,
        created_at: model.created_at,
    })
}
