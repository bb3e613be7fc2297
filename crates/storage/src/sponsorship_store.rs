use sea_orm::sea_query::{PostgresQueryBuilder, Query, SqliteQueryBuilder};
use sea_orm::ActiveEnum;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, Statement,
};
use trailfund_domain::model::{
    ExpeditionId, ExplorerId, SponsorshipId, SponsorshipRecord, SponsorshipStatus, TierId,
};
use trailfund_domain::storage::{SponsorshipStore, StorageError, StorageResult};

use crate::checkout_store::kind_from_db;
use crate::entity::sponsorships::{self, SponsorshipKindDb, SponsorshipStatusDb};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl SponsorshipStore for SeaOrmStorage {
    async fn find_sponsorship(
        &self,
        id: SponsorshipId,
    ) -> StorageResult<Option<SponsorshipRecord>> {
        let maybe = sponsorships::Entity::find_by_id(id.value())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(sponsorship_to_record))
    }

    async fn has_active_subscription(
        &self,
        sponsor: ExplorerId,
        creator: ExplorerId,
    ) -> StorageResult<bool> {
        let count = sponsorships::Entity::find()
            .filter(sponsorships::Column::SponsorId.eq(sponsor.value()))
            .filter(sponsorships::Column::CreatorId.eq(creator.value()))
            .filter(sponsorships::Column::Kind.eq(SponsorshipKindDb::Subscription))
            .filter(sponsorships::Column::Status.eq(SponsorshipStatusDb::Active))
            .count(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(count > 0)
    }

    async fn cancel_sponsorship(
        &self,
        id: SponsorshipId,
    ) -> StorageResult<Option<SponsorshipRecord>> {
        let backend = self.connection().get_database_backend();

        let mut query = Query::update();
        query.table(sponsorships::Entity);
        query.value(
            sponsorships::Column::Status,
            SponsorshipStatusDb::Canceled.to_value(),
        );
        query.and_where(sponsorships::Column::Id.eq(id.value()));
        query.and_where(sponsorships::Column::Status.eq(SponsorshipStatusDb::Active));
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
                let model = sponsorships::Model::from_query_result(&row, "")
                    .map_err(StorageError::from_source)?;
                Ok(Some(sponsorship_to_record(model)))
            }
            None => Ok(None),
        }
    }
}

pub(crate) fn sponsorship_to_record(model: sponsorships::Model) -> SponsorshipRecord {
    SponsorshipRecord {
        id: SponsorshipId(model.id),
        kind: kind_from_db(model.kind),
        status: match model.status {
            SponsorshipStatusDb::Pending => SponsorshipStatus::Pending,
            SponsorshipStatusDb::Confirmed => SponsorshipStatus::Confirmed,
            SponsorshipStatusDb::Active => SponsorshipStatus::Active,
            SponsorshipStatusDb::Canceled => SponsorshipStatus::Canceled,
        },
        amount_minor: model.amount_minor,
        currency: model.currency,
        message: model.message,
        sponsor: ExplorerId(model.sponsor_id),
        creator: ExplorerId(model.creator_id),
        tier: model.tier_id.map(TierId),
        subscription_id: model.subscription_id,
        expires_at: model.expires_at,
        email_delivery: model.email_delivery,
        is_public: model.is_public,
        is_message_public: model.is_message_public,
        expedition: model.expedition_id.map(ExpeditionId),
        created_at: model.created_at,
    }
}
