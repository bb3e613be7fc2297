use sea_orm::sea_query::{PostgresQueryBuilder, Query, SqliteQueryBuilder};
use sea_orm::ActiveEnum;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait,
    FromQueryResult, Set, Statement,
};
use trailfund_domain::model::{
    CheckoutId, CheckoutRecord, CheckoutStatus, ExpeditionId, ExplorerId, NewCheckout,
    SponsorshipKind, TierId,
};
use trailfund_domain::storage::{CheckoutStore, StorageError, StorageResult};

use crate::entity::checkouts::{self, CheckoutStatusDb, SponsorshipKindDb};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl CheckoutStore for SeaOrmStorage {
    async fn insert_checkout(&self, checkout: NewCheckout) -> StorageResult<CheckoutRecord> {
        let model = checkouts::ActiveModel {
            status: Set(CheckoutStatusDb::Pending),
            kind: Set(kind_to_db(checkout.kind)),
            tier_id: Set(checkout.tier.map(TierId::value)),
            amount_minor: Set(checkout.amount_minor),
            currency: Set(checkout.currency),
            message: Set(checkout.message),
            sponsor_id: Set(checkout.sponsor.value()),
            creator_id: Set(checkout.creator.value()),
            email_delivery: Set(checkout.email_delivery),
            is_public: Set(checkout.is_public),
            is_message_public: Set(checkout.is_message_public),
            expedition_id: Set(checkout.expedition.map(ExpeditionId::value)),
            ..Default::default()
        };
        let inserted = model
            .insert(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(checkout_to_record(inserted))
    }

    async fn find_checkout(&self, id: CheckoutId) -> StorageResult<Option<CheckoutRecord>> {
        let maybe = checkouts::Entity::find_by_id(id.value())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(checkout_to_record))
    }

    async fn set_payment_handles(
        &self,
        id: CheckoutId,
        payment_intent_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> StorageResult<()> {
        let mut model = checkouts::ActiveModel {
            id: Set(id.value()),
            ..Default::default()
        };
        if let Some(intent) = payment_intent_id {
            model.payment_intent_id = Set(Some(intent.to_string()));
        }
        if let Some(subscription) = subscription_id {
            model.subscription_id = Set(Some(subscription.to_string()));
        }
        model
            .update(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn mark_refunded(&self, id: CheckoutId) -> StorageResult<Option<CheckoutRecord>> {
        let backend = self.connection().get_database_backend();

        // Only the legal transitions flip the row: PENDING or CONFIRMED may
        // become REFUNDED, anything else stays untouched.
        let mut query = Query::update();
        query.table(checkouts::Entity);
        query.value(
            checkouts::Column::Status,
            CheckoutStatusDb::Refunded.to_value(),
        );
        query.and_where(checkouts::Column::Id.eq(id.value()));
        query.and_where(checkouts::Column::Status.is_in([
            CheckoutStatusDb::Pending.to_value(),
            CheckoutStatusDb::Confirmed.to_value(),
        ]));
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
                let model = checkouts::Model::from_query_result(&row, "")
                    .map_err(StorageError::from_source)?;
                Ok(Some(checkout_to_record(model)))
            }
            None => Ok(None),
        }
    }
}

pub(crate) fn kind_to_db(kind: SponsorshipKind) -> SponsorshipKindDb {
    match kind {
        SponsorshipKind::OneTime => SponsorshipKindDb::OneTime,
        SponsorshipKind::Subscription => SponsorshipKindDb::Subscription,
    }
}

pub(crate) fn kind_from_db(kind: SponsorshipKindDb) -> SponsorshipKind {
    match kind {
        SponsorshipKindDb::OneTime => SponsorshipKind::OneTime,
        SponsorshipKindDb::Subscription => SponsorshipKind::Subscription,
    }
}

pub(crate) fn checkout_to_record(model: checkouts::Model) -> CheckoutRecord {
    CheckoutRecord {
        id: CheckoutId(model.id),
        status: match model.status {
            CheckoutStatusDb::Pending => CheckoutStatus::Pending,
            CheckoutStatusDb::Confirmed => CheckoutStatus::Confirmed,
            CheckoutStatusDb::Refunded => CheckoutStatus::Refunded,
        },
        kind: kind_from_db(model.kind),
        tier: model.tier_id.map(TierId),
        amount_minor: model.amount_minor,
        currency: model.currency,
        message: model.message,
        sponsor: ExplorerId(model.sponsor_id),
        creator: ExplorerId(model.creator_id),
        payment_intent_id: model.payment_intent_id,
        subscription_id: model.subscription_id,
        email_delivery: model.email_delivery,
        is_public: model.is_public,
        is_message_public: model.is_message_public,
        expedition: model.expedition_id.map(ExpeditionId),
        confirmed_at: model.confirmed_at,
        created_at: model.created_at,
    }
}
