//! The finalization transaction. Everything here runs inside one database
//! transaction: the checkout CAS, the sponsorship insert, and the expedition
//! aggregate increment commit together or roll back together.

use chrono::{DateTime, Duration, Months, Utc};
use sea_orm::sea_query::{Expr, PostgresQueryBuilder, Query, SqliteQueryBuilder};
use sea_orm::ActiveEnum;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseTransaction,
    EntityTrait, FromQueryResult, QueryFilter, QueryOrder, Set, Statement, TransactionTrait,
};
use trailfund_domain::model::{CheckoutId, FinalizeOutcome, SponsorshipKind};
use trailfund_domain::money::minor_to_major;
use trailfund_domain::storage::{LedgerStore, StorageError, StorageResult};

use crate::checkout_store::checkout_to_record;
use crate::entity::checkouts::{self, CheckoutStatusDb};
use crate::entity::expeditions::{self, ExpeditionStatusDb};
use crate::entity::sponsorships::{self, SponsorshipStatusDb};
use crate::sponsorship_store::sponsorship_to_record;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl LedgerStore for SeaOrmStorage {
    async fn finalize_checkout(
        &self,
        id: CheckoutId,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<FinalizeOutcome>> {
        let txn = self
            .connection()
            .begin()
            .await
            .map_err(StorageError::from_source)?;

        let Some(checkout_model) = claim_pending_checkout(&txn, id, now).await? else {
            txn.rollback().await.map_err(StorageError::from_source)?;
            return Ok(None);
        };
        let checkout = checkout_to_record(checkout_model.clone());

        let (status, expires_at) = match checkout.kind {
            SponsorshipKind::OneTime => (SponsorshipStatusDb::Confirmed, None),
            SponsorshipKind::Subscription => (
                SponsorshipStatusDb::Active,
                Some(
                    now.checked_add_months(Months::new(1))
                        .unwrap_or(now + Duration::days(30)),
                ),
            ),
        };

        let credited_expedition =
            credit_expedition(&txn, &checkout_model, checkout.amount_minor).await?;

        let sponsorship_model = sponsorships::ActiveModel {
            kind: Set(checkout_model.kind),
            status: Set(status),
            amount_minor: Set(checkout.amount_minor),
            currency: Set(checkout.currency.clone()),
            message: Set(checkout.message.clone()),
            sponsor_id: Set(checkout.sponsor.value()),
            creator_id: Set(checkout.creator.value()),
            tier_id: Set(checkout_model.tier_id),
            subscription_id: Set(checkout_model.subscription_id.clone()),
            expires_at: Set(expires_at),
            email_delivery: Set(checkout.email_delivery),
            is_public: Set(checkout.is_public),
            is_message_public: Set(checkout.is_message_public),
            expedition_id: Set(credited_expedition.or(checkout_model.expedition_id)),
            created_at: Set(now),
            ..Default::default()
        };
        let inserted = sponsorship_model
            .insert(&txn)
            .await
            .map_err(StorageError::from_source)?;

        txn.commit().await.map_err(StorageError::from_source)?;

        Ok(Some(FinalizeOutcome {
            checkout,
            sponsorship: sponsorship_to_record(inserted),
            credited_expedition: credited_expedition
                .map(trailfund_domain::model::ExpeditionId),
        }))
    }
}

/// `PENDING -> CONFIRMED` compare-and-swap. Returns the claimed row, or
/// `None` when another finalization already flipped it.
async fn claim_pending_checkout(
    txn: &DatabaseTransaction,
    id: CheckoutId,
    now: DateTime<Utc>,
) -> StorageResult<Option<checkouts::Model>> {
    let backend = txn.get_database_backend();

    let mut query = Query::update();
    query.table(checkouts::Entity);
    query.value(
        checkouts::Column::Status,
        CheckoutStatusDb::Confirmed.to_value(),
    );
    query.value(checkouts::Column::ConfirmedAt, now);
    query.and_where(checkouts::Column::Id.eq(id.value()));
    query.and_where(checkouts::Column::Status.eq(CheckoutStatusDb::Pending));
    query.returning_all();

    let (sql, values) = match backend {
        DatabaseBackend::Sqlite => query.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => query.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => unreachable!("mysql backend is not supported"),
    };
    let stmt = Statement::from_sql_and_values(backend, sql, values);
    let maybe_row = txn
        .query_one(stmt)
        .await
        .map_err(StorageError::from_source)?;

    match maybe_row {
        Some(row) => Ok(Some(
            checkouts::Model::from_query_result(&row, "").map_err(StorageError::from_source)?,
        )),
        None => Ok(None),
    }
}

/// Increments the funding aggregate of the target expedition: the one named
/// by the checkout when it is still fundable, otherwise the creator's most
/// recent planned/active non-deleted expedition. Returns the credited id, or
/// `None` when no fundable expedition exists.
async fn credit_expedition(
    txn: &DatabaseTransaction,
    checkout: &checkouts::Model,
    amount_minor: i64,
) -> StorageResult<Option<i64>> {
    let target = match checkout.expedition_id {
        Some(id) => expeditions::Entity::find_by_id(id)
            .filter(expeditions::Column::DeletedAt.is_null())
            .filter(expeditions::Column::Status.is_in([
                ExpeditionStatusDb::Planned.to_value(),
                ExpeditionStatusDb::Active.to_value(),
            ]))
            .one(txn)
            .await
            .map_err(StorageError::from_source)?,
        None => expeditions::Entity::find()
            .filter(expeditions::Column::CreatorId.eq(checkout.creator_id))
            .filter(expeditions::Column::DeletedAt.is_null())
            .filter(expeditions::Column::Status.is_in([
                ExpeditionStatusDb::Planned.to_value(),
                ExpeditionStatusDb::Active.to_value(),
            ]))
            .order_by_desc(expeditions::Column::CreatedAt)
            .order_by_desc(expeditions::Column::Id)
            .one(txn)
            .await
            .map_err(StorageError::from_source)?,
    };
    let Some(target) = target else {
        return Ok(None);
    };

    let backend = txn.get_database_backend();
    let mut query = Query::update();
    query.table(expeditions::Entity);
    query.value(
        expeditions::Column::Raised,
        Expr::col(expeditions::Column::Raised).add(minor_to_major(amount_minor)),
    );
    query.value(
        expeditions::Column::SponsorsCount,
        Expr::col(expeditions::Column::SponsorsCount).add(1),
    );
    query.and_where(expeditions::Column::Id.eq(target.id));

    let (sql, values) = match backend {
        DatabaseBackend::Sqlite => query.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => query.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => unreachable!("mysql backend is not supported"),
    };
    txn.execute(Statement::from_sql_and_values(backend, sql, values))
        .await
        .map_err(StorageError::from_source)?;

    Ok(Some(target.id))
}
