use sea_orm::sea_query::{
    ColumnDef, Expr, Index, IndexCreateStatement, Table, TableCreateStatement,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{checkouts, expeditions, explorers, sponsorship_tiers, sponsorships};
use trailfund_domain::storage::{StorageError, StorageResult};

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let explorers_table = Table::create()
        .if_not_exists()
        .table(explorers::Entity)
        .col(
            ColumnDef::new(explorers::Column::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(explorers::Column::Handle)
                .string_len(64)
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(explorers::Column::Email)
                .string_len(255)
                .not_null(),
        )
        .col(
            ColumnDef::new(explorers::Column::EmailVerified)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(
            ColumnDef::new(explorers::Column::ConnectedAccountId)
                .string_len(64)
                .null(),
        )
        .col(
            ColumnDef::new(explorers::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, explorers_table).await?;

    let tiers_table = Table::create()
        .if_not_exists()
        .table(sponsorship_tiers::Entity)
        .col(
            ColumnDef::new(sponsorship_tiers::Column::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(sponsorship_tiers::Column::CreatorId)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(sponsorship_tiers::Column::Billing)
                .tiny_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(sponsorship_tiers::Column::SlotPriority)
                .small_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(sponsorship_tiers::Column::PriceMinor)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(sponsorship_tiers::Column::Currency)
                .string_len(8)
                .not_null(),
        )
        .col(
            ColumnDef::new(sponsorship_tiers::Column::Description)
                .string()
                .null(),
        )
        .col(
            ColumnDef::new(sponsorship_tiers::Column::IsAvailable)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(
            ColumnDef::new(sponsorship_tiers::Column::ProductId)
                .string_len(64)
                .null(),
        )
        .col(
            ColumnDef::new(sponsorship_tiers::Column::MonthlyPriceId)
                .string_len(64)
                .null(),
        )
        .col(
            ColumnDef::new(sponsorship_tiers::Column::YearlyPriceId)
                .string_len(64)
                .null(),
        )
        .col(
            ColumnDef::new(sponsorship_tiers::Column::DeletedAt)
                .date_time()
                .null(),
        )
        .col(
            ColumnDef::new(sponsorship_tiers::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, tiers_table).await?;

    // One tier per creator per (billing, slot).
    let tier_slot_index = Index::create()
        .if_not_exists()
        .name("idx_tiers_creator_billing_slot")
        .table(sponsorship_tiers::Entity)
        .col(sponsorship_tiers::Column::CreatorId)
        .col(sponsorship_tiers::Column::Billing)
        .col(sponsorship_tiers::Column::SlotPriority)
        .unique()
        .to_owned();
    create_index(db, backend, tier_slot_index).await?;

    let checkouts_table = Table::create()
        .if_not_exists()
        .table(checkouts::Entity)
        .col(
            ColumnDef::new(checkouts::Column::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(checkouts::Column::Status)
                .tiny_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(checkouts::Column::Kind)
                .tiny_integer()
                .not_null(),
        )
        .col(ColumnDef::new(checkouts::Column::TierId).big_integer().null())
        .col(
            ColumnDef::new(checkouts::Column::AmountMinor)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(checkouts::Column::Currency)
                .string_len(8)
                .not_null(),
        )
        .col(ColumnDef::new(checkouts::Column::Message).string().null())
        .col(
            ColumnDef::new(checkouts::Column::SponsorId)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(checkouts::Column::CreatorId)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(checkouts::Column::PaymentIntentId)
                .string_len(64)
                .null(),
        )
        .col(
            ColumnDef::new(checkouts::Column::SubscriptionId)
                .string_len(64)
                .null(),
        )
        .col(
            ColumnDef::new(checkouts::Column::EmailDelivery)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(
            ColumnDef::new(checkouts::Column::IsPublic)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(
            ColumnDef::new(checkouts::Column::IsMessagePublic)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(
            ColumnDef::new(checkouts::Column::ExpeditionId)
                .big_integer()
                .null(),
        )
        .col(
            ColumnDef::new(checkouts::Column::ConfirmedAt)
                .date_time()
                .null(),
        )
        .col(
            ColumnDef::new(checkouts::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, checkouts_table).await?;

    let sponsorships_table = Table::create()
        .if_not_exists()
        .table(sponsorships::Entity)
        .col(
            ColumnDef::new(sponsorships::Column::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(sponsorships::Column::Kind)
                .tiny_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(sponsorships::Column::Status)
                .tiny_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(sponsorships::Column::AmountMinor)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(sponsorships::Column::Currency)
                .string_len(8)
                .not_null(),
        )
        .col(ColumnDef::new(sponsorships::Column::Message).string().null())
        .col(
            ColumnDef::new(sponsorships::Column::SponsorId)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(sponsorships::Column::CreatorId)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(sponsorships::Column::TierId)
                .big_integer()
                .null(),
        )
        .col(
            ColumnDef::new(sponsorships::Column::SubscriptionId)
                .string_len(64)
                .null(),
        )
        .col(
            ColumnDef::new(sponsorships::Column::ExpiresAt)
                .date_time()
                .null(),
        )
        .col(
            ColumnDef::new(sponsorships::Column::EmailDelivery)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(
            ColumnDef::new(sponsorships::Column::IsPublic)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(
            ColumnDef::new(sponsorships::Column::IsMessagePublic)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(
            ColumnDef::new(sponsorships::Column::ExpeditionId)
                .big_integer()
                .null(),
        )
        .col(
            ColumnDef::new(sponsorships::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, sponsorships_table).await?;

    let sponsor_creator_index = Index::create()
        .if_not_exists()
        .name("idx_sponsorships_sponsor_creator")
        .table(sponsorships::Entity)
        .col(sponsorships::Column::SponsorId)
        .col(sponsorships::Column::CreatorId)
        .to_owned();
    create_index(db, backend, sponsor_creator_index).await?;

    let expeditions_table = Table::create()
        .if_not_exists()
        .table(expeditions::Entity)
        .col(
            ColumnDef::new(expeditions::Column::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(expeditions::Column::CreatorId)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(expeditions::Column::Title)
                .string_len(255)
                .not_null(),
        )
        .col(
            ColumnDef::new(expeditions::Column::Status)
                .tiny_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(expeditions::Column::Raised)
                .big_integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(expeditions::Column::SponsorsCount)
                .integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(expeditions::Column::DeletedAt)
                .date_time()
                .null(),
        )
        .col(
            ColumnDef::new(expeditions::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, expeditions_table).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    statement: IndexCreateStatement,
) -> StorageResult<()> {
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
