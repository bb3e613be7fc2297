pub mod explorers {
    use sea_orm::entity::prelude::*;
    use sea_orm::sea_query::Expr;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "explorers")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        #[sea_orm(unique)]
        pub handle: String,
        pub email: String,
        pub email_verified: bool,
        pub connected_account_id: Option<String>,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod sponsorship_tiers {
    use sea_orm::entity::prelude::*;
    use sea_orm::sea_query::Expr;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "sponsorship_tiers")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub creator_id: i64,
        pub billing: TierBillingDb,
        /// Slot priority; the domain slot table maps it back to a named slot.
        pub slot_priority: i16,
        pub price_minor: i64,
        pub currency: String,
        pub description: Option<String>,
        pub is_available: bool,
        pub product_id: Option<String>,
        pub monthly_price_id: Option<String>,
        pub yearly_price_id: Option<String>,
        pub deleted_at: Option<DateTimeUtc>,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "i8", db_type = "TinyInteger")]
    pub enum TierBillingDb {
        #[sea_orm(num_value = 0)]
        OneTime,
        #[sea_orm(num_value = 1)]
        Monthly,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod checkouts {
    use sea_orm::entity::prelude::*;
    use sea_orm::sea_query::Expr;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "checkouts")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub status: CheckoutStatusDb,
        pub kind: SponsorshipKindDb,
        pub tier_id: Option<i64>,
        pub amount_minor: i64,
        pub currency: String,
        pub message: Option<String>,
        pub sponsor_id: i64,
        pub creator_id: i64,
        pub payment_intent_id: Option<String>,
        pub subscription_id: Option<String>,
        pub email_delivery: bool,
        pub is_public: bool,
        pub is_message_public: bool,
        pub expedition_id: Option<i64>,
        pub confirmed_at: Option<DateTimeUtc>,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "i8", db_type = "TinyInteger")]
    pub enum CheckoutStatusDb {
        #[sea_orm(num_value = 0)]
        Pending,
        #[sea_orm(num_value = 1)]
        Confirmed,
        #[sea_orm(num_value = 2)]
        Refunded,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "i8", db_type = "TinyInteger")]
    pub enum SponsorshipKindDb {
        #[sea_orm(num_value = 0)]
        OneTime,
        #[sea_orm(num_value = 1)]
        Subscription,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod sponsorships {
    use sea_orm::entity::prelude::*;
    use sea_orm::sea_query::Expr;

    pub use super::checkouts::SponsorshipKindDb;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "sponsorships")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub kind: SponsorshipKindDb,
        pub status: SponsorshipStatusDb,
        pub amount_minor: i64,
        pub currency: String,
        pub message: Option<String>,
        pub sponsor_id: i64,
        pub creator_id: i64,
        pub tier_id: Option<i64>,
        pub subscription_id: Option<String>,
        pub expires_at: Option<DateTimeUtc>,
        pub email_delivery: bool,
        pub is_public: bool,
        pub is_message_public: bool,
        pub expedition_id: Option<i64>,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "i8", db_type = "TinyInteger")]
    pub enum SponsorshipStatusDb {
        #[sea_orm(num_value = 0)]
        Pending,
        #[sea_orm(num_value = 1)]
        Confirmed,
        #[sea_orm(num_value = 2)]
        Active,
        #[sea_orm(num_value = 3)]
        Canceled,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod expeditions {
    use sea_orm::entity::prelude::*;
    use sea_orm::sea_query::Expr;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "expeditions")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub creator_id: i64,
        pub title: String,
        pub status: ExpeditionStatusDb,
        /// Funding aggregate in whole major units.
        pub raised: i64,
        pub sponsors_count: i32,
        pub deleted_at: Option<DateTimeUtc>,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
    #[sea_orm(rs_type = "i8", db_type = "TinyInteger")]
    pub enum ExpeditionStatusDb {
        #[sea_orm(num_value = 0)]
        Planned,
        #[sea_orm(num_value = 1)]
        Active,
        #[sea_orm(num_value = 2)]
        Completed,
        #[sea_orm(num_value = 3)]
        Abandoned,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
