use serde::{Deserialize, Serialize};
use sqlx::postgres::PgArguments;
use sqlx::prelude::FromRow;
use sqlx::types::Uuid;
use sqlx::Postgres;
use strum_macros::{Display, EnumString};

use bizli_common::get_current_timestamp;
use bizli_database::{SqlxCrud, SqlxFilterQuery, SqlxSchema};

/// Plan tiers. Basic is the baseline a malformed or missing plan falls back
/// to during webhook reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[strum(ascii_case_insensitive)]
pub enum PlanTier {
    #[default]
    Basic,
    Business,
    Premium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    PastDue,
    Canceled,
}

/// At most one subscription per business; `business_id` is the upsert
/// conflict key and the latest reconciled event wins. Rows are written only
/// by webhook reconciliation, never by UI-facing routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub business_id: Uuid,

    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    pub stripe_subscription_id: String,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Subscription {
    pub fn new(business_id: Uuid, plan: PlanTier, stripe_subscription_id: String) -> Self {
        let now = get_current_timestamp() as i64;
        Self {
            id: Uuid::new_v4(),
            business_id,
            plan,
            status: SubscriptionStatus::Active,
            stripe_subscription_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub business_id: Uuid,
    pub plan: String,
    pub status: String,
    pub stripe_subscription_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SqlxSchema for Subscription {
    type Id = Uuid;
    type Row = SubscriptionRow;

    const TABLE_NAME: &'static str = "subscriptions";
    const ID_COLUMN_NAME: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &[
        "id", "business_id", "plan", "status", "stripe_subscription_id", "created_at", "updated_at",
    ];
    const INDEXES_SQL: &'static [&'static str] = &[
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_stripe_id ON \"subscriptions\" (\"stripe_subscription_id\");",
    ];

    fn get_id_value(&self) -> Uuid {
        self.id
    }

    fn from_row(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            business_id: row.business_id,
            plan: row.plan.parse().unwrap_or_default(),
            status: row.status.parse().unwrap_or_default(),
            stripe_subscription_id: row.stripe_subscription_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn create_table_sql() -> String {
        r#"CREATE TABLE IF NOT EXISTS "subscriptions" (
            "id" UUID PRIMARY KEY,
            "business_id" UUID NOT NULL UNIQUE REFERENCES "businesses"("id"),
            "plan" TEXT NOT NULL,
            "status" TEXT NOT NULL,
            "stripe_subscription_id" TEXT NOT NULL,
            "created_at" BIGINT NOT NULL,
            "updated_at" BIGINT NOT NULL
        );"#
        .to_string()
    }
}

impl SqlxCrud for Subscription {
    fn bind_insert<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments> {
        query
            .bind(self.id)
            .bind(self.business_id)
            .bind(self.plan.to_string())
            .bind(self.status.to_string())
            .bind(self.stripe_subscription_id.clone())
            .bind(self.created_at)
            .bind(self.updated_at)
    }

    fn bind_update<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments> {
        query
            .bind(self.business_id)
            .bind(self.plan.to_string())
            .bind(self.status.to_string())
            .bind(self.stripe_subscription_id.clone())
            .bind(self.created_at)
            .bind(self.updated_at)
            .bind(self.id)
    }
}

impl SqlxFilterQuery for Subscription {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parses_case_insensitively() {
        assert_eq!("Business".parse::<PlanTier>().unwrap(), PlanTier::Business);
        assert_eq!("premium".parse::<PlanTier>().unwrap(), PlanTier::Premium);
    }

    #[test]
    fn invalid_plan_falls_back_to_basic() {
        assert_eq!("Unknown".parse::<PlanTier>().unwrap_or_default(), PlanTier::Basic);
    }

    #[test]
    fn status_text_forms() {
        assert_eq!(SubscriptionStatus::PastDue.to_string(), "past_due");
        assert_eq!("past_due".parse::<SubscriptionStatus>().unwrap(), SubscriptionStatus::PastDue);
        assert_eq!("canceled".parse::<SubscriptionStatus>().unwrap(), SubscriptionStatus::Canceled);
    }

    #[test]
    fn new_subscription_is_active() {
        let s = Subscription::new(Uuid::new_v4(), PlanTier::Business, "sub_1".into());
        assert_eq!(s.status, SubscriptionStatus::Active);
    }
}
