use serde::{Deserialize, Serialize};
use sqlx::postgres::PgArguments;
use sqlx::prelude::FromRow;
use sqlx::types::Uuid;
use sqlx::Postgres;

use bizli_common::get_current_timestamp;
use bizli_database::{SqlxCrud, SqlxFilterQuery, SqlxSchema};

/// A bookable service offered by a business. Rows cascade away with their
/// business. `stripe_price_id` carries the preconfigured checkout price;
/// a service without one cannot be paid for online.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub business_id: Uuid,

    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub duration_minutes: i32,
    pub stripe_price_id: Option<String>,
    pub is_active: bool,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Service {
    pub fn new(business_id: Uuid, name: String, price_cents: i64, duration_minutes: i32) -> Self {
        let now = get_current_timestamp() as i64;
        Self {
            id: Uuid::new_v4(),
            business_id,
            name,
            description: None,
            price_cents,
            duration_minutes,
            stripe_price_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceRow {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub duration_minutes: i32,
    pub stripe_price_id: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SqlxSchema for Service {
    type Id = Uuid;
    type Row = ServiceRow;

    const TABLE_NAME: &'static str = "services";
    const ID_COLUMN_NAME: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &[
        "id", "business_id", "name", "description", "price_cents", "duration_minutes",
        "stripe_price_id", "is_active", "created_at", "updated_at",
    ];
    const INDEXES_SQL: &'static [&'static str] = &[
        "CREATE INDEX IF NOT EXISTS idx_services_business_id ON \"services\" (\"business_id\");",
    ];

    fn get_id_value(&self) -> Uuid {
        self.id
    }

    fn from_row(row: ServiceRow) -> Self {
        Self {
            id: row.id,
            business_id: row.business_id,
            name: row.name,
            description: row.description,
            price_cents: row.price_cents,
            duration_minutes: row.duration_minutes,
            stripe_price_id: row.stripe_price_id,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn create_table_sql() -> String {
        r#"CREATE TABLE IF NOT EXISTS "services" (
            "id" UUID PRIMARY KEY,
            "business_id" UUID NOT NULL REFERENCES "businesses"("id") ON DELETE CASCADE,
            "name" TEXT NOT NULL,
            "description" TEXT,
            "price_cents" BIGINT NOT NULL,
            "duration_minutes" INTEGER NOT NULL,
            "stripe_price_id" TEXT,
            "is_active" BOOLEAN NOT NULL DEFAULT TRUE,
            "created_at" BIGINT NOT NULL,
            "updated_at" BIGINT NOT NULL
        );"#
        .to_string()
    }
}

impl SqlxCrud for Service {
    fn bind_insert<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments> {
        query
            .bind(self.id)
            .bind(self.business_id)
            .bind(self.name.clone())
            .bind(self.description.clone())
            .bind(self.price_cents)
            .bind(self.duration_minutes)
            .bind(self.stripe_price_id.clone())
            .bind(self.is_active)
            .bind(self.created_at)
            .bind(self.updated_at)
    }

    fn bind_update<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments> {
        query
            .bind(self.business_id)
            .bind(self.name.clone())
            .bind(self.description.clone())
            .bind(self.price_cents)
            .bind(self.duration_minutes)
            .bind(self.stripe_price_id.clone())
            .bind(self.is_active)
            .bind(self.created_at)
            .bind(self.updated_at)
            .bind(self.id)
    }
}

impl SqlxFilterQuery for Service {}
