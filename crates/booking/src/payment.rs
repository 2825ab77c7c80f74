use serde::{Deserialize, Serialize};
use sqlx::postgres::PgArguments;
use sqlx::prelude::FromRow;
use sqlx::types::Uuid;
use sqlx::Postgres;
use strum_macros::{Display, EnumString};

use bizli_common::get_current_timestamp;
use bizli_database::{SqlxCrud, SqlxFilterQuery, SqlxSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
}

/// A client-facing payment record. Created pending before the checkout
/// redirect; its status is mutated only by webhook reconciliation, keyed by
/// this row's immutable id (carried as the checkout client reference).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientPayment {
    pub id: Uuid,
    pub client_id: Uuid,
    pub business_id: Uuid,
    pub service_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,

    pub checkout_session_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub stripe_payment_id: Option<String>,
    pub receipt_url: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl ClientPayment {
    pub fn new(id: Uuid, client_id: Uuid, business_id: Uuid, amount_cents: i64, currency: String) -> Self {
        let now = get_current_timestamp() as i64;
        Self {
            id,
            client_id,
            business_id,
            service_id: None,
            appointment_id: None,
            checkout_session_id: String::new(),
            amount_cents,
            currency,
            payment_status: PaymentStatus::Pending,
            stripe_payment_id: None,
            receipt_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ClientPaymentRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub business_id: Uuid,
    pub service_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub checkout_session_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_status: String,
    pub stripe_payment_id: Option<String>,
    pub receipt_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SqlxSchema for ClientPayment {
    type Id = Uuid;
    type Row = ClientPaymentRow;

    const TABLE_NAME: &'static str = "client_payments";
    const ID_COLUMN_NAME: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &[
        "id", "client_id", "business_id", "service_id", "appointment_id", "checkout_session_id",
        "amount_cents", "currency", "payment_status", "stripe_payment_id", "receipt_url",
        "created_at", "updated_at",
    ];
    const INDEXES_SQL: &'static [&'static str] = &[
        "CREATE INDEX IF NOT EXISTS idx_client_payments_client_id ON \"client_payments\" (\"client_id\");",
        "CREATE INDEX IF NOT EXISTS idx_client_payments_stripe_id ON \"client_payments\" (\"stripe_payment_id\");",
        "CREATE INDEX IF NOT EXISTS idx_client_payments_session_id ON \"client_payments\" (\"checkout_session_id\");",
    ];

    fn get_id_value(&self) -> Uuid {
        self.id
    }

    fn from_row(row: ClientPaymentRow) -> Self {
        Self {
            id: row.id,
            client_id: row.client_id,
            business_id: row.business_id,
            service_id: row.service_id,
            appointment_id: row.appointment_id,
            checkout_session_id: row.checkout_session_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            payment_status: row.payment_status.parse().unwrap_or_default(),
            stripe_payment_id: row.stripe_payment_id,
            receipt_url: row.receipt_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn create_table_sql() -> String {
        r#"CREATE TABLE IF NOT EXISTS "client_payments" (
            "id" UUID PRIMARY KEY,
            "client_id" UUID NOT NULL REFERENCES "user_profiles"("id"),
            "business_id" UUID NOT NULL REFERENCES "businesses"("id"),
            "service_id" UUID REFERENCES "services"("id"),
            "appointment_id" UUID REFERENCES "appointments"("id"),
            "checkout_session_id" TEXT NOT NULL,
            "amount_cents" BIGINT NOT NULL,
            "currency" TEXT NOT NULL,
            "payment_status" TEXT NOT NULL,
            "stripe_payment_id" TEXT,
            "receipt_url" TEXT,
            "created_at" BIGINT NOT NULL,
            "updated_at" BIGINT NOT NULL
        );"#
        .to_string()
    }
}

impl SqlxCrud for ClientPayment {
    fn bind_insert<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments> {
        query
            .bind(self.id)
            .bind(self.client_id)
            .bind(self.business_id)
            .bind(self.service_id)
            .bind(self.appointment_id)
            .bind(self.checkout_session_id.clone())
            .bind(self.amount_cents)
            .bind(self.currency.clone())
            .bind(self.payment_status.to_string())
            .bind(self.stripe_payment_id.clone())
            .bind(self.receipt_url.clone())
            .bind(self.created_at)
            .bind(self.updated_at)
    }

    fn bind_update<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments> {
        query
            .bind(self.client_id)
            .bind(self.business_id)
            .bind(self.service_id)
            .bind(self.appointment_id)
            .bind(self.checkout_session_id.clone())
            .bind(self.amount_cents)
            .bind(self.currency.clone())
            .bind(self.payment_status.to_string())
            .bind(self.stripe_payment_id.clone())
            .bind(self.receipt_url.clone())
            .bind(self.created_at)
            .bind(self.updated_at)
            .bind(self.id)
    }
}

impl SqlxFilterQuery for ClientPayment {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_status_text_forms() {
        assert_eq!(PaymentStatus::Completed.to_string(), "completed");
        assert_eq!("refunded".parse::<PaymentStatus>().unwrap(), PaymentStatus::Refunded);
        assert_eq!("???".parse::<PaymentStatus>().unwrap_or_default(), PaymentStatus::Pending);
    }

    #[test]
    fn new_payment_is_pending() {
        let p = ClientPayment::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 2500, "usd".into());
        assert_eq!(p.payment_status, PaymentStatus::Pending);
        assert!(p.stripe_payment_id.is_none());
        assert!(p.appointment_id.is_none());
    }
}
