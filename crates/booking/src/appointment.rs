use anyhow::{anyhow, Result};
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
pub enum AppointmentStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub business_id: Uuid,
    pub service_id: Uuid,
    pub client_id: Uuid,

    pub scheduled_at: i64,
    pub status: AppointmentStatus,
    pub notes: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Appointment {
    pub fn new(business_id: Uuid, service_id: Uuid, client_id: Uuid, scheduled_at: i64) -> Self {
        let now = get_current_timestamp() as i64;
        Self {
            id: Uuid::new_v4(),
            business_id,
            service_id,
            client_id,
            scheduled_at,
            status: AppointmentStatus::Pending,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a status transition. Allowed moves: pending -> confirmed (on
    /// payment or manual business action), confirmed -> completed, and any
    /// state -> cancelled.
    pub fn transition_to(&mut self, next: AppointmentStatus) -> Result<()> {
        use AppointmentStatus::*;
        let allowed = matches!(
            (self.status, next),
            (Pending, Confirmed) | (Confirmed, Completed) | (_, Cancelled)
        );
        if !allowed {
            return Err(anyhow!(
                "[Appointment::transition_to] illegal transition {} -> {}",
                self.status,
                next
            ));
        }
        self.status = next;
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AppointmentRow {
    pub id: Uuid,
    pub business_id: Uuid,
    pub service_id: Uuid,
    pub client_id: Uuid,
    pub scheduled_at: i64,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SqlxSchema for Appointment {
    type Id = Uuid;
    type Row = AppointmentRow;

    const TABLE_NAME: &'static str = "appointments";
    const ID_COLUMN_NAME: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &[
        "id", "business_id", "service_id", "client_id", "scheduled_at", "status", "notes",
        "created_at", "updated_at",
    ];
    const INDEXES_SQL: &'static [&'static str] = &[
        "CREATE INDEX IF NOT EXISTS idx_appointments_business_id ON \"appointments\" (\"business_id\");",
        "CREATE INDEX IF NOT EXISTS idx_appointments_client_id ON \"appointments\" (\"client_id\");",
    ];

    fn get_id_value(&self) -> Uuid {
        self.id
    }

    fn from_row(row: AppointmentRow) -> Self {
        Self {
            id: row.id,
            business_id: row.business_id,
            service_id: row.service_id,
            client_id: row.client_id,
            scheduled_at: row.scheduled_at,
            status: row.status.parse().unwrap_or_default(),
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn create_table_sql() -> String {
        r#"CREATE TABLE IF NOT EXISTS "appointments" (
            "id" UUID PRIMARY KEY,
            "business_id" UUID NOT NULL REFERENCES "businesses"("id"),
            "service_id" UUID NOT NULL REFERENCES "services"("id"),
            "client_id" UUID NOT NULL REFERENCES "user_profiles"("id"),
            "scheduled_at" BIGINT NOT NULL,
            "status" TEXT NOT NULL,
            "notes" TEXT,
            "created_at" BIGINT NOT NULL,
            "updated_at" BIGINT NOT NULL
        );"#
        .to_string()
    }
}

impl SqlxCrud for Appointment {
    fn bind_insert<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments> {
        query
            .bind(self.id)
            .bind(self.business_id)
            .bind(self.service_id)
            .bind(self.client_id)
            .bind(self.scheduled_at)
            .bind(self.status.to_string())
            .bind(self.notes.clone())
            .bind(self.created_at)
            .bind(self.updated_at)
    }

    fn bind_update<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments> {
        query
            .bind(self.business_id)
            .bind(self.service_id)
            .bind(self.client_id)
            .bind(self.scheduled_at)
            .bind(self.status.to_string())
            .bind(self.notes.clone())
            .bind(self.created_at)
            .bind(self.updated_at)
            .bind(self.id)
    }
}

impl SqlxFilterQuery for Appointment {}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment() -> Appointment {
        Appointment::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 1_900_000_000)
    }

    #[test]
    fn payment_confirms_pending_appointment() {
        let mut a = appointment();
        a.transition_to(AppointmentStatus::Confirmed).unwrap();
        assert_eq!(a.status, AppointmentStatus::Confirmed);
    }

    #[test]
    fn confirmed_can_complete() {
        let mut a = appointment();
        a.transition_to(AppointmentStatus::Confirmed).unwrap();
        a.transition_to(AppointmentStatus::Completed).unwrap();
        assert_eq!(a.status, AppointmentStatus::Completed);
    }

    #[test]
    fn any_state_can_cancel() {
        for setup in [
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Completed,
        ] {
            let mut a = appointment();
            a.status = setup;
            a.transition_to(AppointmentStatus::Cancelled).unwrap();
            assert_eq!(a.status, AppointmentStatus::Cancelled);
        }
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut a = appointment();
        assert!(a.transition_to(AppointmentStatus::Completed).is_err());
        a.status = AppointmentStatus::Cancelled;
        assert!(a.transition_to(AppointmentStatus::Confirmed).is_err());
        assert_eq!(a.status, AppointmentStatus::Cancelled);
    }

    #[test]
    fn status_round_trips_through_text() {
        assert_eq!(AppointmentStatus::Pending.to_string(), "pending");
        assert_eq!("confirmed".parse::<AppointmentStatus>().unwrap(), AppointmentStatus::Confirmed);
        assert_eq!("nonsense".parse::<AppointmentStatus>().unwrap_or_default(), AppointmentStatus::Pending);
    }
}
