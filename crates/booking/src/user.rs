use serde::{Deserialize, Serialize};
use sqlx::postgres::PgArguments;
use sqlx::prelude::FromRow;
use sqlx::types::Uuid;
use sqlx::Postgres;
use strum_macros::{Display, EnumString};

use bizli_common::get_current_timestamp;
use bizli_database::{SqlxCrud, SqlxFilterQuery, SqlxSchema};

/// Role is authoritative in this backend-side record; registration can only
/// produce clients and businesses, and only the admin route may change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Client,
    Business,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub user_id: String,
    pub email: String,

    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,

    pub created_at: i64,
    pub updated_at: i64,
}

impl UserProfile {
    pub fn new(user_id: String, email: String, role: UserRole, display_name: Option<String>) -> Self {
        let now = get_current_timestamp() as i64;
        Self {
            id: Uuid::new_v4(),
            user_id,
            email,
            display_name,
            phone: None,
            role,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct UserProfileRow {
    pub id: Uuid,
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SqlxSchema for UserProfile {
    type Id = Uuid;
    type Row = UserProfileRow;

    const TABLE_NAME: &'static str = "user_profiles";
    const ID_COLUMN_NAME: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &[
        "id", "user_id", "email", "display_name", "phone", "role", "created_at", "updated_at",
    ];
    const INDEXES_SQL: &'static [&'static str] = &[
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_user_profiles_user_id ON \"user_profiles\" (\"user_id\");",
        "CREATE INDEX IF NOT EXISTS idx_user_profiles_email ON \"user_profiles\" (\"email\");",
    ];

    fn get_id_value(&self) -> Uuid {
        self.id
    }

    fn from_row(row: UserProfileRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            email: row.email,
            display_name: row.display_name,
            phone: row.phone,
            role: row.role.parse().unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn create_table_sql() -> String {
        r#"CREATE TABLE IF NOT EXISTS "user_profiles" (
            "id" UUID PRIMARY KEY,
            "user_id" TEXT NOT NULL,
            "email" TEXT NOT NULL,
            "display_name" TEXT,
            "phone" TEXT,
            "role" TEXT NOT NULL,
            "created_at" BIGINT NOT NULL,
            "updated_at" BIGINT NOT NULL
        );"#
        .to_string()
    }
}

impl SqlxCrud for UserProfile {
    fn bind_insert<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments> {
        query
            .bind(self.id)
            .bind(self.user_id.clone())
            .bind(self.email.clone())
            .bind(self.display_name.clone())
            .bind(self.phone.clone())
            .bind(self.role.to_string())
            .bind(self.created_at)
            .bind(self.updated_at)
    }

    fn bind_update<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments> {
        query
            .bind(self.user_id.clone())
            .bind(self.email.clone())
            .bind(self.display_name.clone())
            .bind(self.phone.clone())
            .bind(self.role.to_string())
            .bind(self.created_at)
            .bind(self.updated_at)
            .bind(self.id)
    }
}

impl SqlxFilterQuery for UserProfile {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        assert_eq!(UserRole::Client.to_string(), "client");
        assert_eq!(UserRole::Business.to_string(), "business");
        assert_eq!(UserRole::Admin.to_string(), "admin");
        assert_eq!("business".parse::<UserRole>().unwrap(), UserRole::Business);
        assert_eq!("Admin".parse::<UserRole>().unwrap(), UserRole::Admin);
    }

    #[test]
    fn unknown_role_degrades_to_client() {
        assert_eq!("superuser".parse::<UserRole>().unwrap_or_default(), UserRole::Client);
    }

    #[test]
    fn new_profile_defaults() {
        let p = UserProfile::new("email_a@b.c".into(), "a@b.c".into(), UserRole::Client, None);
        assert_eq!(p.role, UserRole::Client);
        assert!(p.phone.is_none());
        assert_eq!(p.created_at, p.updated_at);
    }
}
