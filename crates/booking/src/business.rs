use serde::{Deserialize, Serialize};
use sqlx::postgres::PgArguments;
use sqlx::prelude::FromRow;
use sqlx::types::Uuid;
use sqlx::Postgres;

use bizli_common::get_current_timestamp;
use bizli_database::{SqlxCrud, SqlxFilterQuery, SqlxSchema};

/// A registered business. Created pending (`is_approved = false`), approved
/// by an admin, and deactivatable without deletion (`is_active = false`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    pub id: Uuid,
    pub owner_id: Uuid,

    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub is_approved: bool,
    pub is_active: bool,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Business {
    pub fn new(owner_id: Uuid, name: String) -> Self {
        let now = get_current_timestamp() as i64;
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            description: None,
            category: None,
            address: None,
            phone: None,
            latitude: None,
            longitude: None,
            is_approved: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Clients only ever see approved, active businesses.
    pub fn is_visible_to_clients(&self) -> bool {
        self.is_approved && self.is_active
    }

    pub fn distance_km_from(&self, latitude: f64, longitude: f64) -> Option<f64> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(distance_km(lat, lng, latitude, longitude)),
            _ => None,
        }
    }
}

/// Great-circle distance between two coordinates (haversine).
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[derive(Debug, Clone, FromRow)]
pub struct BusinessRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_approved: bool,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SqlxSchema for Business {
    type Id = Uuid;
    type Row = BusinessRow;

    const TABLE_NAME: &'static str = "businesses";
    const ID_COLUMN_NAME: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &[
        "id", "owner_id", "name", "description", "category", "address", "phone", "latitude",
        "longitude", "is_approved", "is_active", "created_at", "updated_at",
    ];
    const INDEXES_SQL: &'static [&'static str] = &[
        "CREATE INDEX IF NOT EXISTS idx_businesses_owner_id ON \"businesses\" (\"owner_id\");",
        "CREATE INDEX IF NOT EXISTS idx_businesses_category ON \"businesses\" (\"category\");",
    ];

    fn get_id_value(&self) -> Uuid {
        self.id
    }

    fn from_row(row: BusinessRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            category: row.category,
            address: row.address,
            phone: row.phone,
            latitude: row.latitude,
            longitude: row.longitude,
            is_approved: row.is_approved,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn create_table_sql() -> String {
        r#"CREATE TABLE IF NOT EXISTS "businesses" (
            "id" UUID PRIMARY KEY,
            "owner_id" UUID NOT NULL REFERENCES "user_profiles"("id"),
            "name" TEXT NOT NULL,
            "description" TEXT,
            "category" TEXT,
            "address" TEXT,
            "phone" TEXT,
            "latitude" DOUBLE PRECISION,
            "longitude" DOUBLE PRECISION,
            "is_approved" BOOLEAN NOT NULL DEFAULT FALSE,
            "is_active" BOOLEAN NOT NULL DEFAULT TRUE,
            "created_at" BIGINT NOT NULL,
            "updated_at" BIGINT NOT NULL
        );"#
        .to_string()
    }
}

impl SqlxCrud for Business {
    fn bind_insert<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments> {
        query
            .bind(self.id)
            .bind(self.owner_id)
            .bind(self.name.clone())
            .bind(self.description.clone())
            .bind(self.category.clone())
            .bind(self.address.clone())
            .bind(self.phone.clone())
            .bind(self.latitude)
            .bind(self.longitude)
            .bind(self.is_approved)
            .bind(self.is_active)
            .bind(self.created_at)
            .bind(self.updated_at)
    }

    fn bind_update<'q>(
        &self,
        query: sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments>,
    ) -> sqlx::query::QueryAs<'q, Postgres, Self::Row, PgArguments> {
        query
            .bind(self.owner_id)
            .bind(self.name.clone())
            .bind(self.description.clone())
            .bind(self.category.clone())
            .bind(self.address.clone())
            .bind(self.phone.clone())
            .bind(self.latitude)
            .bind(self.longitude)
            .bind(self.is_approved)
            .bind(self.is_active)
            .bind(self.created_at)
            .bind(self.updated_at)
            .bind(self.id)
    }
}

impl SqlxFilterQuery for Business {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_business_starts_pending_and_active() {
        let b = Business::new(Uuid::new_v4(), "Corner Barbers".into());
        assert!(!b.is_approved);
        assert!(b.is_active);
        assert!(!b.is_visible_to_clients());
    }

    #[test]
    fn visibility_requires_approval_and_activity() {
        let mut b = Business::new(Uuid::new_v4(), "Corner Barbers".into());
        b.is_approved = true;
        assert!(b.is_visible_to_clients());
        b.is_active = false;
        assert!(!b.is_visible_to_clients());
    }

    #[test]
    fn haversine_distance_is_sane() {
        // London -> Paris is roughly 344 km
        let d = distance_km(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((d - 344.0).abs() < 10.0, "got {}", d);
        assert!(distance_km(10.0, 20.0, 10.0, 20.0) < 1e-9);
    }

    #[test]
    fn distance_needs_coordinates() {
        let mut b = Business::new(Uuid::new_v4(), "No Address".into());
        assert!(b.distance_km_from(0.0, 0.0).is_none());
        b.latitude = Some(48.8566);
        b.longitude = Some(2.3522);
        assert!(b.distance_km_from(48.8566, 2.3522).unwrap() < 1e-9);
    }
}
