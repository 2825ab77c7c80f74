use bizli_common::define_module_client;
use bizli_database::init_databases;

use crate::{Appointment, Business, ClientPayment, Service, Subscription, UserProfile};

init_databases!(default: [
    UserProfile,
    Business,
    Service,
    Appointment,
    Subscription,
    ClientPayment,
]);

define_module_client! {
    (struct PostgresClient, "postgres")
    client_type: &'static sqlx::PgPool,
    env: ["DATABASE_URL"],
    setup: async { connect(false, true).await }
}

impl PostgresClient {
    pub fn pool(&self) -> &'static sqlx::PgPool {
        use bizli_common::ModuleClient;
        **self.get_client()
    }
}
