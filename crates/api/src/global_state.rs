use anyhow::Result;
use reqwest::Client;
use stripe::Client as StripeClient;

use bizli_booking::access::RoleGuard;
use bizli_booking::PostgresClient;
use bizli_common::{EnvVars, ModuleClient};

use crate::ApiServerEnv;

#[derive(Clone)]
pub struct GlobalState {
    pub db: PostgresClient,
    pub http_client: Client,
    pub stripe_client: StripeClient,
    pub guard: RoleGuard,
}

impl GlobalState {
    pub async fn new() -> Result<Self> {
        let env = ApiServerEnv::load();
        let db = PostgresClient::setup_connection().await;
        let http_client = Client::new();
        let stripe_client = StripeClient::new(&env.get_env_var("STRIPE_SECRET_KEY"));
        let guard = RoleGuard::new(env.admin_email_allowlist());

        Ok(Self {
            db,
            http_client,
            stripe_client,
            guard,
        })
    }
}
