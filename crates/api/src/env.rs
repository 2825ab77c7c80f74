use bizli_booking::PlanTier;
use bizli_common::EnvVars;

pub struct ApiServerEnv {
    pub secret_salt: String,
    pub otp_secret_key: String,
    pub mail_api_key: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    /// Comma-separated emails permitted to hold the admin role.
    pub admin_emails: String,
    pub price_id_basic: String,
    pub price_id_business: String,
    pub price_id_premium: String,
}

impl EnvVars for ApiServerEnv {
    fn load() -> Self {
        Self {
            secret_salt: std::env::var("SECRET_SALT").unwrap(),
            otp_secret_key: std::env::var("OTP_SECRET_KEY").unwrap(),
            mail_api_key: std::env::var("MAIL_API_KEY").unwrap(),
            stripe_secret_key: std::env::var("STRIPE_SECRET_KEY").unwrap(),
            stripe_webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").unwrap(),
            admin_emails: std::env::var("ADMIN_EMAILS").unwrap_or_default(),
            price_id_basic: std::env::var("STRIPE_PRICE_ID_BASIC").unwrap_or_default(),
            price_id_business: std::env::var("STRIPE_PRICE_ID_BUSINESS").unwrap_or_default(),
            price_id_premium: std::env::var("STRIPE_PRICE_ID_PREMIUM").unwrap_or_default(),
        }
    }

    fn get_env_var(&self, key: &str) -> String {
        match key {
            "SECRET_SALT" => self.secret_salt.clone(),
            "OTP_SECRET_KEY" => self.otp_secret_key.clone(),
            "MAIL_API_KEY" => self.mail_api_key.clone(),
            "STRIPE_SECRET_KEY" => self.stripe_secret_key.clone(),
            "STRIPE_WEBHOOK_SECRET" => self.stripe_webhook_secret.clone(),
            "ADMIN_EMAILS" => self.admin_emails.clone(),
            "STRIPE_PRICE_ID_BASIC" => self.price_id_basic.clone(),
            "STRIPE_PRICE_ID_BUSINESS" => self.price_id_business.clone(),
            "STRIPE_PRICE_ID_PREMIUM" => self.price_id_premium.clone(),
            _ => panic!("{} is not set", key),
        }
    }
}

impl ApiServerEnv {
    pub fn admin_email_allowlist(&self) -> Vec<String> {
        self.admin_emails
            .split(',')
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect()
    }

    /// Stripe price id configured for a plan tier, or None for unknown plans
    /// and tiers with no price set up.
    pub fn price_for_plan(&self, plan: &str) -> Option<String> {
        let tier = plan.parse::<PlanTier>().ok()?;
        let price = match tier {
            PlanTier::Basic => &self.price_id_basic,
            PlanTier::Business => &self.price_id_business,
            PlanTier::Premium => &self.price_id_premium,
        };
        if price.is_empty() {
            None
        } else {
            Some(price.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> ApiServerEnv {
        ApiServerEnv {
            secret_salt: "salt".into(),
            otp_secret_key: "otp".into(),
            mail_api_key: "mail".into(),
            stripe_secret_key: "sk_test".into(),
            stripe_webhook_secret: "whsec".into(),
            admin_emails: " Root@Bizli.io, ops@bizli.io ,".into(),
            price_id_basic: "price_basic".into(),
            price_id_business: "price_business".into(),
            price_id_premium: String::new(),
        }
    }

    #[test]
    fn allowlist_is_trimmed_and_lowercased() {
        assert_eq!(env().admin_email_allowlist(), vec!["root@bizli.io", "ops@bizli.io"]);
    }

    #[test]
    fn plan_prices_resolve() {
        let env = env();
        assert_eq!(env.price_for_plan("Basic"), Some("price_basic".into()));
        assert_eq!(env.price_for_plan("business"), Some("price_business".into()));
        // Premium has no price configured.
        assert_eq!(env.price_for_plan("Premium"), None);
        assert_eq!(env.price_for_plan("Unknown"), None);
    }
}
