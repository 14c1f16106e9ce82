use std::env;

/// Process-wide configuration, loaded once from the environment after
/// `dotenv()` has run.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub fcm: FcmConfig,
    pub whatsapp: WhatsAppConfig,
    /// Interval between SLA-overdue sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

/// Firebase Cloud Messaging (HTTP v1) settings. The access token is
/// minted out-of-band and handed in via the environment; this server
/// never sees the service-account key material.
#[derive(Clone, Debug)]
pub struct FcmConfig {
    pub api_base: String,
    pub project_id: String,
    pub access_token: String,
}

impl FcmConfig {
    pub fn is_configured(&self) -> bool {
        !self.project_id.is_empty() && !self.access_token.is_empty()
    }
}

/// Twilio WhatsApp gateway settings.
#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

impl WhatsAppConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled
            && !self.account_sid.is_empty()
            && !self.auth_token.is_empty()
            && !self.from_number.is_empty()
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SERVER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{host}:{port}"));

        Self {
            server: ServerConfig {
                host,
                port,
                base_url,
            },
            database_url: env::var("DATABASE_URL").unwrap_or_default(),
            fcm: FcmConfig {
                api_base: env::var("FCM_API_BASE")
                    .unwrap_or_else(|_| "https://fcm.googleapis.com".to_string()),
                project_id: env::var("FCM_PROJECT_ID").unwrap_or_default(),
                access_token: env::var("FCM_ACCESS_TOKEN").unwrap_or_default(),
            },
            whatsapp: WhatsAppConfig {
                enabled: env::var("WHATSAPP_ENABLED")
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
                api_base: env::var("TWILIO_API_BASE")
                    .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
                account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
                auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
                from_number: env::var("TWILIO_WHATSAPP_FROM").unwrap_or_default(),
            },
            sweep_interval_secs: env::var("SLA_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }
}
