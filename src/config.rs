use std::env;

/// Stripe merchant credentials.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

/// Alipay merchant credentials. Keys are base64-encoded DER
/// (PKCS#8 private key, SPKI public key), matching the format the
/// Alipay open platform hands out.
#[derive(Debug, Clone)]
pub struct AlipayConfig {
    pub app_id: String,
    /// Merchant private key, used to sign outbound requests.
    pub private_key: String,
    /// Alipay platform public key, used to verify async notifications.
    pub alipay_public_key: String,
}

/// WeChat Pay merchant credentials.
#[derive(Debug, Clone)]
pub struct WechatConfig {
    pub mch_id: String,
    pub app_id: String,
    /// Shared secret for the notification transport signature.
    pub platform_secret: String,
    /// 32-byte API v3 key for AES-256-GCM payload decryption.
    pub api_v3_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    /// Base URL for webhook notify / buyer return URLs.
    pub base_url: String,
    pub audit_log_enabled: bool,
    pub audit_log_retention_days: i64,
    pub dev_mode: bool,
    pub stripe: Option<StripeConfig>,
    pub alipay: Option<AlipayConfig>,
    pub wechat: Option<WechatConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("FEATUREGATE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let stripe = match (env::var("STRIPE_SECRET_KEY"), env::var("STRIPE_WEBHOOK_SECRET")) {
            (Ok(secret_key), Ok(webhook_secret)) => Some(StripeConfig {
                secret_key,
                webhook_secret,
            }),
            _ => None,
        };

        let alipay = match (
            env::var("ALIPAY_APP_ID"),
            env::var("ALIPAY_PRIVATE_KEY"),
            env::var("ALIPAY_PUBLIC_KEY"),
        ) {
            (Ok(app_id), Ok(private_key), Ok(alipay_public_key)) => Some(AlipayConfig {
                app_id,
                private_key,
                alipay_public_key,
            }),
            _ => None,
        };

        let wechat = match (
            env::var("WECHAT_MCH_ID"),
            env::var("WECHAT_APP_ID"),
            env::var("WECHAT_PLATFORM_SECRET"),
            env::var("WECHAT_API_V3_KEY"),
        ) {
            (Ok(mch_id), Ok(app_id), Ok(platform_secret), Ok(api_v3_key)) => {
                Some(WechatConfig {
                    mch_id,
                    app_id,
                    platform_secret,
                    api_v3_key,
                })
            }
            _ => None,
        };

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "featuregate.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "featuregate_audit.db".to_string()),
            base_url,
            audit_log_enabled: env::var("AUDIT_LOG_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            audit_log_retention_days: env::var("AUDIT_LOG_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            dev_mode,
            stripe,
            alipay,
            wechat,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
