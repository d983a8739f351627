use regex::Regex;
use std::env;
use wanderlust_common::secret_policy;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub env_name: String,

    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,

    pub store: StoreKind,
    pub db_url: String,
    pub db_schema: Option<String>,
    pub listings_seed: Option<String>,

    pub require_internal_secret: bool,
    pub internal_secret: Option<String>,
    pub internal_allowed_callers: Vec<String>,

    pub currency: String,
    pub gateway: Option<GatewayConfig>,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(v) => {
            let v = v.trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        }
        Err(_) => None,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn normalize_db_url(raw: &str) -> String {
    // "postgresql+asyncpg://..." and friends: drop the "+driver" part.
    if let Some(colon) = raw.find(':') {
        let (scheme, rest) = raw.split_at(colon);
        if let Some(plus) = scheme.find('+') {
            return format!("{}{}", &scheme[..plus], rest);
        }
    }
    raw.to_string()
}

fn validate_postgres_url(url: &str) -> Result<(), String> {
    let scheme = url
        .split_once(':')
        .map(|(s, _)| s.trim().to_lowercase())
        .unwrap_or_default();
    match scheme.as_str() {
        "postgres" | "postgresql" => Ok(()),
        _ => Err("BOOKING_DB_URL (or DB_URL) must be a postgres URL".to_string()),
    }
}

fn parse_bool_like(raw: &str) -> Option<bool> {
    let v = raw.trim().to_lowercase();
    if v.is_empty() {
        return None;
    }
    if matches!(v.as_str(), "0" | "false" | "no" | "off") {
        Some(false)
    } else {
        Some(true)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let env_name = env_or("ENV", "dev");
        let prod_like = secret_policy::is_production_like(&env_name);

        let host = env_or("APP_HOST", "0.0.0.0");
        let port: u16 = env_or("APP_PORT", "8090")
            .parse()
            .map_err(|_| "APP_PORT must be a valid u16".to_string())?;

        let max_body_bytes: usize = env_or("BOOKING_MAX_BODY_BYTES", "1048576")
            .parse()
            .map_err(|_| "BOOKING_MAX_BODY_BYTES must be an integer".to_string())?;
        let max_body_bytes = max_body_bytes.clamp(16 * 1024, 10 * 1024 * 1024);

        let store = match env_or("BOOKING_STORE", "postgres").trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => StoreKind::Postgres,
            "memory" => StoreKind::Memory,
            _ => return Err("BOOKING_STORE must be postgres or memory".to_string()),
        };
        if store == StoreKind::Memory && prod_like {
            return Err("BOOKING_STORE=memory is not allowed in prod/staging".to_string());
        }

        let db_raw = env_opt("BOOKING_DB_URL")
            .or_else(|| env_opt("DB_URL"))
            .unwrap_or_else(|| {
                "postgresql://wanderlust:wanderlust@db:5432/wanderlust_booking".to_string()
            });
        let db_url = normalize_db_url(&db_raw);
        if store == StoreKind::Postgres {
            validate_postgres_url(&db_url)?;
        }

        let db_schema = env_opt("DB_SCHEMA");
        if let Some(s) = &db_schema {
            let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").map_err(|e| e.to_string())?;
            if !re.is_match(s) {
                return Err("DB_SCHEMA must match ^[A-Za-z_][A-Za-z0-9_]*$".to_string());
            }
        }

        let listings_seed = env_opt("BOOKING_LISTINGS_SEED");

        let require_internal_secret =
            parse_bool_like(&env_or("BOOKING_REQUIRE_INTERNAL_SECRET", "")).unwrap_or(prod_like);
        if prod_like && !require_internal_secret {
            return Err("BOOKING_REQUIRE_INTERNAL_SECRET must be true in prod/staging".to_string());
        }

        let internal_secret = env_opt("BOOKING_INTERNAL_SECRET");
        if require_internal_secret && internal_secret.is_none() {
            return Err(
                "BOOKING_INTERNAL_SECRET must be set when BOOKING_REQUIRE_INTERNAL_SECRET is enabled"
                    .to_string(),
            );
        }
        secret_policy::check_secret(
            &env_name,
            "BOOKING_INTERNAL_SECRET",
            internal_secret.as_deref(),
            false,
        )?;

        let internal_allowed_callers = parse_csv(&env_or("BOOKING_INTERNAL_ALLOWED_CALLERS", ""))
            .into_iter()
            .map(|v| v.to_ascii_lowercase())
            .collect::<Vec<_>>();

        let currency = env_or("BOOKING_CURRENCY", "INR").trim().to_string();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err("BOOKING_CURRENCY must be a 3-letter uppercase code".to_string());
        }

        let key_id = env_opt("GATEWAY_KEY_ID");
        let key_secret = env_opt("GATEWAY_KEY_SECRET");
        let gateway = match (key_id, key_secret) {
            (Some(key_id), Some(key_secret)) => {
                secret_policy::check_secret(
                    &env_name,
                    "GATEWAY_KEY_SECRET",
                    Some(key_secret.as_str()),
                    true,
                )?;
                let base_url = env_or("GATEWAY_BASE_URL", "https://api.razorpay.com")
                    .trim()
                    .trim_end_matches('/')
                    .to_string();
                if prod_like && !base_url.starts_with("https://") {
                    return Err("GATEWAY_BASE_URL must use https:// in prod/staging".to_string());
                }
                Some(GatewayConfig {
                    base_url,
                    key_id,
                    key_secret,
                })
            }
            (None, None) => None,
            _ => {
                return Err(
                    "GATEWAY_KEY_ID and GATEWAY_KEY_SECRET must be set together".to_string(),
                )
            }
        };

        Ok(Self {
            env_name,
            host,
            port,
            max_body_bytes,
            store,
            db_url,
            db_schema,
            listings_seed,
            require_internal_secret,
            internal_secret,
            internal_allowed_callers,
            currency,
            gateway,
        })
    }
}
