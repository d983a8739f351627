//! Minimum strength rules for secrets loaded from the environment.
//!
//! Only production-like environments are checked; dev and test accept anything so local
//! setups can run with throwaway values.

const MIN_SECRET_LEN: usize = 16;

const PLACEHOLDER_VALUES: &[&str] = &[
    "changeme", "secret", "password", "default", "dummy", "example", "test", "devkey",
];

const PLACEHOLDER_FRAGMENTS: &[&str] = &[
    "change-me",
    "change_me",
    "replace-me",
    "replace_me",
    "your-secret",
    "your_secret",
    "dev-secret",
    "dev_secret",
    "rzp_test_",
];

pub fn is_production_like(env_name: &str) -> bool {
    matches!(
        env_name.trim().to_ascii_lowercase().as_str(),
        "prod" | "production" | "staging"
    )
}

/// Checks `value` for `key` under `env_name`.
///
/// A missing or blank value only fails when `required_in_prod` is set.
pub fn check_secret(
    env_name: &str,
    key: &str,
    value: Option<&str>,
    required_in_prod: bool,
) -> Result<(), String> {
    if !is_production_like(env_name) {
        return Ok(());
    }

    let secret = value.map(str::trim).unwrap_or_default();
    if secret.is_empty() {
        return if required_in_prod {
            Err(format!("{key} must be set in prod/staging"))
        } else {
            Ok(())
        };
    }

    if secret.len() < MIN_SECRET_LEN {
        return Err(format!(
            "{key} must be at least {MIN_SECRET_LEN} characters in prod/staging"
        ));
    }
    if looks_like_placeholder(secret) {
        return Err(format!(
            "{key} looks like a placeholder or sandbox value; use a live secret"
        ));
    }
    Ok(())
}

fn looks_like_placeholder(secret: &str) -> bool {
    let s = secret.to_ascii_lowercase();
    PLACEHOLDER_VALUES.contains(&s.as_str()) || PLACEHOLDER_FRAGMENTS.iter().any(|f| s.contains(f))
}
