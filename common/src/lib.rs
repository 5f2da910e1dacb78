use env_logger::{Builder, Env};

/// Loads `.env` if present and initialises the logger with a default
/// filter of `info`. `RUST_LOG` overrides the filter.
pub fn setup_env() {
    dotenvy::dotenv().ok();
    Builder::from_env(Env::default().default_filter_or("info")).init();
}

/// Reads an environment variable and parses it, falling back to `default`
/// when the variable is unset or unparsable.
pub fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring unparsable value for {key}: {value}");
            default
        }),
        Err(_) => default,
    }
}

pub fn env_flag(key: &str) -> bool {
    matches!(
        std::env::var(key).as_deref().map(str::trim),
        Ok("1") | Ok("true") | Ok("yes")
    )
}
