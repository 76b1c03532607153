use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;

/// Address of the Consul agent, `host:port` or a full URL.
pub static CONSUL_ADDR: Lazy<String> =
    Lazy::new(|| env::var("CONSUL_ADDR").unwrap_or_else(|_| "127.0.0.1:8500".to_string()));

/// ACL token sent with every registry request when set.
pub static CONSUL_TOKEN: Lazy<Option<String>> =
    Lazy::new(|| env::var("CONSUL_TOKEN").ok().filter(|t| !t.is_empty()));

/// Scheme the client-side resolver is installed under.
pub static RESOLVER_SCHEME: Lazy<String> =
    Lazy::new(|| env::var("RESOLVER_SCHEME").unwrap_or_else(|_| "consul".to_string()));

/// TTL of the health check attached to every registration.
pub static CHECK_TTL_SECS: Lazy<u64> = Lazy::new(|| env_or("CHECK_TTL_SECS", 15));

/// How often a registered server marks its check as passing.
pub static HEARTBEAT_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| env_or("HEARTBEAT_INTERVAL_SECS", 1));

pub fn init_env() {
    dotenv::dotenv().ok();
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
