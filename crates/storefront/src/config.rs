//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `PI_API_KEY` - Server-held Pi Network API key
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `PI_NETWORK` - `mainnet`, `testnet` or `sandbox` (default: testnet). The legacy
//!   names `NEXT_PUBLIC_PI_NETWORK` and `NEXT_PUBLIC_PI_ENV` are honoured as fallbacks.
//! - `PI_API_BASE_URL` - Override the Pi API base URL chosen from `PI_NETWORK`
//! - `PI_IDENTITY_TIMEOUT_SECS` - Identity provider timeout (default: 5)
//! - `PI_PAYMENT_TIMEOUT_SECS` - Payment relay timeout (default: 30)
//! - `IDENTITY_CACHE_TTL_SECS` - Verified identity cache TTL, 0 disables (default: 60)
//! - `SELLER_USERNAMES` - Comma-separated usernames treated as sellers
//! - `SELLER_WALLETS` - Comma-separated wallet addresses treated as sellers
//! - `PI_BROWSER_ONLY` - Restrict navigation to the Pi Browser
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Pi platform API used for production (mainnet) apps.
pub const PRODUCTION_API_BASE: &str = "https://api.minepi.com/v2";
/// Pi platform API used for sandbox and testnet apps.
pub const SANDBOX_API_BASE: &str = "https://api.sandbox.minepi.com/v2";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Pi Network platform API configuration
    pub pi: PiConfig,
    /// Auth guard identity verification settings
    pub identity: IdentityConfig,
    /// Fallback seller allow-lists
    pub sellers: SellerAllowList,
    /// Whether non-API navigation is restricted to the Pi Browser
    pub pi_browser_only: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Which Pi network the app is deployed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiNetwork {
    Mainnet,
    Testnet,
    Sandbox,
}

impl PiNetwork {
    /// Parse a network flag value.
    ///
    /// # Errors
    ///
    /// Returns the unrecognised value.
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_lowercase().as_str() {
            "mainnet" | "production" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "sandbox" | "development" => Ok(Self::Sandbox),
            other => Err(format!("unknown Pi network '{other}'")),
        }
    }

    /// Default platform API base URL for this network.
    #[must_use]
    pub const fn default_api_base(&self) -> &'static str {
        match self {
            Self::Mainnet => PRODUCTION_API_BASE,
            Self::Testnet | Self::Sandbox => SANDBOX_API_BASE,
        }
    }
}

/// Pi Network platform API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct PiConfig {
    /// Network the app is deployed on
    pub network: PiNetwork,
    /// Base URL for `/me` and `/payments` (no trailing slash)
    pub api_base_url: String,
    /// Server API key, sent as `Authorization: Key <key>`
    pub api_key: SecretString,
    /// Upper bound on each payment relay call
    pub payment_timeout: Duration,
}

impl std::fmt::Debug for PiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiConfig")
            .field("network", &self.network)
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &"[REDACTED]")
            .field("payment_timeout", &self.payment_timeout)
            .finish()
    }
}

/// Identity verification settings for the auth guard.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Upper bound on the identity provider call
    pub timeout: Duration,
    /// How long a verified identity stays cached; zero disables caching
    pub cache_ttl: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Usernames and wallets treated as sellers before they have a stored role.
///
/// Entries are normalised on construction: usernames lowercased, wallets
/// uppercased, both trimmed.
#[derive(Debug, Clone, Default)]
pub struct SellerAllowList {
    usernames: HashSet<String>,
    wallets: HashSet<String>,
}

impl SellerAllowList {
    /// Build an allow-list from raw entries.
    pub fn new<U, W>(usernames: U, wallets: W) -> Self
    where
        U: IntoIterator,
        U::Item: AsRef<str>,
        W: IntoIterator,
        W::Item: AsRef<str>,
    {
        Self {
            usernames: usernames
                .into_iter()
                .map(|u| u.as_ref().trim().to_lowercase())
                .filter(|u| !u.is_empty())
                .collect(),
            wallets: wallets
                .into_iter()
                .map(|w| w.as_ref().trim().to_uppercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Parse the comma-separated form used in the environment.
    #[must_use]
    pub fn from_csv(usernames: Option<&str>, wallets: Option<&str>) -> Self {
        Self::new(
            usernames.unwrap_or_default().split(','),
            wallets.unwrap_or_default().split(','),
        )
    }

    /// Whether an already-normalised username is listed.
    #[must_use]
    pub fn contains_username(&self, normalized: &str) -> bool {
        self.usernames.contains(normalized)
    }

    /// Whether an already-normalised wallet address is listed.
    #[must_use]
    pub fn contains_wallet(&self, normalized: &str) -> bool {
        self.wallets.contains(normalized)
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the Pi API key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("STOREFRONT_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_PORT".to_string(), e.to_string())
            })?;

        let pi = PiConfig::from_env()?;
        let identity = IdentityConfig {
            timeout: get_duration_secs("PI_IDENTITY_TIMEOUT_SECS", 5)?,
            cache_ttl: get_duration_secs("IDENTITY_CACHE_TTL_SECS", 60)?,
        };
        let sellers = SellerAllowList::from_csv(
            get_optional_env("SELLER_USERNAMES").as_deref(),
            get_optional_env("SELLER_WALLETS").as_deref(),
        );
        let pi_browser_only = get_optional_env("PI_BROWSER_ONLY")
            .is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes"));

        Ok(Self {
            database_url,
            host,
            port,
            pi,
            identity,
            sellers,
            pi_browser_only,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// The storefront database URL alone, for tools that need nothing else.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if neither `STOREFRONT_DATABASE_URL`
/// nor `DATABASE_URL` is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    let _ = dotenvy::dotenv();
    get_database_url("STOREFRONT_DATABASE_URL")
}

impl PiConfig {
    /// Load the Pi platform configuration on its own.
    ///
    /// Shared with the CLI, which talks to the payments API without running
    /// the server.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `PI_API_KEY` is missing or weak, or if the
    /// network flag or base URL override is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let network = resolve_network(
            get_optional_env("PI_NETWORK").as_deref(),
            get_optional_env("NEXT_PUBLIC_PI_NETWORK").as_deref(),
            get_optional_env("NEXT_PUBLIC_PI_ENV").as_deref(),
        )?;

        let api_base_url = match get_optional_env("PI_API_BASE_URL") {
            Some(raw) => normalize_base_url(&raw)
                .map_err(|e| ConfigError::InvalidEnvVar("PI_API_BASE_URL".to_string(), e))?,
            None => network.default_api_base().to_string(),
        };

        Ok(Self {
            network,
            api_base_url,
            api_key: get_validated_secret("PI_API_KEY")?,
            payment_timeout: get_duration_secs("PI_PAYMENT_TIMEOUT_SECS", 30)?,
        })
    }

    /// Build a configuration pointing at an explicit base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `api_base_url` is not an absolute URL.
    pub fn with_base_url(
        network: PiNetwork,
        api_base_url: &str,
        api_key: SecretString,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            network,
            api_base_url: normalize_base_url(api_base_url)
                .map_err(|e| ConfigError::InvalidEnvVar("PI_API_BASE_URL".to_string(), e))?,
            api_key,
            payment_timeout: Duration::from_secs(30),
        })
    }

    /// The API key, for building the `Authorization: Key` header.
    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Pick the Pi network from the unified flag, falling back to the two legacy
/// variable names in order.
fn resolve_network(
    primary: Option<&str>,
    legacy_network: Option<&str>,
    legacy_env: Option<&str>,
) -> Result<PiNetwork, ConfigError> {
    let (key, value) = match (primary, legacy_network, legacy_env) {
        (Some(v), _, _) => ("PI_NETWORK", v),
        (None, Some(v), _) => {
            tracing::warn!("NEXT_PUBLIC_PI_NETWORK is deprecated, set PI_NETWORK instead");
            ("NEXT_PUBLIC_PI_NETWORK", v)
        }
        (None, None, Some(v)) => {
            tracing::warn!("NEXT_PUBLIC_PI_ENV is deprecated, set PI_NETWORK instead");
            ("NEXT_PUBLIC_PI_ENV", v)
        }
        (None, None, None) => return Ok(PiNetwork::Testnet),
    };

    PiNetwork::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e))
}

/// Validate an absolute base URL and strip any trailing slash.
fn normalize_base_url(raw: &str) -> Result<String, String> {
    let url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a whole number of seconds as a `Duration`.
fn get_duration_secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    get_optional_env(key).map_or(Ok(Duration::from_secs(default)), |raw| {
        raw.trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Copy the key from the Pi developer portal."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-pi-api-key", "PI_API_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "PI_API_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("q8vz2kfn0w7hxt4mprl9bdyc5e1gjs3a", "PI_API_KEY");
        assert!(result.is_ok());
    }

    #[test]
    fn test_unified_network_flag_wins() {
        let network = resolve_network(Some("mainnet"), Some("sandbox"), Some("sandbox")).unwrap();
        assert_eq!(network, PiNetwork::Mainnet);
    }

    #[test]
    fn test_legacy_network_flags_in_order() {
        assert_eq!(
            resolve_network(None, Some("production"), Some("sandbox")).unwrap(),
            PiNetwork::Mainnet
        );
        assert_eq!(
            resolve_network(None, None, Some("sandbox")).unwrap(),
            PiNetwork::Sandbox
        );
        assert_eq!(resolve_network(None, None, None).unwrap(), PiNetwork::Testnet);
    }

    #[test]
    fn test_unknown_network_is_rejected() {
        let result = resolve_network(Some("moonnet"), None, None);
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(key, _)) if key == "PI_NETWORK"));
    }

    #[test]
    fn test_network_selects_base_url() {
        assert_eq!(PiNetwork::Mainnet.default_api_base(), PRODUCTION_API_BASE);
        assert_eq!(PiNetwork::Sandbox.default_api_base(), SANDBOX_API_BASE);
    }

    #[test]
    fn test_base_url_trailing_slash_is_stripped() {
        assert_eq!(
            normalize_base_url("http://127.0.0.1:9000/v2/").unwrap(),
            "http://127.0.0.1:9000/v2"
        );
        assert!(normalize_base_url("ftp://pi.example").is_err());
        assert!(normalize_base_url("not a url").is_err());
    }

    #[test]
    fn test_allow_list_normalizes_entries() {
        let list = SellerAllowList::from_csv(Some(" Alice ,BOB,"), Some("gabc, gdef "));
        assert!(list.contains_username("alice"));
        assert!(list.contains_username("bob"));
        assert!(!list.contains_username(""));
        assert!(list.contains_wallet("GABC"));
        assert!(list.contains_wallet("GDEF"));
    }

    #[test]
    fn test_socket_addr() {
        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            pi: PiConfig::with_base_url(
                PiNetwork::Testnet,
                "http://localhost:9000",
                SecretString::from("key"),
            )
            .unwrap(),
            identity: IdentityConfig::default(),
            sellers: SellerAllowList::default(),
            pi_browser_only: false,
            sentry_dsn: None,
            sentry_environment: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_pi_config_debug_redacts_key() {
        let config = PiConfig::with_base_url(
            PiNetwork::Mainnet,
            PRODUCTION_API_BASE,
            SecretString::from("super_secret_pi_key"),
        )
        .unwrap();

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("api.minepi.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_pi_key"));
    }
}
