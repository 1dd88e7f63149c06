use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::optimizer::SearchConfig;
use crate::types::{CellSize, DEFAULT_CELL_SIZE_FEET};

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub catalog: CatalogConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            catalog: CatalogConfig::from_env(),
            engine: EngineConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "VEHICLE_SEARCH_API_HOST";
    const PORT_VAR: &'static str = "VEHICLE_SEARCH_API_PORT";

    fn from_env() -> Self {
        let default_ip = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let host_value =
            env_string(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (default_ip, Self::DEFAULT_HOST.to_string())
            }
        };

        let port = match env_string(Self::PORT_VAR) {
            Some(raw) => parse_port(&raw).unwrap_or_else(|err| {
                warn!(
                    "⚠️ {} ('{}') {}. Using {}.",
                    Self::PORT_VAR,
                    raw,
                    err,
                    Self::DEFAULT_PORT
                );
                Self::DEFAULT_PORT
            }),
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Location of the listings catalog.
#[derive(Clone, Debug)]
pub struct CatalogConfig {
    listings_path: PathBuf,
}

impl CatalogConfig {
    const DEFAULT_LISTINGS_PATH: &'static str = "listings.json";
    const LISTINGS_PATH_VAR: &'static str = "VEHICLE_SEARCH_LISTINGS_PATH";

    fn from_env() -> Self {
        Self {
            listings_path: env_string(Self::LISTINGS_PATH_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_LISTINGS_PATH)),
        }
    }

    /// Path of the JSON file holding all listings.
    pub fn listings_path(&self) -> &Path {
        &self.listings_path
    }
}

/// Configuration for request validation and the search itself.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    search: SearchConfig,
    max_quantity: u32,
}

impl EngineConfig {
    pub const DEFAULT_MAX_QUANTITY: u32 = 5;

    const CELL_SIZE_VAR: &'static str = "VEHICLE_SEARCH_CELL_SIZE";
    const MAX_QUANTITY_VAR: &'static str = "VEHICLE_SEARCH_MAX_QUANTITY";
    const NODE_BUDGET_VAR: &'static str = "VEHICLE_SEARCH_NODE_BUDGET";
    const TIME_BUDGET_VAR: &'static str = "VEHICLE_SEARCH_TIME_BUDGET_MS";
    const PARALLEL_SITES_VAR: &'static str = "VEHICLE_SEARCH_PARALLEL_SITES";

    fn from_env() -> Self {
        let cell_feet = parse_u64_with_warning(
            Self::CELL_SIZE_VAR,
            env_string(Self::CELL_SIZE_VAR).as_deref(),
            u64::from(DEFAULT_CELL_SIZE_FEET),
            |value| value > 0 && value <= u64::from(u32::MAX),
            "must be a positive 32-bit integer",
            "Warning: Adjusted cell size changes which listings fit which vehicles",
        );
        let cell_size = u32::try_from(cell_feet)
            .ok()
            .and_then(CellSize::new)
            .unwrap_or_default();

        let max_quantity = parse_u64_with_warning(
            Self::MAX_QUANTITY_VAR,
            env_string(Self::MAX_QUANTITY_VAR).as_deref(),
            u64::from(Self::DEFAULT_MAX_QUANTITY),
            |value| value > 0 && value <= u64::from(u32::MAX),
            "must be a positive 32-bit integer",
            "Warning: Raising the quantity cap can make searches exponentially slower",
        );
        let max_quantity = u32::try_from(max_quantity).unwrap_or(Self::DEFAULT_MAX_QUANTITY);

        let max_nodes = parse_optional_positive(
            Self::NODE_BUDGET_VAR,
            env_string(Self::NODE_BUDGET_VAR).as_deref(),
        );
        let time_limit = parse_optional_positive(
            Self::TIME_BUDGET_VAR,
            env_string(Self::TIME_BUDGET_VAR).as_deref(),
        )
        .map(Duration::from_millis);

        let parallel_sites = env_string(Self::PARALLEL_SITES_VAR)
            .and_then(|raw| parse_bool(&raw, Self::PARALLEL_SITES_VAR))
            .unwrap_or(SearchConfig::DEFAULT_PARALLEL_SITES);

        let search = SearchConfig::builder()
            .cell_size(cell_size)
            .max_nodes(max_nodes)
            .time_limit(time_limit)
            .parallel_sites(parallel_sites)
            .build();

        Self {
            search,
            max_quantity,
        }
    }

    /// Returns the configured SearchConfig.
    pub fn search_config(&self) -> SearchConfig {
        self.search
    }

    /// Maximum total number of vehicles per request.
    pub fn max_quantity(&self) -> u32 {
        self.max_quantity
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            max_quantity: Self::DEFAULT_MAX_QUANTITY,
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn parse_port(raw: &str) -> Result<u16, String> {
    match raw.parse::<u16>() {
        Ok(0) => Err("must not be 0".to_string()),
        Ok(value) => Ok(value),
        Err(err) => Err(format!("could not be parsed: {}", err)),
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn parse_u64_with_warning(
    var_name: &str,
    raw: Option<&str>,
    default: u64,
    validator: impl Fn(u64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> u64 {
    match raw {
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(value) if !validator(value) => {
                warn!(
                    "⚠️ {} contains invalid value '{}': {}. Using {}.",
                    var_name, raw, invalid_hint, default
                );
                default
            }
            Ok(value) => {
                if value != default {
                    info!("⚠️ {} ({} = {}).", warning, var_name, value);
                }
                value
            }
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

/// Parses an optional limit; absent or invalid means unlimited.
fn parse_optional_positive(var_name: &str, raw: Option<&str>) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(0) => {
            warn!(
                "⚠️ {} must be greater than 0. Search stays unlimited.",
                var_name
            );
            None
        }
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                "⚠️ Could not parse {} ('{}') as number: {}. Search stays unlimited.",
                var_name, raw, err
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_true_values() {
        assert_eq!(parse_bool("1", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("true", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("yes", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("y", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("on", "TEST_VAR"), Some(true));

        // Test case insensitivity
        assert_eq!(parse_bool("TRUE", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("ON", "TEST_VAR"), Some(true));

        // Test with whitespace
        assert_eq!(parse_bool(" true ", "TEST_VAR"), Some(true));
    }

    #[test]
    fn test_parse_bool_false_values() {
        assert_eq!(parse_bool("0", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("false", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("no", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("n", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("OFF", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("  0  ", "TEST_VAR"), Some(false));
    }

    #[test]
    fn test_parse_bool_invalid_values() {
        assert_eq!(parse_bool("invalid", "TEST_VAR"), None);
        assert_eq!(parse_bool("2", "TEST_VAR"), None);
        assert_eq!(parse_bool("", "TEST_VAR"), None);
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("9000"), Ok(9000));
        assert!(parse_port("0").is_err());
        assert!(parse_port("70000").is_err());
        assert!(parse_port("abc").is_err());
    }

    #[test]
    fn test_parse_u64_with_warning() {
        let positive = |value: u64| value > 0;
        assert_eq!(
            parse_u64_with_warning("TEST_VAR", None, 10, positive, "hint", "warn"),
            10
        );
        assert_eq!(
            parse_u64_with_warning("TEST_VAR", Some("5"), 10, positive, "hint", "warn"),
            5
        );
        assert_eq!(
            parse_u64_with_warning("TEST_VAR", Some("0"), 10, positive, "hint", "warn"),
            10
        );
        assert_eq!(
            parse_u64_with_warning("TEST_VAR", Some("ten"), 10, positive, "hint", "warn"),
            10
        );
    }

    #[test]
    fn test_parse_optional_positive() {
        assert_eq!(parse_optional_positive("TEST_VAR", None), None);
        assert_eq!(parse_optional_positive("TEST_VAR", Some("2500")), Some(2500));
        assert_eq!(parse_optional_positive("TEST_VAR", Some("0")), None);
        assert_eq!(parse_optional_positive("TEST_VAR", Some("-1")), None);
    }

    #[test]
    fn engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_quantity(), 5);
        assert_eq!(config.search_config().cell_size.feet(), 10);
        assert!(config.search_config().budget.max_nodes.is_none());
        assert!(!config.search_config().parallel_sites);
    }
}
