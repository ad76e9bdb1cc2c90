use crate::domain::{Decimal, TokenInfo};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// USDC mint on mainnet.
pub const USDC_MAINNET_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
/// USDC mint on devnet.
pub const USDC_DEVNET_MINT: &str = "BRjpCHtyQLNCo8gqRUr8jtdAj5AjPYQaoqbvcZiHok1k";

/// Devnet only has the 64-spacing SOL/USDC pool.
const DEVNET_TICK_SPACING: u16 = 64;

#[derive(Debug, Clone)]
pub struct Config {
    pub gateway_url: String,
    pub database_path: String,
    pub is_production: bool,
    pub log_level: String,
    pub tolerance_minutes: i64,
    pub deposit_slippage: Decimal,
    pub swap_slippage: Decimal,
    pub withdraw_slippage: Decimal,
    pub tick_spacing: u16,
    pub range_percent: Decimal,
    pub take_profit_percent: Decimal,
    pub gas_to_save: Decimal,
    pub minimum_deposit_usd: Decimal,
    pub open_position_fee: Decimal,
    pub heartbeat_frequency_minutes: i64,
    pub loop_interval: Duration,
    pub priority_fee_url: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_ids: Vec<i64>,
    pub status_port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue(name.to_string(), reason.into())
}

/// Non-empty value of `name`, if set.
fn get<'a>(env_map: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    env_map
        .get(name)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    name: &str,
    default: T,
    expected: &str,
) -> Result<T, ConfigError> {
    match get(env_map, name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| invalid(name, format!("must be {expected}, got {raw}"))),
        None => Ok(default),
    }
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    name: &str,
    default: &str,
    min: Option<Decimal>,
    max: Option<Decimal>,
) -> Result<Decimal, ConfigError> {
    let raw = get(env_map, name).unwrap_or(default);
    let value = Decimal::from_str_canonical(raw)
        .map_err(|_| invalid(name, format!("must be a decimal number, got {raw}")))?;

    if let Some(min) = min {
        if value < min {
            return Err(invalid(name, format!("must be at least {min}")));
        }
    }
    if let Some(max) = max {
        if value > max {
            return Err(invalid(name, format!("must be at most {max}")));
        }
    }
    Ok(value)
}

fn parse_bool(env_map: &HashMap<String, String>, name: &str) -> Result<bool, ConfigError> {
    match get(env_map, name).map(|s| s.to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(invalid(name, format!("must be true or false, got {other}"))),
        },
    }
}

fn parse_chat_ids(env_map: &HashMap<String, String>) -> Result<Vec<i64>, ConfigError> {
    let Some(raw) = get(env_map, "TELEGRAM_CHAT_IDS") else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| invalid("TELEGRAM_CHAT_IDS", format!("invalid chat id {s}")))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let gateway_url = get(&env_map, "GATEWAY_URL")
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingEnv("GATEWAY_URL".to_string()))?;

        let database_path = get(&env_map, "DATABASE_PATH")
            .unwrap_or("database.sqlite3")
            .to_string();

        let is_production = parse_bool(&env_map, "IS_PRODUCTION")?;
        let log_level = get(&env_map, "LOG_LEVEL").unwrap_or("info").to_string();

        let tolerance_minutes: i64 =
            parse_or(&env_map, "TOLERANCE_IN_MINUTES", 5, "a whole number of minutes")?;
        if tolerance_minutes < 0 {
            return Err(invalid("TOLERANCE_IN_MINUTES", "must not be negative"));
        }

        let zero = Some(Decimal::zero());
        let deposit_slippage = parse_decimal(&env_map, "DEPOSIT_SLIPPAGE", "1", zero, None)?;
        let swap_slippage = parse_decimal(&env_map, "SWAP_SLIPPAGE", "1", zero, None)?;
        let withdraw_slippage = parse_decimal(&env_map, "WITHDRAW_SLIPPAGE", "1", zero, None)?;

        let wanted_tick_spacing: u16 =
            parse_or(&env_map, "WANTED_TICK_SPACING", 4, "a valid u16")?;
        if wanted_tick_spacing == 0 {
            return Err(invalid("WANTED_TICK_SPACING", "must be positive"));
        }
        let tick_spacing = if is_production {
            wanted_tick_spacing
        } else {
            DEVNET_TICK_SPACING
        };

        let range_percent = parse_decimal(&env_map, "RANGE_PERCENT", "10", zero, None)?;
        if !range_percent.is_positive() {
            return Err(invalid("RANGE_PERCENT", "must be positive"));
        }

        let take_profit_percent = parse_decimal(
            &env_map,
            "TAKE_PROFIT_PERCENT",
            "50",
            zero,
            Some(Decimal::hundred()),
        )?;
        let gas_to_save = parse_decimal(&env_map, "GAS_TO_SAVE", "0.01", zero, None)?;
        let minimum_deposit_usd =
            parse_decimal(&env_map, "MINIMUM_AMOUNT_TO_DEPOSIT_DOLLARS", "5", zero, None)?;
        let open_position_fee = parse_decimal(&env_map, "OPEN_POSITION_FEE", "0.015", zero, None)?;

        let heartbeat_frequency_minutes: i64 = parse_or(
            &env_map,
            "HEARTBEAT_FREQUENCY_MINUTES",
            60,
            "a whole number of minutes",
        )?;
        if heartbeat_frequency_minutes <= 0 {
            return Err(invalid("HEARTBEAT_FREQUENCY_MINUTES", "must be positive"));
        }

        let loop_interval_seconds: u64 =
            parse_or(&env_map, "LOOP_INTERVAL_SECONDS", 60, "a whole number of seconds")?;
        if loop_interval_seconds == 0 {
            return Err(invalid("LOOP_INTERVAL_SECONDS", "must be positive"));
        }

        let status_port = match get(&env_map, "STATUS_PORT") {
            Some(raw) => Some(
                raw.parse::<u16>()
                    .map_err(|_| invalid("STATUS_PORT", "must be a valid u16"))?,
            ),
            None => None,
        };

        Ok(Config {
            gateway_url,
            database_path,
            is_production,
            log_level,
            tolerance_minutes,
            deposit_slippage,
            swap_slippage,
            withdraw_slippage,
            tick_spacing,
            range_percent,
            take_profit_percent,
            gas_to_save,
            minimum_deposit_usd,
            open_position_fee,
            heartbeat_frequency_minutes,
            loop_interval: Duration::from_secs(loop_interval_seconds),
            priority_fee_url: get(&env_map, "PRIORITY_FEE_URL").map(str::to_string),
            telegram_bot_token: get(&env_map, "TELEGRAM_BOT_TOKEN").map(str::to_string),
            telegram_chat_ids: parse_chat_ids(&env_map)?,
            status_port,
        })
    }

    /// Leg A: native SOL.
    pub fn token_a(&self) -> TokenInfo {
        TokenInfo::sol()
    }

    /// Leg B: USDC for the configured cluster.
    pub fn token_b(&self) -> TokenInfo {
        let mint = if self.is_production {
            USDC_MAINNET_MINT
        } else {
            USDC_DEVNET_MINT
        };
        TokenInfo::new(mint, 6, "USDC")
    }

    pub fn take_profit_fraction(&self) -> Decimal {
        self.take_profit_percent.percent_to_fraction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(
            "GATEWAY_URL".to_string(),
            "http://127.0.0.1:9000".to_string(),
        );
        map
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.database_path, "database.sqlite3");
        assert!(!config.is_production);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.tolerance_minutes, 5);
        assert_eq!(config.deposit_slippage, d("1"));
        assert_eq!(config.swap_slippage, d("1"));
        assert_eq!(config.withdraw_slippage, d("1"));
        assert_eq!(config.range_percent, d("10"));
        assert_eq!(config.take_profit_fraction(), d("0.5"));
        assert_eq!(config.gas_to_save, d("0.01"));
        assert_eq!(config.minimum_deposit_usd, d("5"));
        assert_eq!(config.open_position_fee, d("0.015"));
        assert_eq!(config.heartbeat_frequency_minutes, 60);
        assert_eq!(config.loop_interval, Duration::from_secs(60));
        assert!(config.telegram_bot_token.is_none());
        assert!(config.status_port.is_none());
    }

    #[test]
    fn test_missing_gateway_url() {
        let result = Config::from_env_map(HashMap::new());
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "GATEWAY_URL"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_devnet_ignores_wanted_tick_spacing() {
        let mut env_map = setup_required_env();
        env_map.insert("WANTED_TICK_SPACING".to_string(), "8".to_string());
        let config = Config::from_env_map(env_map.clone()).unwrap();
        assert_eq!(config.tick_spacing, 64);
        assert_eq!(config.token_b().mint.as_str(), USDC_DEVNET_MINT);

        env_map.insert("IS_PRODUCTION".to_string(), "true".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.tick_spacing, 8);
        assert_eq!(config.token_b().mint.as_str(), USDC_MAINNET_MINT);
    }

    #[test]
    fn test_invalid_take_profit() {
        let mut env_map = setup_required_env();
        env_map.insert("TAKE_PROFIT_PERCENT".to_string(), "150".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "TAKE_PROFIT_PERCENT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_tolerance() {
        let mut env_map = setup_required_env();
        env_map.insert("TOLERANCE_IN_MINUTES".to_string(), "soon".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "TOLERANCE_IN_MINUTES"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_production_flag() {
        let mut env_map = setup_required_env();
        env_map.insert("IS_PRODUCTION".to_string(), "maybe".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "IS_PRODUCTION"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_chat_ids_parsed() {
        let mut env_map = setup_required_env();
        env_map.insert("TELEGRAM_CHAT_IDS".to_string(), "12, -34,,56".to_string());
        let config = Config::from_env_map(env_map.clone()).unwrap();
        assert_eq!(config.telegram_chat_ids, vec![12, -34, 56]);

        env_map.insert("TELEGRAM_CHAT_IDS".to_string(), "12,abc".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(_, _))
        ));
    }

    #[test]
    fn test_zero_range_rejected() {
        let mut env_map = setup_required_env();
        env_map.insert("RANGE_PERCENT".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(_, _))
        ));
    }
}
