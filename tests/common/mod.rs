#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use whirlpool_rebalancer::engine::{centered_range, TickRange};
use whirlpool_rebalancer::{
    init_db, Address, Config, Decimal, Gateway, MockGateway, PositionInfo, RecordingNotifier,
    Rebalancer, Repository, TimeMs,
};

pub const T0: TimeMs = TimeMs(1_750_000_000_000);

pub fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

pub fn minutes(n: i64) -> TimeMs {
    T0.plus_minutes(n)
}

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = HashMap::new();
    env.insert("GATEWAY_URL".into(), "http://gateway.invalid".into());
    for (k, v) in overrides {
        env.insert(k.to_string(), v.to_string());
    }
    Config::from_env_map(env).unwrap()
}

pub struct Harness {
    pub rebalancer: Rebalancer,
    pub gateway: MockGateway,
    pub repo: Arc<Repository>,
    pub notifier: Arc<RecordingNotifier>,
    pub config: Config,
    _temp: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config(&[])).await
    }

    /// SOL/USDC pool at 100 USDC, wallet holding 10 SOL and 1000 USDC.
    pub async fn with_config(config: Config) -> Self {
        let gateway = MockGateway::new(
            config.token_a(),
            config.token_b(),
            config.tick_spacing,
            d("100"),
        )
        .with_balance(&config.token_a().mint, d("10"))
        .with_balance(&config.token_b().mint, d("1000"));
        Self::with_gateway(config, gateway).await
    }

    pub async fn with_gateway(config: Config, gateway: MockGateway) -> Self {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("test.db").to_string_lossy().to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));
        let notifier = Arc::new(RecordingNotifier::new());

        let rebalancer = Rebalancer::new(
            Arc::new(gateway.clone()),
            repo.clone(),
            notifier.clone(),
            config.clone(),
        );

        Self {
            rebalancer,
            gateway,
            repo,
            notifier,
            config,
            _temp: temp,
        }
    }

    pub fn usdc(&self) -> Address {
        self.config.token_b().mint
    }

    pub fn sol(&self) -> Address {
        self.config.token_a().mint
    }

    /// Range the opener would pick at the current pool tick.
    pub fn centered(&self) -> TickRange {
        let pool = self.gateway.pool();
        centered_range(pool.tick_current, pool.tick_spacing, self.config.range_percent)
    }

    /// Place a position holding roughly `amount_b` USDC (plus the matching
    /// SOL) directly on the mock chain.
    pub async fn seed_position(&self, amount_b: &str) -> Address {
        let pool = self.gateway.pool();
        let range = self.centered();
        let quote = self
            .gateway
            .quote_increase_liquidity(&pool, &self.usdc(), d(amount_b), range, Decimal::zero())
            .await
            .unwrap();
        self.gateway.insert_position(range, quote.liquidity)
    }

    pub async fn position(&self, address: &Address) -> PositionInfo {
        self.gateway
            .get_position(address)
            .await
            .unwrap()
            .expect("position not on the mock chain")
    }

    pub async fn live(&self) -> Vec<PositionInfo> {
        self.gateway.list_owned_positions().await.unwrap()
    }

    /// Seed a position and track it through a sync at `now`.
    pub async fn tracked_position(&self, amount_b: &str, now: TimeMs) -> Address {
        let address = self.seed_position(amount_b).await;
        let live = self.live().await;
        self.rebalancer.sync_positions(&live, now).await.unwrap();
        address
    }
}
