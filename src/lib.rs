pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod priority;
pub mod rebalance;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{Address, Decimal, PoolState, PositionInfo, TimeMs, TokenAmounts, TokenInfo};
pub use error::AppError;
pub use gateway::{Gateway, GatewayError, HttpGateway, MockGateway};
pub use notify::{LogNotifier, Notifier, RecordingNotifier, TelegramNotifier};
pub use priority::{FixedFeeEstimator, HeliusFeeEstimator, PriorityFeeEstimator};
pub use rebalance::{RebalanceError, Rebalancer};
