pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::{CapitalPolicy, Config, SyncSettings};
pub use datasource::{HttpVenueReader, MockTrade, MockVenueReader, VenueError, VenueTradeReader};
pub use db::{init_db, Repository};
pub use domain::{
    AgentId, AgentMetrics, Decimal, DeploymentId, Position, PositionStatus, TimeMs, TokenSymbol,
    TradeId,
};
pub use error::{AgentError, SyncError};
pub use orchestration::{LockAcquisition, LockManager, RunOutcome, RunSummary, SyncRunner};
