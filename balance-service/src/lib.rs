//! Balance service: absolute and batch relative account balance updates

pub mod audit;
pub mod config;
pub mod gateway;
pub mod mutator;
pub mod repository;
pub mod service;

pub use audit::{AuditSink, ChannelAuditSink, InMemoryAuditSink, NoopAuditSink, TracingAuditSink};
pub use config::{BalanceServiceConfig, NegativeBalancePolicy};
pub use gateway::{BalanceHistoryRequest, BatchModifyBalanceRequest, ModifyBalanceRequest, MutationGateway};
pub use mutator::BalanceMutator;
pub use repository::{AccountRepository, InMemoryAccountRepository, PostgresAccountRepository};
pub use service::{BalanceService, BatchOutcome, BatchReport, RepositoryType, SkipReason};
