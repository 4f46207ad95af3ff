//! idxadv gateway - all traffic between the advisor and the target database
//!
//! This crate owns the only code path that touches the DBMS:
//! - a pooled, read-only session layer over `tokio-postgres`
//! - the explain runner with its mutating-statement refusal and timeout
//!   discipline
//! - typed-null substitution for positional placeholders
//! - catalog lookups for column statistics and table health, fronted by a
//!   TTL cache
//!
//! The public surface is synchronous; a dedicated tokio runtime owned by
//! the gateway drives the async internals.

pub mod backoff;
pub mod gateway;
pub mod placeholders;
pub mod pool;
pub mod session;
pub mod statistics;

pub use backoff::Backoff;
pub use gateway::{DbGateway, PlanSource};
pub use placeholders::substitute_placeholders;
pub use pool::{PoolConfig, PoolStats, PooledSession, SessionPool};
pub use session::{
    DbSession, PgSessionFactory, RawColumnStats, RawTableHealth, SessionFactory, StatementSummary,
};
pub use statistics::{CatalogSource, StatsProvider};
