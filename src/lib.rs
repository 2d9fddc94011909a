//! # polystore
//!
//! Uniform key-value storage over heterogeneous backends, with a bounded
//! concurrent pool of store handles at its core.
//!
//! ## Features
//!
//! - One [`Store`] contract shared by every backend adapter and decorator
//! - Thread-safe store pooling: creation on demand up to `max`, a warm
//!   minimum, strict first-come-first-served waiting and bounded-wait
//!   timeouts
//! - Background reaping of stores left idle past a TTL, without busy-looping
//! - Graceful (`stop`) and immediate (`kill`) shutdown
//! - Automatic check-in of borrowed handles via RAII ([`PooledStore`])
//! - Async check-out support on top of the blocking pool
//! - Value expiration decorator ([`Expires`])
//! - Pool statistics with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use polystore::adapters::Memory;
//! use polystore::{Pool, PoolConfig, Store};
//!
//! # fn main() -> polystore::Result<()> {
//! let mut pool = Pool::new(Memory::new(), PoolConfig::new().with_max(4))?;
//!
//! pool.store("greeting", b"hello")?;
//! assert_eq!(pool.load("greeting")?, Some(b"hello".to_vec()));
//!
//! pool.close()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod errors;
mod expires;
mod manager;
mod metrics;
mod pool;
mod store;

pub mod adapters;

pub use config::PoolConfig;
pub use errors::{Error, Result};
pub use expires::Expires;
pub use manager::{PoolManager, PooledStore};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolStats;
pub use pool::Pool;
pub use store::{Builder, Store};
