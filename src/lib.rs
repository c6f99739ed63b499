//! # EsoxSolutions.ResourcePool
//!
//! Thread-safe pool for expensive, reusable resources such as connections or
//! sessions, with admission control and pluggable validation.
//!
//! ## Features
//!
//! - Capacity-gated borrowing with timeouts, non-blocking tries and lazy creation
//! - Bounded idle queue disposing whatever does not fit
//! - Background top-up to a minimum number of idle entries
//! - Validation on borrow or return, maximum entry age and background sweeps
//! - Custom borrow/return interceptors
//! - Async borrowing on tokio
//! - Metrics, health status and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_resourcepool::{BoxError, CorePool, NoopValidator, Pool, PoolConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = PoolConfig::new()
//!     .with_max_active_entries(4)
//!     .with_max_wait_on_borrow(Duration::from_secs(1));
//!
//! let pool = CorePool::new(
//!     config,
//!     Arc::new(|| Ok::<_, BoxError>(String::from("connection"))),
//!     Arc::new(NoopValidator),
//! ).unwrap();
//!
//! let entry = pool.borrow().unwrap().unwrap();
//! println!("Got: {}", **entry);
//! // Entries go back explicitly, on every path
//! pool.return_entry(Some(entry)).unwrap();
//! ```

mod async_pool;
mod config;
mod ensure;
mod entry;
mod errors;
mod factory;
mod gate;
mod health;
mod interceptor;
mod metrics;
mod pool;
mod queue;
mod scheduler;
mod sweep;
mod validation;

pub use async_pool::AsyncPoolExt;
pub use config::{PoolConfig, ValidationConfig};
pub use ensure::EnsureLoop;
pub use entry::{Entry, EntryState, NoopValidator, ObjectValidator, PoolEntry};
pub use errors::{BoxError, PoolError, PoolResult};
pub use factory::{EntryFactory, ObjectFactory};
pub use health::HealthStatus;
pub use interceptor::{
    AgeExpiryInterceptor, BorrowContext, OnDemandValidationInterceptor, PoolInterceptor, Verdict,
};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::{CorePool, Pool};
pub use queue::IdleQueue;
pub use sweep::SweepLoop;
pub use validation::ValidatingPool;
