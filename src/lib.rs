//! # LDES Server
//!
//! Incremental fragmentation engine for Linked Data Event Streams: members
//! ingested into a collection are grouped into buckets per view and sliced
//! into linked, size-bounded pages that clients can navigate.
//!
//! ## Modules
//!
//! - [`storage`]: SQLite store, repositories and view claims
//! - [`fragmentation`]: time periods, view definitions and the bucketizers
//! - [`bucketization`]: the member bucketizer worker
//! - [`pagination`]: the bucket paginator worker
//! - [`worker`]: the loop both workers run in
//! - [`admin`]: collections, views, ingestion and page reads
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ldes_server::admin::Admin;
//! use ldes_server::storage::Database;
//! use ldes_server::worker::{run_worker, FragmentationWorker};
//! use ldes_server::{BucketPaginator, MemberBucketizer};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new("./data/ldes.db");
//!     db.initialize()?;
//!
//!     let admin = Admin::new(db.clone());
//!     admin.create_collection("sensors")?;
//!     admin.create_view("sensors", "by-page", Some(r#"{"pageSize": 100}"#))?;
//!
//!     let (_shutdown, signal) = tokio::sync::watch::channel(false);
//!     let lease = Duration::from_secs(60);
//!
//!     // one-shot runs: stop once there is nothing left to do
//!     let bucketizer = Arc::new(MemberBucketizer::new(db.clone(), 3000, lease));
//!     run_worker(bucketizer, None, signal.clone()).await;
//!     let paginator = Arc::new(BucketPaginator::new(db, 5000, 250, lease));
//!     run_worker(paginator, None, signal).await;
//!
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod bucketization;
pub mod config;
pub mod error;
pub mod fragmentation;
pub mod logging;
pub mod pagination;
pub mod rdf;
pub mod storage;
pub mod worker;

pub use admin::{Admin, AdminError, AdminResult, PageDocument, Statistics};
pub use bucketization::MemberBucketizer;
pub use config::{
    BucketizerConfig, Config, ConfigError, LoggingConfig, PaginatorConfig, StorageConfig,
};
pub use error::{EngineError, EngineResult};
pub use fragmentation::{
    FragmentationError, FragmentationStrategy, Period, TimeBucket, TimeFragmentation,
    ViewDefinition,
};
pub use pagination::BucketPaginator;
pub use storage::{Database, StorageError, StorageResult, StoreTx};
pub use worker::{run_worker, FragmentationWorker, TickOutcome, WorkerReport};
