//! Relational store of the fragmentation engine
//!
//! - **database**: connection settings and the per-tick [`StoreTx`]
//! - **schema**: table and index definitions
//! - **collection**, **view**, **member**, **bucket**, **page**: repository
//!   operations, implemented on [`StoreTx`] per entity
//! - **claims**: view leases standing in for `SKIP LOCKED`
//! - **statistics**: progress counters
//! - **types**: stored records
//! - **error**: error types
//!
//! # Example
//!
//! ```rust,no_run
//! use ldes_server::storage::{Database, StoreTx};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new("./data/ldes.db");
//!     db.initialize()?;
//!
//!     let mut conn = db.connect()?;
//!     let tx = StoreTx::begin(&mut conn)?;
//!     let collection = tx.create_collection("sensors", None)?;
//!     tx.create_view(&collection, "by-page", None)?;
//!     tx.commit()?;
//!
//!     Ok(())
//! }
//! ```

mod bucket;
pub mod claims;
mod collection;
pub mod database;
pub mod error;
mod member;
mod page;
mod schema;
mod statistics;
pub mod types;
mod view;

pub use claims::{claim_view, release_view, Pipeline, ViewClaim};
pub use database::{Database, StoreTx};
pub use error::{StorageError, StorageResult};
pub use types::{
    Bucket, BucketizationWatermark, Collection, CollectionStatistics, Member, MemberSet,
    NewMember, Page, PageLink, PageRelation, PaginationWatermark, View, ViewStatistics,
};
