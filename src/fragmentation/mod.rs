//! Fragmentation strategies
//!
//! - **period**: time periods and the buckets they compute
//! - **time**: resolving a member to its time bucket paths
//! - **definition**: parsing a view's fragmentation definition
//! - **default_bucketizer**, **time_bucketizer**: one bucketization tick per
//!   strategy
//! - **error**: error types
//!
//! # Example
//!
//! ```rust
//! use ldes_server::fragmentation::Period;
//! use chrono::{TimeZone, Utc};
//!
//! let period: Period = "P3D".parse().unwrap();
//! let at = Utc.with_ymd_and_hms(2025, 8, 9, 18, 5, 9).unwrap();
//! let bucket = period.calculate_bucket(at).unwrap();
//! assert_eq!(bucket.key, "[2025-08-07 .. 2025-08-10]");
//! ```

pub mod default_bucketizer;
pub mod definition;
pub mod error;
pub mod period;
pub mod time;
pub mod time_bucketizer;

pub use definition::{FragmentationStrategy, ViewDefinition};
pub use error::{FragmentationError, FragmentationResult, ResolutionError};
pub use period::{Period, TimeBucket};
pub use time::{TimeBucketPath, TimeFragmentation, GREATER_THAN_OR_EQUAL_TO, LESS_THAN};
