//! Stored records
//!
//! - `Collection`, `View`: administrative rows plus the view's two watermarks
//! - `Bucket`, `Page`, `PageRelation`: the fragmentation hierarchy
//! - `Member`, `MemberSet`: ingested data and its progress unit

use crate::rdf::Statement;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named stream of members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub cid: i64,
    pub name: String,
    pub definition: Option<String>,
}

/// Progress of the bucketizer for one view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketizationWatermark {
    /// Highest member-set id already bucketized
    pub last_member_set: i64,
    /// Running count of bucket assignments
    pub total: i64,
}

/// Progress of the paginator for one view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationWatermark {
    /// Running count of page assignments
    pub total: i64,
    /// Exclusive upper member row id of the last pagination batch
    pub cursor: i64,
}

/// A fragmented view over a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub vid: i64,
    pub cid: i64,
    pub name: String,
    /// JSON view definition, `None` for an unfragmented view
    pub definition: Option<String>,
    pub bucketization: BucketizationWatermark,
    pub pagination: PaginationWatermark,
}

/// A partition of a view's members
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bucket {
    pub bid: i64,
    pub vid: i64,
    /// `None` for the view's default bucket
    pub key: Option<String>,
    /// Leaf buckets hold members, internal buckets only anchor the hierarchy
    pub leaf: bool,
    /// Last member row id paginated out of this bucket
    pub last_mid: Option<i64>,
}

impl Bucket {
    pub fn is_default(&self) -> bool {
        self.key.is_none()
    }

    /// Human-readable key for log lines
    pub fn display_key(&self) -> &str {
        self.key.as_deref().unwrap_or("(default)")
    }
}

/// A bounded, linkable slice of a bucket's members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub pid: i64,
    pub bid: i64,
    pub vid: i64,
    pub name: String,
    pub root: bool,
    pub open: bool,
    pub assigned: i64,
}

/// Edge constraint between two pages
///
/// All fields empty means a plain continuation edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRelation {
    #[serde(rename = "type")]
    pub relation_type: Option<String>,
    pub path: Option<String>,
    pub value: Option<String>,
}

impl PageRelation {
    /// A plain continuation edge
    pub fn continuation() -> Self {
        Self::default()
    }

    /// A constrained edge over `path`
    pub fn constrained(
        relation_type: impl Into<String>,
        path: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            relation_type: Some(relation_type.into()),
            path: Some(path.into()),
            value: Some(value.into()),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.relation_type.is_none() && self.path.is_none() && self.value.is_none()
    }
}

/// An outgoing relation as seen from the source page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    /// Name of the target page
    pub link: String,
    #[serde(flatten)]
    pub relation: PageRelation,
}

/// One ingestion transaction's worth of members
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberSet {
    pub id: i64,
    pub member_count: i64,
}

/// A stored member
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// Row id, monotonically increasing in ingestion order
    pub mid: i64,
    pub member_id: String,
    pub entity_id: String,
    pub created_at: DateTime<Utc>,
    pub statements: Vec<Statement>,
}

/// A member as handed over by ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    pub member_id: String,
    pub entity_id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

/// Per-view progress counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewStatistics {
    pub collection: String,
    pub view: String,
    pub bucketized: i64,
    pub paginated: i64,
}

/// Per-collection ingestion counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStatistics {
    pub collection: String,
    pub ingested: i64,
}
