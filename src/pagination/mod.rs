//! Bucket pagination worker
//!
//! Each tick claims one view whose bucketized total is ahead of its paginated
//! total and moves a bounded batch of pending members onto pages.

pub mod bucket_paginator;

pub use bucket_paginator::{fill_page_and_create_new_if_needed, paginate_bucket, paginate_view};

use crate::config::{PaginatorConfig, StorageConfig};
use crate::error::EngineError;
use crate::fragmentation::ViewDefinition;
use crate::storage::{claim_view, release_view, Database, Pipeline, StoreTx, ViewClaim};
use crate::worker::{FragmentationWorker, TickOutcome};
use rusqlite::Connection;
use std::time::Duration;
use uuid::Uuid;

/// Paginates bucketized members, one view per tick
pub struct BucketPaginator {
    db: Database,
    worker_id: String,
    batch_size: usize,
    default_page_size: u32,
    lease: Duration,
}

impl BucketPaginator {
    pub fn new(db: Database, batch_size: usize, default_page_size: u32, lease: Duration) -> Self {
        Self {
            db,
            worker_id: format!("paginator-{}", Uuid::new_v4()),
            batch_size,
            default_page_size,
            lease,
        }
    }

    pub fn from_config(db: Database, storage: &StorageConfig, config: &PaginatorConfig) -> Self {
        Self::new(
            db,
            config.member_batch_size,
            config.default_page_size,
            storage.claim_lease(),
        )
    }

    fn paginate(
        &self,
        conn: &mut Connection,
        claim: &ViewClaim,
    ) -> Result<TickOutcome, EngineError> {
        let tx = StoreTx::begin(conn)?;
        let Some(view) = tx.get_view(claim.vid)? else {
            tracing::warn!(worker = %self.worker_id, view = claim.vid, "Claimed view disappeared");
            return Ok(TickOutcome::Aborted);
        };

        let definition =
            ViewDefinition::for_view(&view).map_err(|source| EngineError::Definition {
                view: view.name.clone(),
                source,
            })?;
        let page_size = definition.page_size.unwrap_or(self.default_page_size);

        match paginate_view(&tx, &view, page_size, self.batch_size)? {
            Some(0) => {
                tx.rollback()?;
                Ok(TickOutcome::Idle)
            }
            Some(members) => {
                tx.commit()?;
                tracing::info!(
                    worker = %self.worker_id,
                    view = %view.name,
                    members,
                    page_size,
                    "Paginated members"
                );
                Ok(TickOutcome::Completed { members })
            }
            None => {
                tx.rollback()?;
                Ok(TickOutcome::Aborted)
            }
        }
    }
}

impl FragmentationWorker for BucketPaginator {
    fn name(&self) -> &'static str {
        "paginator"
    }

    fn worker_id(&self) -> &str {
        &self.worker_id
    }

    fn process(&self) -> Result<TickOutcome, EngineError> {
        let mut conn = self.db.connect()?;
        let Some(claim) = claim_view(&conn, Pipeline::Pagination, &self.worker_id, self.lease)?
        else {
            return Ok(TickOutcome::Idle);
        };

        let outcome = self.paginate(&mut conn, &claim);
        if let Err(e) = release_view(&conn, &claim) {
            tracing::warn!(
                worker = %self.worker_id,
                view = claim.vid,
                error = %e,
                "Cannot release view"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucketization::MemberBucketizer;
    use crate::storage::NewMember;
    use chrono::Utc;
    use tempfile::tempdir;

    fn members(count: usize) -> Vec<NewMember> {
        (0..count)
            .map(|i| NewMember {
                member_id: format!("m{}", i),
                entity_id: "http://example.org/e".to_string(),
                created_at: Utc::now(),
                statements: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn test_process_uses_view_page_size() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("ldes.db"));
        db.initialize().unwrap();

        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();
        let collection = tx.create_collection("c", None).unwrap();
        let view = tx
            .create_view(&collection, "v", Some(r#"{"pageSize":2}"#))
            .unwrap();
        tx.store_members(&collection, &members(5)).unwrap();
        tx.commit().unwrap();

        let lease = Duration::from_secs(60);
        let paginator = BucketPaginator::new(db.clone(), 100, 250, lease);
        assert_eq!(paginator.process().unwrap(), TickOutcome::Idle);

        let bucketizer = MemberBucketizer::new(db.clone(), 100, lease);
        assert_eq!(bucketizer.process().unwrap(), TickOutcome::Completed { members: 5 });

        assert_eq!(paginator.process().unwrap(), TickOutcome::Completed { members: 5 });
        assert_eq!(paginator.process().unwrap(), TickOutcome::Idle);

        let tx = StoreTx::begin(&mut conn).unwrap();
        let root = tx.get_page("c", "v", "v").unwrap().unwrap();
        assert_eq!(root.assigned, 2);
        assert!(!root.open);
        let view = tx.get_view(view.vid).unwrap().unwrap();
        assert_eq!(view.pagination.total, 5);
    }

    #[test]
    fn test_default_page_size_applies_without_definition() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("ldes.db"));
        db.initialize().unwrap();

        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();
        let collection = tx.create_collection("c", None).unwrap();
        tx.create_view(&collection, "v", None).unwrap();
        tx.store_members(&collection, &members(4)).unwrap();
        tx.commit().unwrap();

        let lease = Duration::from_secs(60);
        MemberBucketizer::new(db.clone(), 100, lease).process().unwrap();
        let paginator = BucketPaginator::new(db.clone(), 100, 4, lease);
        assert_eq!(paginator.process().unwrap(), TickOutcome::Completed { members: 4 });

        let tx = StoreTx::begin(&mut conn).unwrap();
        let root = tx.get_page("c", "v", "v").unwrap().unwrap();
        assert_eq!(root.assigned, 4);
        assert!(!root.open);
    }
}
