//! Member bucketization worker
//!
//! Each tick claims one view with member sets beyond its bucketization
//! watermark, dispatches on the view's fragmentation strategy and commits only
//! if the strategy reports success.

use crate::config::{BucketizerConfig, StorageConfig};
use crate::error::EngineError;
use crate::fragmentation::{
    default_bucketizer, time_bucketizer, FragmentationStrategy, ViewDefinition,
};
use crate::storage::{claim_view, release_view, Database, Pipeline, StoreTx, ViewClaim};
use crate::worker::{FragmentationWorker, TickOutcome};
use rusqlite::Connection;
use std::time::Duration;
use uuid::Uuid;

/// Bucketizes pending members, one view per tick
pub struct MemberBucketizer {
    db: Database,
    worker_id: String,
    batch_size: usize,
    lease: Duration,
}

impl MemberBucketizer {
    pub fn new(db: Database, batch_size: usize, lease: Duration) -> Self {
        Self {
            db,
            worker_id: format!("bucketizer-{}", Uuid::new_v4()),
            batch_size,
            lease,
        }
    }

    pub fn from_config(db: Database, storage: &StorageConfig, config: &BucketizerConfig) -> Self {
        Self::new(db, config.member_batch_size, storage.claim_lease())
    }

    /// Bucketize the claimed view inside one transaction
    fn bucketize(
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

        tracing::debug!(
            worker = %self.worker_id,
            view = %view.name,
            strategy = definition.strategy.name(),
            "Bucketizing view"
        );

        let result = match &definition.strategy {
            FragmentationStrategy::Default => {
                default_bucketizer::bucketize_view(&tx, &view, self.batch_size)?
            }
            FragmentationStrategy::Time(time) => {
                time_bucketizer::bucketize_view(&tx, &view, time, self.batch_size)?
            }
        };

        match result {
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
                    "Bucketized members"
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

impl FragmentationWorker for MemberBucketizer {
    fn name(&self) -> &'static str {
        "bucketizer"
    }

    fn worker_id(&self) -> &str {
        &self.worker_id
    }

    fn process(&self) -> Result<TickOutcome, EngineError> {
        let mut conn = self.db.connect()?;
        let Some(claim) = claim_view(&conn, Pipeline::Bucketization, &self.worker_id, self.lease)?
        else {
            return Ok(TickOutcome::Idle);
        };

        let outcome = self.bucketize(&mut conn, &claim);
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
