//! View claims
//!
//! SQLite has no `SKIP LOCKED`, so a claim is a lease on the view's progress
//! row. Taking a lease is one conditional `UPDATE ... RETURNING`: rows whose
//! lease is held and unexpired are skipped, and the writer lock serializes
//! competing claimers. A lease outlives its tick only if the worker dies, in
//! which case it expires after the configured duration.
//!
//! Claims are taken and released outside the tick transaction so other workers
//! see them immediately.
//!
//! Every claim stamps `last_claimed` with the next value of a per-pipeline
//! sequence. Releasing keeps the stamp, so views take turns even when one of
//! them fails or aborts on every tick.

use crate::storage::database::now_millis;
use crate::storage::error::StorageResult;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::time::Duration;

/// The two fragmentation pipelines, each with its own progress row per view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Bucketization,
    Pagination,
}

impl Pipeline {
    fn stats_table(self) -> &'static str {
        match self {
            Pipeline::Bucketization => "bucketization_stats",
            Pipeline::Pagination => "pagination_stats",
        }
    }

    /// Row predicate over the progress row `s` telling whether work is pending
    fn ready_predicate(self) -> &'static str {
        match self {
            Pipeline::Bucketization => {
                "s.last_member_set < (SELECT COALESCE(MAX(ms.id), 0) FROM member_sets ms
                                      INNER JOIN views v ON v.cid = ms.cid
                                      WHERE v.vid = s.vid)"
            }
            Pipeline::Pagination => {
                "(SELECT bs.total FROM bucketization_stats bs WHERE bs.vid = s.vid) > s.total"
            }
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pipeline::Bucketization => write!(f, "bucketization"),
            Pipeline::Pagination => write!(f, "pagination"),
        }
    }
}

/// A view leased to one worker for one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewClaim {
    pub pipeline: Pipeline,
    pub vid: i64,
    pub worker_id: String,
}

/// Lease one view with pending work for `pipeline`
///
/// Views whose lease is held by another worker and unexpired are skipped; the
/// least recently claimed eligible view is taken first, ties by id.
pub fn claim_view(
    conn: &Connection,
    pipeline: Pipeline,
    worker_id: &str,
    lease: Duration,
) -> StorageResult<Option<ViewClaim>> {
    let now = now_millis();
    let until = now.saturating_add(lease.as_millis().min(i64::MAX as u128) as i64);

    let sql = format!(
        "UPDATE {table} SET claimed_by = ?1, claimed_until = ?2,
                last_claimed = (SELECT COALESCE(MAX(last_claimed), 0) + 1 FROM {table})
         WHERE vid = (
            SELECT s.vid FROM {table} s
            WHERE (s.claimed_by IS NULL OR s.claimed_until < ?3)
              AND {ready}
            ORDER BY s.last_claimed, s.vid
            LIMIT 1)
         RETURNING vid",
        table = pipeline.stats_table(),
        ready = pipeline.ready_predicate(),
    );

    let vid: Option<i64> = conn
        .query_row(&sql, params![worker_id, until, now], |row| row.get(0))
        .optional()?;

    Ok(vid.map(|vid| {
        tracing::debug!(%pipeline, worker = %worker_id, view = vid, "Claimed view");
        ViewClaim {
            pipeline,
            vid,
            worker_id: worker_id.to_string(),
        }
    }))
}

/// Give up a lease; a lease already taken over by another worker is left alone
///
/// `last_claimed` is kept so the view queues behind the others next time.
pub fn release_view(conn: &Connection, claim: &ViewClaim) -> StorageResult<bool> {
    let sql = format!(
        "UPDATE {} SET claimed_by = NULL, claimed_until = NULL
         WHERE vid = ?1 AND claimed_by = ?2",
        claim.pipeline.stats_table()
    );
    let affected = conn.execute(&sql, params![claim.vid, claim.worker_id])?;
    Ok(affected == 1)
}
