//! Bucketization without a fragmentation strategy
//!
//! Every pending member goes straight to the view's default bucket in one
//! bulk statement; no member row is loaded.

use crate::storage::{StorageResult, StoreTx, View};

/// Assign the view's pending member sets to its default bucket
///
/// Returns the number of members assigned, `Some(0)` when nothing is pending,
/// and `None` when the tick must be abandoned without committing.
pub fn bucketize_view(
    tx: &StoreTx<'_>,
    view: &View,
    batch_size: usize,
) -> StorageResult<Option<usize>> {
    tracing::debug!(view = %view.name, "Getting member sets to bucketize");
    let member_sets = tx.get_bucketizable_member_sets(view, batch_size)?;
    if member_sets.is_empty() {
        return Ok(Some(0));
    }

    let Some(default_bucket) = tx.get_default_bucket(view)? else {
        tracing::warn!(view = %view.name, "Cancelling bucketization: no default bucket");
        return Ok(None);
    };

    let assigned = tx.bulk_assign_members_by_sets(&default_bucket, &member_sets)?;
    if assigned == 0 {
        tracing::warn!(view = %view.name, "Cancelling bucketization: no members assigned");
        return Ok(None);
    }

    if !tx.update_bucketization_watermark(view, &member_sets, assigned)? {
        tracing::warn!(
            view = %view.name,
            "Cancelling bucketization: watermark changed concurrently"
        );
        return Ok(None);
    }

    tracing::debug!(
        view = %view.name,
        member_sets = member_sets.len(),
        members = assigned,
        "Bucketized into default bucket"
    );
    Ok(Some(assigned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, NewMember};
    use chrono::Utc;
    use tempfile::tempdir;

    fn members(ids: &[&str]) -> Vec<NewMember> {
        ids.iter()
            .map(|id| NewMember {
                member_id: id.to_string(),
                entity_id: "http://example.org/e".to_string(),
                created_at: Utc::now(),
                statements: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn test_bucketize_pending_member_sets() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("ldes.db"));
        db.initialize().unwrap();
        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();

        let collection = tx.create_collection("c", None).unwrap();
        let view = tx.create_view(&collection, "v", None).unwrap();
        tx.store_members(&collection, &members(&["a", "b"])).unwrap();
        tx.store_members(&collection, &members(&["c"])).unwrap();

        assert_eq!(bucketize_view(&tx, &view, 100).unwrap(), Some(3));

        let view = tx.get_view(view.vid).unwrap().unwrap();
        assert_eq!(view.bucketization.total, 3);
        assert_eq!(bucketize_view(&tx, &view, 100).unwrap(), Some(0));
    }

    #[test]
    fn test_stale_view_aborts() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("ldes.db"));
        db.initialize().unwrap();
        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();

        let collection = tx.create_collection("c", None).unwrap();
        let stale = tx.create_view(&collection, "v", None).unwrap();
        tx.store_members(&collection, &members(&["a"])).unwrap();
        assert_eq!(bucketize_view(&tx, &stale, 100).unwrap(), Some(1));

        tx.store_members(&collection, &members(&["b"])).unwrap();
        // the watermark moved past the snapshot in `stale`
        assert_eq!(bucketize_view(&tx, &stale, 100).unwrap(), None);
    }
}
