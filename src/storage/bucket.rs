//! Bucket rows and pending bucket members
//!
//! `bucket_members` holds the members assigned to a bucket but not paginated
//! yet. Pagination moves rows from there into `page_members`.

use crate::storage::database::{placeholders, StoreTx};
use crate::storage::error::StorageResult;
use crate::storage::types::{Bucket, MemberSet, View};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

fn bucket_from_row(row: &Row<'_>) -> rusqlite::Result<Bucket> {
    Ok(Bucket {
        bid: row.get(0)?,
        vid: row.get(1)?,
        key: row.get(2)?,
        leaf: row.get(3)?,
        last_mid: row.get(4)?,
    })
}

/// Whether the error is a uniqueness/foreign-key conflict rather than an outage
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl StoreTx<'_> {
    /// Create a keyed bucket
    ///
    /// Returns `None` when the key already exists for the view.
    pub fn create_bucket(
        &self,
        view: &View,
        key: &str,
        leaf: bool,
    ) -> StorageResult<Option<Bucket>> {
        match self.conn().execute(
            "INSERT INTO buckets (vid, key, leaf) VALUES (?1, ?2, ?3)",
            params![view.vid, key, leaf],
        ) {
            Ok(_) => Ok(Some(Bucket {
                bid: self.conn().last_insert_rowid(),
                vid: view.vid,
                key: Some(key.to_string()),
                leaf,
                last_mid: None,
            })),
            Err(e) if is_constraint_violation(&e) => {
                tracing::warn!(view = %view.name, bucket = %key, error = %e, "Cannot create bucket");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find a keyed bucket of a view
    pub fn get_bucket(&self, view: &View, key: &str) -> StorageResult<Option<Bucket>> {
        let bucket = self
            .conn()
            .query_row(
                "SELECT bid, vid, key, leaf, last_mid FROM buckets WHERE vid = ?1 AND key = ?2",
                params![view.vid, key],
                bucket_from_row,
            )
            .optional()?;
        Ok(bucket)
    }

    /// The view's default (unkeyed) bucket
    pub fn get_default_bucket(&self, view: &View) -> StorageResult<Option<Bucket>> {
        let bucket = self
            .conn()
            .query_row(
                "SELECT bid, vid, key, leaf, last_mid FROM buckets WHERE vid = ?1 AND key IS NULL",
                params![view.vid],
                bucket_from_row,
            )
            .optional()?;
        Ok(bucket)
    }

    /// Lowest pending member row id of the view, if any member awaits pagination
    pub fn get_first_pending_member(&self, view: &View) -> StorageResult<Option<i64>> {
        let first: Option<i64> = self.conn().query_row(
            "SELECT MIN(mid) FROM bucket_members WHERE vid = ?1",
            params![view.vid],
            |row| row.get(0),
        )?;
        Ok(first)
    }

    /// Buckets holding pending members below the exclusive `bound`
    pub fn get_buckets_ready_for_pagination(
        &self,
        view: &View,
        bound: i64,
    ) -> StorageResult<Vec<Bucket>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT b.bid, b.vid, b.key, b.leaf, b.last_mid FROM buckets b
             WHERE b.bid IN (
                SELECT DISTINCT bm.bid FROM bucket_members bm
                WHERE bm.vid = ?1 AND bm.mid < ?2)
             ORDER BY b.bid",
        )?;
        let buckets = stmt
            .query_map(params![view.vid, bound], bucket_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(buckets)
    }

    /// Assign every member of the given member sets to `bucket`
    ///
    /// Returns the number of assignments made; members already pending in the
    /// bucket are not counted.
    pub fn bulk_assign_members_by_sets(
        &self,
        bucket: &Bucket,
        member_sets: &[MemberSet],
    ) -> StorageResult<usize> {
        if member_sets.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "INSERT OR IGNORE INTO bucket_members (bid, vid, mid)
             SELECT ?, ?, m.mid FROM members m
             WHERE m.member_set IN ({})
             ORDER BY m.member_set, m.mid",
            placeholders(member_sets.len())
        );
        let args = [bucket.bid, bucket.vid]
            .into_iter()
            .chain(member_sets.iter().map(|s| s.id));
        let affected = self.conn().execute(&sql, params_from_iter(args))?;
        Ok(affected)
    }

    /// Assign the given members (by row id) to `bucket`
    ///
    /// Returns the number of assignments made.
    pub fn bulk_assign_members(&self, bucket: &Bucket, mids: &[i64]) -> StorageResult<usize> {
        let mut stmt = self.conn().prepare_cached(
            "INSERT OR IGNORE INTO bucket_members (bid, vid, mid) VALUES (?1, ?2, ?3)",
        )?;

        let mut affected = 0;
        for mid in mids {
            affected += stmt.execute(params![bucket.bid, bucket.vid, mid])?;
        }
        Ok(affected)
    }

    /// Pending member row ids of a bucket below the exclusive `bound`
    pub fn get_members_ready_for_pagination(
        &self,
        bucket: &Bucket,
        bound: i64,
    ) -> StorageResult<Vec<i64>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT mid FROM bucket_members WHERE bid = ?1 AND mid < ?2 ORDER BY mid",
        )?;
        let mids = stmt
            .query_map(params![bucket.bid, bound], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(mids)
    }

    /// Record the last member paginated out of `bucket`
    ///
    /// Fails (returns `false`) when the bucket's cursor moved since it was read.
    pub fn set_last_paginated_member(&self, bucket: &Bucket, last_mid: i64) -> StorageResult<bool> {
        let affected = self.conn().execute(
            "UPDATE buckets SET last_mid = ?1 WHERE bid = ?2 AND last_mid IS ?3",
            params![last_mid, bucket.bid, bucket.last_mid],
        )?;
        Ok(affected == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::NewMember;
    use crate::storage::Database;
    use chrono::Utc;
    use tempfile::tempdir;

    fn member(id: &str) -> NewMember {
        NewMember {
            member_id: id.to_string(),
            entity_id: "http://example.org/e".to_string(),
            created_at: Utc::now(),
            statements: Vec::new(),
        }
    }

    #[test]
    fn test_create_and_get_bucket() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("ldes.db"));
        db.initialize().unwrap();
        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();

        let collection = tx.create_collection("c", None).unwrap();
        let view = tx.create_view(&collection, "v", None).unwrap();

        let created = tx.create_bucket(&view, "[2025 .. 2026]", false).unwrap().unwrap();
        assert!(!created.leaf);
        assert_eq!(tx.get_bucket(&view, "[2025 .. 2026]").unwrap(), Some(created));
        assert!(tx.get_bucket(&view, "[2026 .. 2027]").unwrap().is_none());

        // duplicate key is a conflict, not an error
        assert!(tx.create_bucket(&view, "[2025 .. 2026]", true).unwrap().is_none());
    }

    #[test]
    fn test_bulk_assign_and_pagination_candidates() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("ldes.db"));
        db.initialize().unwrap();
        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();

        let collection = tx.create_collection("c", None).unwrap();
        let view = tx.create_view(&collection, "v", None).unwrap();
        tx.store_members(&collection, &[member("a"), member("b"), member("c")])
            .unwrap();

        let default_bucket = tx.get_default_bucket(&view).unwrap().unwrap();
        let sets = tx.get_bucketizable_member_sets(&view, 10).unwrap();
        assert_eq!(tx.bulk_assign_members_by_sets(&default_bucket, &sets).unwrap(), 3);

        let first = tx.get_first_pending_member(&view).unwrap().unwrap();
        let ready = tx.get_buckets_ready_for_pagination(&view, first + 2).unwrap();
        assert_eq!(ready, vec![default_bucket.clone()]);

        let mids = tx
            .get_members_ready_for_pagination(&default_bucket, first + 2)
            .unwrap();
        assert_eq!(mids, vec![first, first + 1]);
    }

    #[test]
    fn test_last_paginated_member_is_optimistic() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("ldes.db"));
        db.initialize().unwrap();
        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();

        let collection = tx.create_collection("c", None).unwrap();
        let view = tx.create_view(&collection, "v", None).unwrap();
        let bucket = tx.get_default_bucket(&view).unwrap().unwrap();

        assert!(tx.set_last_paginated_member(&bucket, 10).unwrap());
        assert!(!tx.set_last_paginated_member(&bucket, 20).unwrap());

        let bucket = tx.get_default_bucket(&view).unwrap().unwrap();
        assert_eq!(bucket.last_mid, Some(10));
        assert!(tx.set_last_paginated_member(&bucket, 20).unwrap());
    }
}
