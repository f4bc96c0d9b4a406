//! View rows and their watermarks
//!
//! A view is created together with its default bucket, that bucket's root page
//! and both progress rows. Afterwards only the watermark updates touch it, each
//! guarded by an optimistic check on the value read at the start of the tick.

use crate::storage::database::{now_millis, StoreTx};
use crate::storage::error::StorageResult;
use crate::storage::types::{
    BucketizationWatermark, Collection, MemberSet, PaginationWatermark, View,
};
use rusqlite::{params, OptionalExtension, Row};

const SELECT_VIEW: &str = "SELECT v.vid, v.cid, v.name, v.definition,
        bs.last_member_set, bs.total, ps.total, ps.cursor
     FROM views v
     INNER JOIN bucketization_stats bs ON bs.vid = v.vid
     INNER JOIN pagination_stats ps ON ps.vid = v.vid";

fn view_from_row(row: &Row<'_>) -> rusqlite::Result<View> {
    Ok(View {
        vid: row.get(0)?,
        cid: row.get(1)?,
        name: row.get(2)?,
        definition: row.get(3)?,
        bucketization: BucketizationWatermark {
            last_member_set: row.get(4)?,
            total: row.get(5)?,
        },
        pagination: PaginationWatermark {
            total: row.get(6)?,
            cursor: row.get(7)?,
        },
    })
}

impl StoreTx<'_> {
    /// Create a view with its default bucket and root page
    ///
    /// The default bucket's root page is named after the view.
    pub fn create_view(
        &self,
        collection: &Collection,
        name: &str,
        definition: Option<&str>,
    ) -> StorageResult<View> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO views (cid, name, definition) VALUES (?1, ?2, ?3)",
            params![collection.cid, name, definition],
        )?;
        let vid = conn.last_insert_rowid();

        conn.execute(
            "INSERT INTO bucketization_stats (vid) VALUES (?1)",
            params![vid],
        )?;
        conn.execute("INSERT INTO pagination_stats (vid) VALUES (?1)", params![vid])?;

        conn.execute(
            "INSERT INTO buckets (vid, key, leaf) VALUES (?1, NULL, 1)",
            params![vid],
        )?;
        let bid = conn.last_insert_rowid();

        conn.execute(
            "INSERT INTO pages (bid, vid, name, root, open, assigned, updated_at)
             VALUES (?1, ?2, ?3, 1, 1, 0, ?4)",
            params![bid, vid, name, now_millis()],
        )?;

        tracing::debug!(collection = %collection.name, view = %name, "Created view");
        Ok(View {
            vid,
            cid: collection.cid,
            name: name.to_string(),
            definition: definition.map(str::to_string),
            bucketization: BucketizationWatermark::default(),
            pagination: PaginationWatermark::default(),
        })
    }

    /// Load a view with its current watermarks
    pub fn get_view(&self, vid: i64) -> StorageResult<Option<View>> {
        let view = self
            .conn()
            .query_row(
                &format!("{} WHERE v.vid = ?1", SELECT_VIEW),
                params![vid],
                view_from_row,
            )
            .optional()?;
        Ok(view)
    }

    /// Find a view of a collection by name
    pub fn get_collection_view(
        &self,
        collection: &Collection,
        name: &str,
    ) -> StorageResult<Option<View>> {
        let view = self
            .conn()
            .query_row(
                &format!("{} WHERE v.cid = ?1 AND v.name = ?2", SELECT_VIEW),
                params![collection.cid, name],
                view_from_row,
            )
            .optional()?;
        Ok(view)
    }

    /// All views of a collection, by creation order
    pub fn get_collection_views(&self, collection: &Collection) -> StorageResult<Vec<View>> {
        let mut stmt = self
            .conn()
            .prepare_cached(&format!("{} WHERE v.cid = ?1 ORDER BY v.vid", SELECT_VIEW))?;
        let views = stmt
            .query_map(params![collection.cid], view_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(views)
    }

    /// Advance the bucketization watermark past `member_sets`
    ///
    /// Fails (returns `false`) when the watermark moved since `view` was read.
    pub fn update_bucketization_watermark(
        &self,
        view: &View,
        member_sets: &[MemberSet],
        bucketized: usize,
    ) -> StorageResult<bool> {
        let Some(last) = member_sets.iter().map(|s| s.id).max() else {
            return Ok(false);
        };

        let affected = self.conn().execute(
            "UPDATE bucketization_stats
             SET last_member_set = ?1, total = total + ?2
             WHERE vid = ?3 AND last_member_set = ?4 AND total = ?5",
            params![
                last,
                bucketized as i64,
                view.vid,
                view.bucketization.last_member_set,
                view.bucketization.total,
            ],
        )?;
        Ok(affected == 1)
    }

    /// Advance the pagination watermark
    ///
    /// Fails (returns `false`) when the watermark moved since `view` was read.
    pub fn update_pagination_watermark(
        &self,
        view: &View,
        cursor: i64,
        paginated: usize,
    ) -> StorageResult<bool> {
        let affected = self.conn().execute(
            "UPDATE pagination_stats
             SET total = total + ?1, cursor = ?2
             WHERE vid = ?3 AND total = ?4 AND cursor = ?5",
            params![
                paginated as i64,
                cursor,
                view.vid,
                view.pagination.total,
                view.pagination.cursor,
            ],
        )?;
        Ok(affected == 1)
    }

    /// Delete a view and everything fragmented for it
    pub fn delete_view(&self, view: &View) -> StorageResult<bool> {
        let conn = self.conn();
        let vid = view.vid;
        conn.execute("DELETE FROM page_relations WHERE vid = ?1", params![vid])?;
        conn.execute("DELETE FROM page_members WHERE vid = ?1", params![vid])?;
        conn.execute("DELETE FROM pages WHERE vid = ?1", params![vid])?;
        conn.execute("DELETE FROM bucket_members WHERE vid = ?1", params![vid])?;
        conn.execute("DELETE FROM buckets WHERE vid = ?1", params![vid])?;
        conn.execute("DELETE FROM bucketization_stats WHERE vid = ?1", params![vid])?;
        conn.execute("DELETE FROM pagination_stats WHERE vid = ?1", params![vid])?;
        let affected = conn.execute("DELETE FROM views WHERE vid = ?1", params![vid])?;
        Ok(affected == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("ldes.db"));
        db.initialize().unwrap();
        (dir, db)
    }

    #[test]
    fn test_create_view_materializes_default_bucket() {
        let (_dir, db) = setup();
        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();

        let collection = tx.create_collection("sensors", None).unwrap();
        let view = tx.create_view(&collection, "by-time", None).unwrap();

        let bucket = tx.get_default_bucket(&view).unwrap().unwrap();
        assert!(bucket.is_default());

        let root = tx.get_root_page(&bucket).unwrap().unwrap();
        assert_eq!(root.name, "by-time");
        assert!(root.open);
        assert_eq!(root.assigned, 0);

        let loaded = tx.get_view(view.vid).unwrap().unwrap();
        assert_eq!(loaded, view);
    }

    #[test]
    fn test_bucketization_watermark_is_optimistic() {
        let (_dir, db) = setup();
        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();

        let collection = tx.create_collection("sensors", None).unwrap();
        let view = tx.create_view(&collection, "v", None).unwrap();
        let sets = [
            MemberSet { id: 3, member_count: 2 },
            MemberSet { id: 5, member_count: 1 },
        ];

        assert!(tx.update_bucketization_watermark(&view, &sets, 3).unwrap());
        // same stale snapshot again: lost the optimistic check
        assert!(!tx.update_bucketization_watermark(&view, &sets, 3).unwrap());

        let reloaded = tx.get_view(view.vid).unwrap().unwrap();
        assert_eq!(reloaded.bucketization.last_member_set, 5);
        assert_eq!(reloaded.bucketization.total, 3);
    }

    #[test]
    fn test_pagination_watermark_is_optimistic() {
        let (_dir, db) = setup();
        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();

        let collection = tx.create_collection("sensors", None).unwrap();
        let view = tx.create_view(&collection, "v", None).unwrap();

        assert!(tx.update_pagination_watermark(&view, 42, 7).unwrap());
        assert!(!tx.update_pagination_watermark(&view, 42, 7).unwrap());

        let reloaded = tx.get_view(view.vid).unwrap().unwrap();
        assert_eq!(reloaded.pagination.total, 7);
        assert_eq!(reloaded.pagination.cursor, 42);
    }

    #[test]
    fn test_delete_view() {
        let (_dir, db) = setup();
        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();

        let collection = tx.create_collection("sensors", None).unwrap();
        let view = tx.create_view(&collection, "v", None).unwrap();
        assert!(tx.delete_view(&view).unwrap());
        assert!(tx.get_view(view.vid).unwrap().is_none());
        assert!(tx.get_collection_views(&collection).unwrap().is_empty());
    }
}
