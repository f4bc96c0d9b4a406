//! Pages, page relations and page membership
//!
//! A bucket always owns exactly one open page. Filling it to capacity closes it
//! and opens a successor linked by a continuation relation; closed pages are
//! never reopened.

use crate::rdf::decode_statements;
use crate::storage::bucket::is_constraint_violation;
use crate::storage::database::{now_millis, placeholders, StoreTx};
use crate::storage::error::StorageResult;
use crate::storage::member::millis_to_datetime;
use crate::storage::types::{Bucket, Member, Page, PageLink, PageRelation};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

const SELECT_PAGE: &str = "SELECT pid, bid, vid, name, root, open, assigned FROM pages";

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        pid: row.get(0)?,
        bid: row.get(1)?,
        vid: row.get(2)?,
        name: row.get(3)?,
        root: row.get(4)?,
        open: row.get(5)?,
        assigned: row.get(6)?,
    })
}

impl StoreTx<'_> {
    /// Create the root page of a freshly created bucket
    ///
    /// Returns `None` when the bucket already has a root page or the name is
    /// taken within the view.
    pub fn create_root_page(&self, bucket: &Bucket, name: &str) -> StorageResult<Option<Page>> {
        self.insert_page(bucket.bid, bucket.vid, name, true)
    }

    fn insert_page(
        &self,
        bid: i64,
        vid: i64,
        name: &str,
        root: bool,
    ) -> StorageResult<Option<Page>> {
        match self.conn().execute(
            "INSERT INTO pages (bid, vid, name, root, open, assigned, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, 0, ?5)",
            params![bid, vid, name, root, now_millis()],
        ) {
            Ok(_) => Ok(Some(Page {
                pid: self.conn().last_insert_rowid(),
                bid,
                vid,
                name: name.to_string(),
                root,
                open: true,
                assigned: 0,
            })),
            Err(e) if is_constraint_violation(&e) => {
                tracing::warn!(page = %name, error = %e, "Cannot create page");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The page of `bucket` currently accepting members
    pub fn get_open_page(&self, bucket: &Bucket) -> StorageResult<Option<Page>> {
        let page = self
            .conn()
            .query_row(
                &format!("{} WHERE bid = ?1 AND open = 1", SELECT_PAGE),
                params![bucket.bid],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    /// The first page of `bucket`
    pub fn get_root_page(&self, bucket: &Bucket) -> StorageResult<Option<Page>> {
        let page = self
            .conn()
            .query_row(
                &format!("{} WHERE bid = ?1 AND root = 1", SELECT_PAGE),
                params![bucket.bid],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    /// Close `page` and open its successor, linked by a continuation relation
    ///
    /// Returns `None` if the page was no longer open or the successor could not
    /// be created.
    pub fn close_page_and_link_to_new_page(
        &self,
        page: &Page,
        new_name: &str,
    ) -> StorageResult<Option<Page>> {
        let closed = self.conn().execute(
            "UPDATE pages SET open = 0, updated_at = ?1 WHERE pid = ?2 AND open = 1",
            params![now_millis(), page.pid],
        )?;
        if closed != 1 {
            return Ok(None);
        }

        let Some(successor) = self.insert_page(page.bid, page.vid, new_name, false)? else {
            return Ok(None);
        };

        if !self.relate_pages(page, &successor, &[PageRelation::continuation()])? {
            return Ok(None);
        }

        tracing::debug!(page = %page.name, successor = %successor.name, "Closed page");
        Ok(Some(successor))
    }

    /// Add relations from `from` to `to`
    pub fn relate_pages(
        &self,
        from: &Page,
        to: &Page,
        relations: &[PageRelation],
    ) -> StorageResult<bool> {
        let mut stmt = self.conn().prepare_cached(
            "INSERT INTO page_relations (fid, tid, vid, type, path, value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        let mut affected = 0;
        for relation in relations {
            affected += stmt.execute(params![
                from.pid,
                to.pid,
                from.vid,
                relation.relation_type,
                relation.path,
                relation.value,
            ])?;
        }
        Ok(affected == relations.len())
    }

    /// Move pending members of the page's bucket onto `page`
    ///
    /// Removes them from the bucket's pending set, records them on the page and
    /// bumps its `assigned` counter in one step. Returns `None` when the number
    /// removed differs from the number associated.
    pub fn associate_members(&self, page: &Page, mids: &[i64]) -> StorageResult<Option<usize>> {
        if mids.is_empty() {
            return Ok(Some(0));
        }

        let conn = self.conn();
        let sql = format!(
            "DELETE FROM bucket_members WHERE bid = ? AND mid IN ({})",
            placeholders(mids.len())
        );
        let args = std::iter::once(page.bid).chain(mids.iter().copied());
        let removed = conn.execute(&sql, params_from_iter(args))?;

        let mut associated = 0;
        {
            let mut stmt = conn.prepare_cached(
                "INSERT OR IGNORE INTO page_members (pid, mid, vid) VALUES (?1, ?2, ?3)",
            )?;
            for mid in mids {
                associated += stmt.execute(params![page.pid, mid, page.vid])?;
            }
        }

        if removed != associated || associated != mids.len() {
            tracing::warn!(
                page = %page.name,
                removed,
                associated,
                expected = mids.len(),
                "Page association mismatch"
            );
            return Ok(None);
        }

        let updated = conn.execute(
            "UPDATE pages SET assigned = assigned + ?1, updated_at = ?2 WHERE pid = ?3",
            params![associated as i64, now_millis(), page.pid],
        )?;
        if updated != 1 {
            return Ok(None);
        }

        Ok(Some(associated))
    }

    /// Find a page by collection, view and page name
    pub fn get_page(
        &self,
        collection: &str,
        view: &str,
        name: &str,
    ) -> StorageResult<Option<Page>> {
        let page = self
            .conn()
            .query_row(
                "SELECT p.pid, p.bid, p.vid, p.name, p.root, p.open, p.assigned
                 FROM pages p
                 INNER JOIN views v ON v.vid = p.vid
                 INNER JOIN collections c ON c.cid = v.cid
                 WHERE c.name = ?1 AND v.name = ?2 AND p.name = ?3",
                params![collection, view, name],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    /// Outgoing relations of `page`
    pub fn get_page_links(&self, page: &Page) -> StorageResult<Vec<PageLink>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT p.name, r.type, r.path, r.value
             FROM page_relations r
             INNER JOIN pages p ON p.pid = r.tid
             WHERE r.fid = ?1
             ORDER BY r.rowid",
        )?;
        let links = stmt
            .query_map(params![page.pid], |row| {
                Ok(PageLink {
                    link: row.get(0)?,
                    relation: PageRelation {
                        relation_type: row.get(1)?,
                        path: row.get(2)?,
                        value: row.get(3)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    /// Members on `page`, by creation time
    pub fn get_page_members(&self, page: &Page) -> StorageResult<Vec<Member>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT m.mid, m.member_id, m.entity_id, m.created_at, m.statements
             FROM page_members pm
             INNER JOIN members m ON m.mid = pm.mid
             WHERE pm.pid = ?1
             ORDER BY m.created_at, m.mid",
        )?;
        let rows = stmt
            .query_map(params![page.pid], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mid, member_id, entity_id, created_at, blob)| {
                Ok(Member {
                    mid,
                    member_id,
                    entity_id,
                    created_at: millis_to_datetime(created_at)?,
                    statements: decode_statements(&blob)?,
                })
            })
            .collect()
    }
}
