//! Collection rows and member ingestion
//!
//! Ingestion is the upstream producer of the fragmentation engine: every call to
//! [`StoreTx::store_members`] tags the members it inserts with one fresh,
//! monotonically increasing member-set id.

use crate::rdf::encode_statements;
use crate::storage::database::{now_millis, StoreTx};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Collection, NewMember};
use rusqlite::{params, OptionalExtension};

impl StoreTx<'_> {
    /// Create a collection
    pub fn create_collection(
        &self,
        name: &str,
        definition: Option<&str>,
    ) -> StorageResult<Collection> {
        self.conn().execute(
            "INSERT INTO collections (name, definition) VALUES (?1, ?2)",
            params![name, definition],
        )?;

        Ok(Collection {
            cid: self.conn().last_insert_rowid(),
            name: name.to_string(),
            definition: definition.map(str::to_string),
        })
    }

    /// Find a collection by name
    pub fn get_collection(&self, name: &str) -> StorageResult<Option<Collection>> {
        let collection = self
            .conn()
            .query_row(
                "SELECT cid, name, definition FROM collections WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Collection {
                        cid: row.get(0)?,
                        name: row.get(1)?,
                        definition: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(collection)
    }

    /// Store a batch of members as one member set
    ///
    /// Members whose id already exists in the collection are skipped. Returns the
    /// ids of the members actually stored; an all-duplicate batch creates no
    /// member set.
    pub fn store_members(
        &self,
        collection: &Collection,
        members: &[NewMember],
    ) -> StorageResult<Vec<String>> {
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn();
        conn.execute(
            "INSERT INTO member_sets (cid, member_count, created_at) VALUES (?1, 0, ?2)",
            params![collection.cid, now_millis()],
        )?;
        let member_set = conn.last_insert_rowid();

        let mut stored = Vec::with_capacity(members.len());
        {
            let mut stmt = conn.prepare_cached(
                "INSERT OR IGNORE INTO members
                    (cid, member_set, member_id, entity_id, created_at, statements)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for member in members {
                let blob = encode_statements(&member.statements)?;
                let inserted = stmt.execute(params![
                    collection.cid,
                    member_set,
                    member.member_id,
                    member.entity_id,
                    member.created_at.timestamp_millis(),
                    blob,
                ])?;

                if inserted == 0 {
                    tracing::warn!(
                        member = %member.member_id,
                        collection = %collection.name,
                        "Member ignored as it already exists"
                    );
                } else {
                    stored.push(member.member_id.clone());
                }
            }
        }

        if stored.is_empty() {
            conn.execute("DELETE FROM member_sets WHERE id = ?1", params![member_set])?;
            return Ok(stored);
        }

        conn.execute(
            "UPDATE member_sets SET member_count = ?1 WHERE id = ?2",
            params![stored.len() as i64, member_set],
        )?;

        let affected = conn.execute(
            "UPDATE collections SET ingested = ingested + ?1 WHERE cid = ?2",
            params![stored.len() as i64, collection.cid],
        )?;
        if affected != 1 {
            return Err(StorageError::NotFound(format!(
                "collection '{}'",
                collection.name
            )));
        }

        tracing::debug!(
            collection = %collection.name,
            member_set,
            members = stored.len(),
            "Stored member set"
        );
        Ok(stored)
    }
}
