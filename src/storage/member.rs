//! Member reads for bucketization
//!
//! The engine never creates members; it reads the member sets a view has not
//! bucketized yet and, for strategies that need them, the members' statements.

use crate::rdf::decode_statements;
use crate::storage::database::{placeholders, StoreTx};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Member, MemberSet, View};
use chrono::{TimeZone, Utc};
use rusqlite::params;
use rusqlite::params_from_iter;

impl StoreTx<'_> {
    /// Member sets of the view's collection beyond its bucketization watermark
    ///
    /// Sets are taken in id order while their combined size stays within
    /// `max_members`. The first pending set is always taken, so an oversized set
    /// still makes progress.
    pub fn get_bucketizable_member_sets(
        &self,
        view: &View,
        max_members: usize,
    ) -> StorageResult<Vec<MemberSet>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT id, member_count FROM member_sets
             WHERE cid = ?1 AND id > ?2
             ORDER BY id
             LIMIT ?3",
        )?;

        let candidates = stmt
            .query_map(
                params![
                    view.cid,
                    view.bucketization.last_member_set,
                    max_members.max(1) as i64
                ],
                |row| {
                    Ok(MemberSet {
                        id: row.get(0)?,
                        member_count: row.get(1)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut selected = Vec::new();
        let mut total = 0usize;
        for set in candidates {
            let count = set.member_count.max(0) as usize;
            if !selected.is_empty() && total + count > max_members {
                break;
            }
            total += count;
            selected.push(set);
        }

        Ok(selected)
    }

    /// All members of the given member sets, in ingestion order
    pub fn get_members_by_member_sets(
        &self,
        member_sets: &[MemberSet],
    ) -> StorageResult<Vec<Member>> {
        if member_sets.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT mid, member_id, entity_id, created_at, statements FROM members
             WHERE member_set IN ({})
             ORDER BY member_set, mid",
            placeholders(member_sets.len())
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(member_sets.iter().map(|s| s.id)), |row| {
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

pub(crate) fn millis_to_datetime(millis: i64) -> StorageResult<chrono::DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StorageError::Corruption(format!("invalid timestamp {}", millis)))
}
