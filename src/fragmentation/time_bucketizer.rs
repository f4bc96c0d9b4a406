//! Time-based bucketization
//!
//! Members are classified one by one. Each distinct timestamp yields a path of
//! buckets, coarsest first; buckets missing along the path are created with a
//! root page linked from the parent's root page by a `>= from` / `< to`
//! relation pair. The coarsest level hangs off the default bucket. Only the
//! finest bucket of a path receives the member.

use crate::fragmentation::period::TimeBucket;
use crate::fragmentation::time::{TimeFragmentation, GREATER_THAN_OR_EQUAL_TO, LESS_THAN};
use crate::storage::{Bucket, PageRelation, StorageResult, StoreTx, View};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Pending assignments of one tick, per bucket, in first-seen order
#[derive(Default)]
struct Assignments {
    order: Vec<Bucket>,
    members: HashMap<i64, (Vec<i64>, HashSet<i64>)>,
}

impl Assignments {
    fn add(&mut self, bucket: &Bucket, mid: i64) {
        let (mids, seen) = self.members.entry(bucket.bid).or_insert_with(|| {
            self.order.push(bucket.clone());
            (Vec::new(), HashSet::new())
        });
        if seen.insert(mid) {
            mids.push(mid);
        }
    }

    fn total(&self) -> usize {
        self.members.values().map(|(mids, _)| mids.len()).sum()
    }
}

/// Assign the view's pending members to time buckets
///
/// Returns the number of members processed, `Some(0)` when nothing is pending,
/// and `None` when the tick must be abandoned without committing. The
/// bucketization watermark advances by the number of bucket assignments, which
/// exceeds the member count when members carry several timestamps.
pub fn bucketize_view(
    tx: &StoreTx<'_>,
    view: &View,
    fragmentation: &TimeFragmentation,
    batch_size: usize,
) -> StorageResult<Option<usize>> {
    tracing::debug!(view = %view.name, "Getting member sets to time bucketize");
    let member_sets = tx.get_bucketizable_member_sets(view, batch_size)?;
    if member_sets.is_empty() {
        return Ok(Some(0));
    }

    let Some(default_bucket) = tx.get_default_bucket(view)? else {
        tracing::warn!(view = %view.name, "Cancelling time bucketization: no default bucket");
        return Ok(None);
    };

    let members = tx.get_members_by_member_sets(&member_sets)?;
    tracing::debug!(view = %view.name, members = members.len(), "Time bucketizing");

    let relation_path = fragmentation.relation_path();
    let mut cache: HashMap<String, Bucket> = HashMap::new();
    let mut assignments = Assignments::default();

    for member in &members {
        let paths = match fragmentation.time_bucket_paths_for(member) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(
                    view = %view.name,
                    entity = %member.entity_id,
                    error = %e,
                    "Member has an unusable timestamp, using default bucket"
                );
                Vec::new()
            }
        };

        if paths.is_empty() {
            assignments.add(&default_bucket, member.mid);
            continue;
        }

        for path in &paths {
            let mut parent = default_bucket.clone();
            let depth = path.len();

            for (level, time_bucket) in path.buckets().iter().enumerate() {
                let bucket = match cache.get(&time_bucket.key) {
                    Some(bucket) => bucket.clone(),
                    None => {
                        let bucket = match tx.get_bucket(view, &time_bucket.key)? {
                            Some(bucket) => bucket,
                            None => {
                                let leaf = level + 1 == depth;
                                let created = create_linked_bucket(
                                    tx,
                                    view,
                                    &parent,
                                    time_bucket,
                                    &relation_path,
                                    leaf,
                                )?;
                                match created {
                                    Some(bucket) => bucket,
                                    None => return Ok(None),
                                }
                            }
                        };
                        cache.insert(time_bucket.key.clone(), bucket.clone());
                        bucket
                    }
                };

                if level + 1 == depth {
                    assignments.add(&bucket, member.mid);
                }
                parent = bucket;
            }
        }
    }

    let expected = assignments.total();
    for bucket in &assignments.order {
        let Some((mids, _)) = assignments.members.get(&bucket.bid) else {
            continue;
        };
        let affected = tx.bulk_assign_members(bucket, mids)?;
        if affected != mids.len() {
            tracing::warn!(
                view = %view.name,
                bucket = %bucket.display_key(),
                affected,
                expected = mids.len(),
                "Cancelling time bucketization: bucket assignment mismatch"
            );
            return Ok(None);
        }
    }

    if !tx.update_bucketization_watermark(view, &member_sets, expected)? {
        tracing::warn!(
            view = %view.name,
            "Cancelling time bucketization: watermark changed concurrently"
        );
        return Ok(None);
    }

    tracing::debug!(
        view = %view.name,
        members = members.len(),
        assignments = expected,
        buckets = assignments.order.len(),
        "Time bucketized"
    );
    Ok(Some(members.len()))
}

/// Create a bucket with its root page, linked from the parent's root page
fn create_linked_bucket(
    tx: &StoreTx<'_>,
    view: &View,
    parent: &Bucket,
    time_bucket: &TimeBucket,
    relation_path: &str,
    leaf: bool,
) -> StorageResult<Option<Bucket>> {
    let key = time_bucket.key.as_str();
    let Some(bucket) = tx.create_bucket(view, key, leaf)? else {
        tracing::warn!(
            view = %view.name,
            bucket = %key,
            "Cancelling time bucketization: cannot create bucket"
        );
        return Ok(None);
    };

    let Some(root_page) = tx.create_root_page(&bucket, &Uuid::new_v4().to_string())? else {
        tracing::warn!(
            view = %view.name,
            bucket = %key,
            "Cancelling time bucketization: cannot create root page"
        );
        return Ok(None);
    };

    let Some(parent_page) = tx.get_root_page(parent)? else {
        tracing::warn!(
            view = %view.name,
            bucket = %parent.display_key(),
            "Cancelling time bucketization: parent bucket has no root page"
        );
        return Ok(None);
    };

    let relations = [
        PageRelation::constrained(
            GREATER_THAN_OR_EQUAL_TO,
            relation_path,
            time_bucket.from_boundary(),
        ),
        PageRelation::constrained(LESS_THAN, relation_path, time_bucket.to_boundary()),
    ];
    if !tx.relate_pages(&parent_page, &root_page, &relations)? {
        tracing::warn!(
            view = %view.name,
            page = %parent_page.name,
            "Cancelling time bucketization: cannot relate pages"
        );
        return Ok(None);
    }

    tracing::debug!(view = %view.name, bucket = %key, leaf, "Created time bucket");
    Ok(Some(bucket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragmentation::Period;
    use crate::rdf::{Statement, Term};
    use crate::storage::{Database, NewMember};
    use chrono::Utc;
    use tempfile::tempdir;

    const CREATED: &str = "http://purl.org/dc/terms/created";

    fn member(id: &str, timestamps: &[&str]) -> NewMember {
        let entity = format!("http://example.org/{}", id);
        NewMember {
            member_id: id.to_string(),
            entity_id: entity.clone(),
            created_at: Utc::now(),
            statements: timestamps
                .iter()
                .map(|ts| Statement::new(Term::iri(entity.as_str()), CREATED, Term::date_time(*ts)))
                .collect(),
        }
    }

    fn by_day() -> TimeFragmentation {
        TimeFragmentation::new(vec![CREATED.to_string()], vec![Period::Days(1)])
    }

    #[test]
    fn test_members_land_in_leaf_buckets() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("ldes.db"));
        db.initialize().unwrap();
        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();

        let collection = tx.create_collection("c", None).unwrap();
        let view = tx.create_view(&collection, "v", None).unwrap();
        tx.store_members(
            &collection,
            &[
                member("a", &["2025-08-20T07:00:00Z"]),
                member("b", &["2025-08-21T09:00:00Z"]),
                member("c", &["2025-08-20T23:00:00Z"]),
                member("d", &[]),
            ],
        )
        .unwrap();

        assert_eq!(bucketize_view(&tx, &view, &by_day(), 100).unwrap(), Some(4));

        let first = tx.get_bucket(&view, "[2025-08-20 .. 2025-08-21]").unwrap().unwrap();
        let second = tx.get_bucket(&view, "[2025-08-21 .. 2025-08-22]").unwrap().unwrap();
        assert!(first.leaf && second.leaf);
        assert_eq!(tx.get_members_ready_for_pagination(&first, i64::MAX).unwrap().len(), 2);
        assert_eq!(tx.get_members_ready_for_pagination(&second, i64::MAX).unwrap().len(), 1);

        let default_bucket = tx.get_default_bucket(&view).unwrap().unwrap();
        assert_eq!(
            tx.get_members_ready_for_pagination(&default_bucket, i64::MAX)
                .unwrap()
                .len(),
            1
        );

        let root = tx.get_root_page(&default_bucket).unwrap().unwrap();
        let links = tx.get_page_links(&root).unwrap();
        assert_eq!(links.len(), 4);
        assert_eq!(links[0].relation.relation_type.as_deref(), Some(GREATER_THAN_OR_EQUAL_TO));
        assert_eq!(links[0].relation.value.as_deref(), Some("2025-08-20T00:00:00Z"));
        assert_eq!(links[1].relation.relation_type.as_deref(), Some(LESS_THAN));
        assert_eq!(links[1].relation.value.as_deref(), Some("2025-08-21T00:00:00Z"));
        assert_eq!(links[0].relation.path.as_deref(), Some(CREATED));
    }

    #[test]
    fn test_every_path_starts_at_the_default_bucket() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("ldes.db"));
        db.initialize().unwrap();
        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();

        let collection = tx.create_collection("c", None).unwrap();
        let view = tx.create_view(&collection, "v", None).unwrap();
        tx.store_members(
            &collection,
            &[
                member("a", &["2024-03-01T10:00:00Z"]),
                member("b", &["2025-03-01T10:00:00Z"]),
            ],
        )
        .unwrap();

        let fragmentation = TimeFragmentation::new(
            vec![CREATED.to_string()],
            vec![Period::Years(1), Period::Days(1)],
        );
        assert_eq!(bucketize_view(&tx, &view, &fragmentation, 100).unwrap(), Some(2));

        let default_bucket = tx.get_default_bucket(&view).unwrap().unwrap();
        let root = tx.get_root_page(&default_bucket).unwrap().unwrap();
        // both year buckets hang off the default root page
        assert_eq!(tx.get_page_links(&root).unwrap().len(), 4);

        let year = tx.get_bucket(&view, "[2025 .. 2026]").unwrap().unwrap();
        assert!(!year.leaf);
        let year_root = tx.get_root_page(&year).unwrap().unwrap();
        let links = tx.get_page_links(&year_root).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].relation.value.as_deref(), Some("2025-03-01T00:00:00Z"));
    }

    #[test]
    fn test_repeated_timestamps_assign_once_per_bucket() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("ldes.db"));
        db.initialize().unwrap();
        let mut conn = db.connect().unwrap();
        let tx = StoreTx::begin(&mut conn).unwrap();

        let collection = tx.create_collection("c", None).unwrap();
        let view = tx.create_view(&collection, "v", None).unwrap();
        tx.store_members(
            &collection,
            &[member(
                "a",
                &["2025-08-20T07:00:00Z", "2025-08-20T08:00:00Z", "2025-08-22T08:00:00Z"],
            )],
        )
        .unwrap();

        assert_eq!(bucketize_view(&tx, &view, &by_day(), 100).unwrap(), Some(1));

        // one member, two leaf buckets
        let view = tx.get_view(view.vid).unwrap().unwrap();
        assert_eq!(view.bucketization.total, 2);
    }
}
