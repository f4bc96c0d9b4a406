//! Slicing buckets into pages
//!
//! Pending members of a bucket are poured into its open page. A page that
//! reaches the page size exactly is closed and succeeded by a fresh open page,
//! linked by a continuation relation. Pages never exceed the page size and are
//! never reopened.

use crate::storage::{Bucket, Page, StorageResult, StoreTx, View};
use uuid::Uuid;

/// Paginate the view's pending members with row id below `cursor + batch_size`
///
/// Returns the number of members paginated, `Some(0)` when nothing is pending,
/// and `None` when the tick must be abandoned without committing.
pub fn paginate_view(
    tx: &StoreTx<'_>,
    view: &View,
    page_size: u32,
    batch_size: usize,
) -> StorageResult<Option<usize>> {
    let Some(cursor) = tx.get_first_pending_member(view)? else {
        return Ok(Some(0));
    };
    let bound = cursor.saturating_add(batch_size.max(1) as i64);

    let buckets = tx.get_buckets_ready_for_pagination(view, bound)?;
    tracing::debug!(
        view = %view.name,
        buckets = buckets.len(),
        cursor,
        bound,
        "Paginating buckets"
    );

    let mut paginated = 0;
    for bucket in &buckets {
        let mids = tx.get_members_ready_for_pagination(bucket, bound)?;
        match paginate_bucket(tx, bucket, page_size, &mids)? {
            Some(count) => paginated += count,
            None => {
                tracing::warn!(
                    view = %view.name,
                    bucket = %bucket.display_key(),
                    "Cancelling pagination: bucket could not be paginated"
                );
                return Ok(None);
            }
        }
    }

    if !tx.update_pagination_watermark(view, bound, paginated)? {
        tracing::warn!(
            view = %view.name,
            "Cancelling pagination: watermark changed concurrently"
        );
        return Ok(None);
    }

    Ok(Some(paginated))
}

/// Pour `mids` into the bucket's pages
///
/// The open page is topped up first, then the rest is added in page-sized
/// slices, each one closing its page when it fills it.
pub fn paginate_bucket(
    tx: &StoreTx<'_>,
    bucket: &Bucket,
    page_size: u32,
    mids: &[i64],
) -> StorageResult<Option<usize>> {
    let Some(last_mid) = mids.last().copied() else {
        return Ok(Some(0));
    };

    let Some(mut page) = tx.get_open_page(bucket)? else {
        tracing::warn!(bucket = %bucket.display_key(), "Bucket has no open page");
        return Ok(None);
    };

    let page_size = page_size.max(1) as i64;
    if page.assigned >= page_size {
        // page size shrank since this page was opened
        match tx.close_page_and_link_to_new_page(&page, &new_page_name())? {
            Some(next) => page = next,
            None => return Ok(None),
        }
    }

    let capacity = (page_size - page.assigned) as usize;
    let (first, mut rest) = mids.split_at(capacity.min(mids.len()));
    let Some(mut page) = fill_page_and_create_new_if_needed(tx, page, first, page_size)? else {
        return Ok(None);
    };

    while !rest.is_empty() {
        let (batch, remaining) = rest.split_at((page_size as usize).min(rest.len()));
        page = match fill_page_and_create_new_if_needed(tx, page, batch, page_size)? {
            Some(page) => page,
            None => return Ok(None),
        };
        rest = remaining;
    }

    if !tx.set_last_paginated_member(bucket, last_mid)? {
        tracing::warn!(bucket = %bucket.display_key(), "Bucket cursor changed concurrently");
        return Ok(None);
    }

    tracing::debug!(
        bucket = %bucket.display_key(),
        members = mids.len(),
        open_page = %page.name,
        "Paginated bucket"
    );
    Ok(Some(mids.len()))
}

/// Add `batch` to `page`, closing it and opening a successor when full
///
/// Returns the page that is open afterwards.
pub fn fill_page_and_create_new_if_needed(
    tx: &StoreTx<'_>,
    page: Page,
    batch: &[i64],
    page_size: i64,
) -> StorageResult<Option<Page>> {
    if batch.is_empty() {
        return Ok(Some(page));
    }

    let Some(associated) = tx.associate_members(&page, batch)? else {
        return Ok(None);
    };

    let assigned = page.assigned + associated as i64;
    if assigned == page_size {
        return tx.close_page_and_link_to_new_page(&page, &new_page_name());
    }

    Ok(Some(Page { assigned, ..page }))
}

fn new_page_name() -> String {
    Uuid::new_v4().to_string()
}
