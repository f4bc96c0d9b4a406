use crate::storage::database::StoreTx;
use crate::storage::error::StorageResult;
use crate::storage::types::{CollectionStatistics, ViewStatistics};

impl StoreTx<'_> {
    /// Progress counters of every view
    pub fn view_statistics(&self) -> StorageResult<Vec<ViewStatistics>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT c.name, v.name, bs.total, ps.total
             FROM views v
             INNER JOIN collections c ON c.cid = v.cid
             INNER JOIN bucketization_stats bs ON bs.vid = v.vid
             INNER JOIN pagination_stats ps ON ps.vid = v.vid
             ORDER BY c.name, v.name",
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok(ViewStatistics {
                    collection: row.get(0)?,
                    view: row.get(1)?,
                    bucketized: row.get(2)?,
                    paginated: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }

    /// Ingested member count of every collection
    pub fn collection_statistics(&self) -> StorageResult<Vec<CollectionStatistics>> {
        let mut stmt = self
            .conn()
            .prepare_cached("SELECT name, ingested FROM collections ORDER BY name")?;
        let stats = stmt
            .query_map([], |row| {
                Ok(CollectionStatistics {
                    collection: row.get(0)?,
                    ingested: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }
}
