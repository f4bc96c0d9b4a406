//! Administration and serving entry points
//!
//! Thin, transactional wrappers over the repositories for the operations that
//! happen outside the worker loops: managing collections and views, ingesting
//! members, and reading pages back out.

use crate::fragmentation::{FragmentationError, ViewDefinition};
use crate::storage::{
    Collection, CollectionStatistics, Database, Member, NewMember, Page, PageLink, StorageError,
    StoreTx, View, ViewStatistics,
};
use serde::Serialize;
use thiserror::Error;

/// Errors from administrative operations
#[derive(Error, Debug)]
pub enum AdminError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid view definition: {0}")]
    Definition(#[from] FragmentationError),

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("View '{collection}/{view}' not found")]
    ViewNotFound { collection: String, view: String },

    #[error("{0} already exists")]
    AlreadyExists(String),
}

pub type AdminResult<T> = Result<T, AdminError>;

/// A page as served: its record, outgoing links and members
#[derive(Debug, Clone, Serialize)]
pub struct PageDocument {
    pub name: String,
    pub root: bool,
    pub open: bool,
    pub assigned: i64,
    pub links: Vec<PageLink>,
    pub members: Vec<String>,
}

/// Progress counters of the whole store
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub collections: Vec<CollectionStatistics>,
    pub views: Vec<ViewStatistics>,
}

/// Administrative handle over a database
#[derive(Debug, Clone)]
pub struct Admin {
    db: Database,
}

impl Admin {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a collection
    pub fn create_collection(&self, name: &str) -> AdminResult<Collection> {
        let mut conn = self.db.connect()?;
        let tx = StoreTx::begin(&mut conn)?;
        if tx.get_collection(name)?.is_some() {
            return Err(AdminError::AlreadyExists(format!("Collection '{}'", name)));
        }

        let collection = tx.create_collection(name, None)?;
        tx.commit()?;
        tracing::info!(collection = %name, "Collection created");
        Ok(collection)
    }

    /// Create a view after validating its definition
    ///
    /// A definition that does not parse is rejected before anything is stored.
    /// A blank definition is stored as none.
    pub fn create_view(
        &self,
        collection: &str,
        name: &str,
        definition: Option<&str>,
    ) -> AdminResult<View> {
        let definition = definition.filter(|json| !json.trim().is_empty());
        if let Some(json) = definition {
            let parsed = ViewDefinition::parse(json)?;
            tracing::debug!(view = %name, strategy = parsed.strategy.name(), "Definition accepted");
        }

        let mut conn = self.db.connect()?;
        let tx = StoreTx::begin(&mut conn)?;
        let collection = require_collection(&tx, collection)?;
        if tx.get_collection_view(&collection, name)?.is_some() {
            return Err(AdminError::AlreadyExists(format!(
                "View '{}/{}'",
                collection.name, name
            )));
        }

        let view = tx.create_view(&collection, name, definition)?;
        tx.commit()?;
        tracing::info!(collection = %collection.name, view = %name, "View created");
        Ok(view)
    }

    /// Delete a view and everything fragmented for it
    pub fn delete_view(&self, collection: &str, name: &str) -> AdminResult<()> {
        let mut conn = self.db.connect()?;
        let tx = StoreTx::begin(&mut conn)?;
        let view = require_view(&tx, collection, name)?;
        if !tx.delete_view(&view)? {
            return Err(AdminError::ViewNotFound {
                collection: collection.to_string(),
                view: name.to_string(),
            });
        }
        tx.commit()?;
        tracing::info!(collection = %collection, view = %name, "View deleted");
        Ok(())
    }

    /// Store members as one member set, returning the ids actually stored
    pub fn ingest(&self, collection: &str, members: &[NewMember]) -> AdminResult<Vec<String>> {
        let mut conn = self.db.connect()?;
        let tx = StoreTx::begin(&mut conn)?;
        let collection = require_collection(&tx, collection)?;
        let stored = tx.store_members(&collection, members)?;
        tx.commit()?;

        tracing::info!(
            collection = %collection.name,
            received = members.len(),
            stored = stored.len(),
            "Members ingested"
        );
        Ok(stored)
    }

    pub fn statistics(&self) -> AdminResult<Statistics> {
        let mut conn = self.db.connect()?;
        let tx = StoreTx::begin(&mut conn)?;
        let statistics = Statistics {
            collections: tx.collection_statistics()?,
            views: tx.view_statistics()?,
        };
        tx.rollback()?;
        Ok(statistics)
    }

    /// Read a page with its links and members
    pub fn page(
        &self,
        collection: &str,
        view: &str,
        page: &str,
    ) -> AdminResult<Option<PageDocument>> {
        let mut conn = self.db.connect()?;
        let tx = StoreTx::begin(&mut conn)?;
        let Some(found) = tx.get_page(collection, view, page)? else {
            return Ok(None);
        };

        let links = tx.get_page_links(&found)?;
        let members = tx.get_page_members(&found)?;
        tx.rollback()?;
        Ok(Some(page_document(found, links, members)))
    }
}

fn page_document(page: Page, links: Vec<PageLink>, members: Vec<Member>) -> PageDocument {
    PageDocument {
        name: page.name,
        root: page.root,
        open: page.open,
        assigned: page.assigned,
        links,
        members: members.into_iter().map(|m| m.member_id).collect(),
    }
}

fn require_collection(tx: &StoreTx<'_>, name: &str) -> AdminResult<Collection> {
    tx.get_collection(name)?
        .ok_or_else(|| AdminError::CollectionNotFound(name.to_string()))
}

fn require_view(tx: &StoreTx<'_>, collection: &str, name: &str) -> AdminResult<View> {
    let found = require_collection(tx, collection)?;
    tx.get_collection_view(&found, name)?
        .ok_or_else(|| AdminError::ViewNotFound {
            collection: collection.to_string(),
            view: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn admin() -> (tempfile::TempDir, Admin) {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("ldes.db"));
        db.initialize().unwrap();
        (dir, Admin::new(db))
    }

    fn member(id: &str) -> NewMember {
        NewMember {
            member_id: id.to_string(),
            entity_id: "http://example.org/e".to_string(),
            created_at: Utc::now(),
            statements: Vec::new(),
        }
    }

    #[test]
    fn test_create_view_rejects_bad_definition() {
        let (_dir, admin) = admin();
        admin.create_collection("c").unwrap();

        let err = admin
            .create_view("c", "v", Some(r#"{"fragmentation":[{"type":"geo"}]}"#))
            .unwrap_err();
        assert!(matches!(
            err,
            AdminError::Definition(FragmentationError::UnknownStrategy(_))
        ));

        let weekly = r#"{"fragmentation":[{"type":"time","path":"p","buckets":["P1W"]}]}"#;
        let err = admin.create_view("c", "v", Some(weekly)).unwrap_err();
        assert!(matches!(err, AdminError::Definition(_)));

        assert!(admin.statistics().unwrap().views.is_empty());
    }

    #[test]
    fn test_blank_definition_is_stored_as_none() {
        let (_dir, admin) = admin();
        admin.create_collection("c").unwrap();

        let view = admin.create_view("c", "v", Some("  \n")).unwrap();
        assert_eq!(view.definition, None);
        let view = admin.create_view("c", "w", Some("")).unwrap();
        assert_eq!(view.definition, None);
    }

    #[test]
    fn test_duplicates_and_missing_parents() {
        let (_dir, admin) = admin();
        admin.create_collection("c").unwrap();
        assert!(matches!(
            admin.create_collection("c"),
            Err(AdminError::AlreadyExists(_))
        ));
        assert!(matches!(
            admin.create_view("nope", "v", None),
            Err(AdminError::CollectionNotFound(_))
        ));

        admin.create_view("c", "v", None).unwrap();
        assert!(matches!(
            admin.create_view("c", "v", None),
            Err(AdminError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_ingest_and_read_root_page() {
        let (_dir, admin) = admin();
        admin.create_collection("c").unwrap();
        admin.create_view("c", "v", Some(r#"{"pageSize":10}"#)).unwrap();

        let stored = admin.ingest("c", &[member("a"), member("b")]).unwrap();
        assert_eq!(stored.len(), 2);

        let page = admin.page("c", "v", "v").unwrap().unwrap();
        assert!(page.root);
        assert!(page.open);
        assert!(page.members.is_empty());
        assert!(admin.page("c", "v", "missing").unwrap().is_none());

        let statistics = admin.statistics().unwrap();
        assert_eq!(statistics.collections[0].ingested, 2);
        assert_eq!(statistics.views[0].bucketized, 0);
    }

    #[test]
    fn test_delete_view() {
        let (_dir, admin) = admin();
        admin.create_collection("c").unwrap();
        admin.create_view("c", "v", None).unwrap();

        admin.delete_view("c", "v").unwrap();
        assert!(matches!(
            admin.delete_view("c", "v"),
            Err(AdminError::ViewNotFound { .. })
        ));
        // the name is free again
        admin.create_view("c", "v", None).unwrap();
    }
}
