//! Relational schema
//!
//! Created idempotently on every [`Database::initialize`](super::Database::initialize).
//! Partial unique indexes carry the structural invariants:
//!
//! - one default bucket (`key IS NULL`) per view
//! - one root page and one open page per bucket
//! - page names unique within a view

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS collections (
    cid INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    definition TEXT,
    ingested INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS views (
    vid INTEGER PRIMARY KEY AUTOINCREMENT,
    cid INTEGER NOT NULL REFERENCES collections(cid),
    name TEXT NOT NULL,
    definition TEXT,
    UNIQUE (cid, name)
);

CREATE TABLE IF NOT EXISTS member_sets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cid INTEGER NOT NULL REFERENCES collections(cid),
    member_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_member_sets_cid ON member_sets(cid, id);

CREATE TABLE IF NOT EXISTS members (
    mid INTEGER PRIMARY KEY AUTOINCREMENT,
    cid INTEGER NOT NULL REFERENCES collections(cid),
    member_set INTEGER NOT NULL REFERENCES member_sets(id),
    member_id TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    statements BLOB NOT NULL,
    UNIQUE (cid, member_id)
);
CREATE INDEX IF NOT EXISTS idx_members_member_set ON members(member_set, mid);

CREATE TABLE IF NOT EXISTS buckets (
    bid INTEGER PRIMARY KEY AUTOINCREMENT,
    vid INTEGER NOT NULL REFERENCES views(vid),
    key TEXT,
    leaf INTEGER NOT NULL DEFAULT 1,
    last_mid INTEGER,
    UNIQUE (vid, key)
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_buckets_default ON buckets(vid) WHERE key IS NULL;

CREATE TABLE IF NOT EXISTS bucket_members (
    bid INTEGER NOT NULL REFERENCES buckets(bid),
    vid INTEGER NOT NULL REFERENCES views(vid),
    mid INTEGER NOT NULL REFERENCES members(mid),
    PRIMARY KEY (bid, mid)
);
CREATE INDEX IF NOT EXISTS idx_bucket_members_view ON bucket_members(vid, mid);

CREATE TABLE IF NOT EXISTS pages (
    pid INTEGER PRIMARY KEY AUTOINCREMENT,
    bid INTEGER NOT NULL REFERENCES buckets(bid),
    vid INTEGER NOT NULL REFERENCES views(vid),
    name TEXT NOT NULL,
    root INTEGER NOT NULL DEFAULT 0,
    open INTEGER NOT NULL DEFAULT 1,
    assigned INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL,
    UNIQUE (vid, name)
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_pages_open ON pages(bid) WHERE open = 1;
CREATE UNIQUE INDEX IF NOT EXISTS idx_pages_root ON pages(bid) WHERE root = 1;

CREATE TABLE IF NOT EXISTS page_members (
    pid INTEGER NOT NULL REFERENCES pages(pid),
    mid INTEGER NOT NULL REFERENCES members(mid),
    vid INTEGER NOT NULL REFERENCES views(vid),
    PRIMARY KEY (pid, mid)
);

CREATE TABLE IF NOT EXISTS page_relations (
    fid INTEGER NOT NULL REFERENCES pages(pid),
    tid INTEGER NOT NULL REFERENCES pages(pid),
    vid INTEGER NOT NULL REFERENCES views(vid),
    type TEXT,
    path TEXT,
    value TEXT
);
CREATE INDEX IF NOT EXISTS idx_page_relations_from ON page_relations(fid);

CREATE TABLE IF NOT EXISTS bucketization_stats (
    vid INTEGER PRIMARY KEY REFERENCES views(vid),
    last_member_set INTEGER NOT NULL DEFAULT 0,
    total INTEGER NOT NULL DEFAULT 0,
    claimed_by TEXT,
    claimed_until INTEGER,
    last_claimed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS pagination_stats (
    vid INTEGER PRIMARY KEY REFERENCES views(vid),
    total INTEGER NOT NULL DEFAULT 0,
    cursor INTEGER NOT NULL DEFAULT 0,
    claimed_by TEXT,
    claimed_until INTEGER,
    last_claimed INTEGER NOT NULL DEFAULT 0
);
";
