//! SQLite schema definition

/// Table holding one row per metric model
pub const REGISTRY_TABLE: &str = "metricregistry";

/// Append-only table holding one row per version
pub const VERSIONS_TABLE: &str = "metricversions";

/// SQL schema for the registry database
pub const SCHEMA_SQL: &str = r#"
-- One row per distinct metric model name
CREATE TABLE IF NOT EXISTS metricregistry (
    metricid TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    target_table TEXT,
    versionid TEXT NOT NULL,
    version TEXT NOT NULL,
    update_time TEXT NOT NULL
);

-- Every version ever created; never updated or deleted
CREATE TABLE IF NOT EXISTS metricversions (
    versionid TEXT PRIMARY KEY,
    version TEXT NOT NULL,
    metricid TEXT NOT NULL REFERENCES metricregistry(metricid),
    model_path TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    metrics TEXT NOT NULL DEFAULT '[]',
    dimensions TEXT NOT NULL DEFAULT '[]',
    measures TEXT NOT NULL DEFAULT '[]',
    identifiers TEXT NOT NULL DEFAULT '[]',
    depends_on TEXT NOT NULL DEFAULT '[]',
    tables_used TEXT NOT NULL DEFAULT '[]',
    update_time TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_versions_metric ON metricversions(metricid);
CREATE INDEX IF NOT EXISTS idx_registry_name ON metricregistry(name);
"#;
