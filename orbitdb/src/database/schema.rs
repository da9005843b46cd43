// Built-in registrations and DDL for the purpose-partitioned databases

use super::DatabaseConfig;

pub const APP: &str = "app";
pub const MARK: &str = "mark";
pub const CACHE: &str = "cache";
pub const ANALYTICS: &str = "analytics";

/// The four default databases. Table descriptions are documentation only.
pub fn default_registrations() -> Vec<(&'static str, DatabaseConfig)> {
    vec![
        (
            APP,
            DatabaseConfig::new("app.db", "Application users and sessions")
                .with_table("users", "Application user accounts")
                .with_table("user_sessions", "Active user sessions")
                .with_table("user_preferences", "Per-user settings"),
        ),
        (
            MARK,
            DatabaseConfig::new("mark.db", "Administration (mark) users and audit trail")
                .with_table("mark_users", "Administrator accounts")
                .with_table("mark_sessions", "Administrator sessions")
                .with_table("mark_audit_logs", "Audit log of administrative actions"),
        ),
        (
            CACHE,
            DatabaseConfig::new("cache.db", "Disposable caches")
                .with_table("file_metadata_cache", "Parsed content file metadata")
                .with_table("query_result_cache", "Cached query results with expiry")
                .with_table("search_index_cache", "Full-text search tokens per record"),
        ),
        (
            ANALYTICS,
            DatabaseConfig::new("analytics.db", "Traffic and performance analytics")
                .with_table("page_views", "One row per page view")
                .with_table("search_queries", "Search terms and result counts")
                .with_table("performance_metrics", "Request timing samples"),
        ),
    ]
}

/// DDL for a logical database, if one is built in.
pub fn schema_for(name: &str) -> Option<&'static str> {
    match name {
        APP => Some(APP_SCHEMA),
        MARK => Some(MARK_SCHEMA),
        CACHE => Some(CACHE_SCHEMA),
        ANALYTICS => Some(ANALYTICS_SCHEMA),
        _ => None,
    }
}

const APP_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user',
        status TEXT NOT NULL DEFAULT 'active',
        last_login_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS user_sessions (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        ip_address TEXT,
        user_agent TEXT,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS user_preferences (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        pref_key TEXT NOT NULL,
        value TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (user_id, pref_key),
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_user_sessions_user ON user_sessions(user_id);
    CREATE INDEX IF NOT EXISTS idx_user_sessions_expires ON user_sessions(expires_at);
";

const MARK_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS mark_users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'editor',
        status TEXT NOT NULL DEFAULT 'active',
        last_login_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS mark_sessions (
        id TEXT PRIMARY KEY,
        mark_user_id INTEGER NOT NULL,
        ip_address TEXT,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY (mark_user_id) REFERENCES mark_users(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS mark_audit_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        mark_user_id INTEGER,
        action TEXT NOT NULL,
        target_type TEXT,
        target_id TEXT,
        details TEXT,
        ip_address TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY (mark_user_id) REFERENCES mark_users(id) ON DELETE SET NULL
    );

    CREATE INDEX IF NOT EXISTS idx_mark_audit_logs_user ON mark_audit_logs(mark_user_id);
    CREATE INDEX IF NOT EXISTS idx_mark_audit_logs_created ON mark_audit_logs(created_at);
";

const CACHE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS file_metadata_cache (
        file_path TEXT PRIMARY KEY,
        model TEXT NOT NULL,
        modified_at INTEGER NOT NULL,
        metadata_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS query_result_cache (
        cache_key TEXT PRIMARY KEY,
        result_json TEXT NOT NULL,
        expires_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS search_index_cache (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        model TEXT NOT NULL,
        record_id TEXT NOT NULL,
        token TEXT NOT NULL,
        weight REAL NOT NULL DEFAULT 1.0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_file_metadata_model ON file_metadata_cache(model);
    CREATE INDEX IF NOT EXISTS idx_query_result_expires ON query_result_cache(expires_at);
    CREATE INDEX IF NOT EXISTS idx_search_index_token ON search_index_cache(token);
";

const ANALYTICS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS page_views (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL,
        referrer TEXT,
        user_agent TEXT,
        ip_hash TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS search_queries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        search_term TEXT NOT NULL,
        result_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS performance_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        route TEXT NOT NULL,
        duration_ms REAL NOT NULL,
        memory_bytes INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_page_views_path ON page_views(path);
    CREATE INDEX IF NOT EXISTS idx_page_views_created ON page_views(created_at);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_default_has_schema() {
        for (name, config) in default_registrations() {
            let ddl = schema_for(name).unwrap();
            for table in config.tables.keys() {
                assert!(
                    ddl.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                    "{name} schema is missing {table}"
                );
            }
        }
        assert!(schema_for("custom").is_none());
    }
}
