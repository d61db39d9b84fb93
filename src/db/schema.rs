//! Database schema definitions

pub const CREATE_ATTACKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS attacks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ip TEXT NOT NULL,
    attack_type TEXT NOT NULL,
    severity INTEGER NOT NULL,
    timestamp BIGINT NOT NULL,
    city TEXT,
    country TEXT,
    latitude TEXT,
    longitude TEXT
)
"#;

pub const CREATE_AUDIT_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS audit_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    user_email TEXT NOT NULL,
    action TEXT NOT NULL,
    resource_type TEXT,
    resource_id TEXT,
    status TEXT NOT NULL,
    metadata TEXT,
    ip_address TEXT,
    user_agent TEXT,
    created_at BIGINT NOT NULL
)
"#;

pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    role TEXT NOT NULL DEFAULT 'user',
    created_at BIGINT NOT NULL
)
"#;

pub const CREATE_PROJECTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    url TEXT,
    featured INTEGER NOT NULL DEFAULT 0,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
)
"#;

// For recency queries and the 24h hourly rollup
pub const CREATE_INDEX_ATTACKS_TS: &str =
    "CREATE INDEX IF NOT EXISTS idx_attacks_ts ON attacks(timestamp)";

// For per-source correlation on the dashboard
pub const CREATE_INDEX_ATTACKS_IP: &str =
    "CREATE INDEX IF NOT EXISTS idx_attacks_ip ON attacks(ip)";

pub const CREATE_INDEX_AUDIT_CREATED: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_logs(created_at)";

pub const CREATE_INDEX_AUDIT_ACTION: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_logs(action)";

pub const CREATE_INDEX_AUDIT_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_logs(user_id)";
