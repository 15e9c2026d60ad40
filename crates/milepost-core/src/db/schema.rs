//! Canonical SQLite schema for milepost.
//!
//! - `projects` holds the aggregate root, including the ticket counter and
//!   the derived `tag_counts_json` map
//! - `project_members` stores the embedded member list; rows live and die
//!   with their project and are rewritten wholesale on every save
//! - `milestones`, `tickets`, `ticket_tags`, and `events` are owned children
//!   that cascade on project deletion
//! - `functions` and `users` are shared, referenced but never owned
//! - `store_meta` tracks the schema version

/// Migration v1: core tables.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    login TEXT NOT NULL UNIQUE CHECK (length(trim(login)) > 0),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS functions (
    function_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0),
    is_admin INTEGER NOT NULL DEFAULT 0 CHECK (is_admin IN (0, 1)),
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    project_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    num_ticket INTEGER,
    tag_counts_json TEXT NOT NULL DEFAULT '{}',
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS project_members (
    project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    member_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    user_id INTEGER NOT NULL REFERENCES users(user_id),
    user_name TEXT NOT NULL,
    function_id INTEGER NOT NULL REFERENCES functions(function_id),
    function_name TEXT NOT NULL,
    is_admin INTEGER NOT NULL CHECK (is_admin IN (0, 1)),
    PRIMARY KEY (project_id, member_id),
    UNIQUE (project_id, user_id)
);

CREATE TABLE IF NOT EXISTS milestones (
    milestone_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    expected_at_us INTEGER,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tickets (
    ticket_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    number INTEGER NOT NULL,
    title TEXT NOT NULL,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    UNIQUE (project_id, number)
);

CREATE TABLE IF NOT EXISTS ticket_tags (
    ticket_id INTEGER NOT NULL REFERENCES tickets(ticket_id) ON DELETE CASCADE,
    tag TEXT NOT NULL CHECK (length(trim(tag)) > 0),
    PRIMARY KEY (ticket_id, tag)
);

CREATE TABLE IF NOT EXISTS events (
    event_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    user_id INTEGER REFERENCES users(user_id) ON DELETE SET NULL,
    event_type TEXT NOT NULL CHECK (event_type IN ('created', 'updated')),
    eventable_type TEXT NOT NULL,
    eventable_id INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
"#;

/// Migration v2: read-path indexes.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_functions_admin
    ON functions(is_admin, function_id);

CREATE INDEX IF NOT EXISTS idx_milestones_project_expected
    ON milestones(project_id, expected_at_us);

CREATE INDEX IF NOT EXISTS idx_tickets_project
    ON tickets(project_id, number);

CREATE INDEX IF NOT EXISTS idx_ticket_tags_tag
    ON ticket_tags(tag, ticket_id);

CREATE INDEX IF NOT EXISTS idx_events_project_created
    ON events(project_id, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_events_user
    ON events(user_id);

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
"#;

/// Indexes expected by the read paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_functions_admin",
    "idx_milestones_project_expected",
    "idx_tickets_project",
    "idx_ticket_tags_tag",
    "idx_events_project_created",
    "idx_events_user",
];

/// Tables that hold a `project_id` and must be empty for a destroyed project.
pub const PROJECT_OWNED_TABLES: &[&str] = &["project_members", "milestones", "tickets", "events"];
