//! Embedded schema migrations, applied once at startup and via `db migrate`.

pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_init",
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            path        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created     INTEGER NOT NULL,
            updated     INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS files (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id  INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            path        TEXT NOT NULL,
            name        TEXT NOT NULL,
            extension   TEXT NOT NULL DEFAULT '',
            size        INTEGER NOT NULL DEFAULT 0,
            content     TEXT NOT NULL DEFAULT '',
            summary     TEXT,
            UNIQUE(project_id, path)
        );

        CREATE TABLE IF NOT EXISTS queues (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id          INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name                TEXT NOT NULL,
            description         TEXT NOT NULL DEFAULT '',
            status              TEXT NOT NULL DEFAULT 'active',
            max_parallel_items  INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS tickets (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id          INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            title               TEXT NOT NULL,
            overview            TEXT NOT NULL DEFAULT '',
            status              TEXT NOT NULL DEFAULT 'open',
            priority            TEXT NOT NULL DEFAULT 'normal',
            suggested_file_ids  TEXT NOT NULL DEFAULT '[]',
            suggested_agent_ids TEXT NOT NULL DEFAULT '[]',
            suggested_prompt_ids TEXT NOT NULL DEFAULT '[]',
            queue_id            INTEGER REFERENCES queues(id) ON DELETE SET NULL,
            queue_status        TEXT,
            queue_priority      INTEGER NOT NULL DEFAULT 0,
            queue_enqueued_at   INTEGER,
            created             INTEGER NOT NULL,
            updated             INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id           INTEGER NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
            content             TEXT NOT NULL,
            description         TEXT,
            done                INTEGER NOT NULL DEFAULT 0,
            order_index         INTEGER NOT NULL DEFAULT 0,
            suggested_file_ids  TEXT NOT NULL DEFAULT '[]',
            estimated_hours     REAL,
            dependencies        TEXT NOT NULL DEFAULT '[]',
            tags                TEXT NOT NULL DEFAULT '[]',
            agent_id            TEXT,
            queue_id            INTEGER REFERENCES queues(id) ON DELETE SET NULL,
            queue_status        TEXT,
            queue_priority      INTEGER NOT NULL DEFAULT 0,
            queue_enqueued_at   INTEGER
        );

        CREATE TABLE IF NOT EXISTS prompts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            content     TEXT NOT NULL,
            project_id  INTEGER REFERENCES projects(id) ON DELETE SET NULL
        );

        CREATE TABLE IF NOT EXISTS tool_executions (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            tool_name     TEXT NOT NULL,
            project_id    INTEGER,
            session_id    TEXT NOT NULL,
            started_at    INTEGER NOT NULL,
            ended_at      INTEGER,
            status        TEXT,
            input_size    INTEGER NOT NULL DEFAULT 0,
            output_size   INTEGER,
            error_message TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_ticket ON tasks(ticket_id);
        CREATE INDEX IF NOT EXISTS idx_tickets_queue ON tickets(queue_id, queue_status);
        CREATE INDEX IF NOT EXISTS idx_tasks_queue ON tasks(queue_id, queue_status);
        CREATE INDEX IF NOT EXISTS idx_files_project ON files(project_id);
        "#,
    ),
    (
        "0002_queue_item_timing",
        r#"
        ALTER TABLE tickets ADD COLUMN queue_started_at INTEGER;
        ALTER TABLE tickets ADD COLUMN queue_ended_at INTEGER;
        ALTER TABLE tickets ADD COLUMN queue_error_message TEXT;
        ALTER TABLE tasks ADD COLUMN queue_started_at INTEGER;
        ALTER TABLE tasks ADD COLUMN queue_ended_at INTEGER;
        ALTER TABLE tasks ADD COLUMN queue_error_message TEXT;
        "#,
    ),
];
