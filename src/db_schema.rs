use sqlx::SqlitePool;

// Schema definitions
pub const SLIDESHOWS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS slideshows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,

    -- Scope: every submission of one event, or of all events run by one partner
    scope_kind TEXT NOT NULL CHECK(scope_kind IN ('event', 'partner')),
    scope_id TEXT NOT NULL,

    -- Per-slideshow overrides of the global defaults
    display_duration_ms INTEGER,
    target_slides INTEGER,

    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

pub const SUBMISSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL,
    partner_id TEXT NOT NULL,
    image_url TEXT NOT NULL,

    -- Pixel dimensions of the composited result, NULL when unknown
    width INTEGER,
    height INTEGER,

    -- Visibility
    hidden BOOLEAN NOT NULL DEFAULT FALSE,
    archived BOOLEAN NOT NULL DEFAULT FALSE,

    -- Global play counter across every slideshow
    play_count INTEGER NOT NULL DEFAULT 0,

    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

// Per-slideshow play counters. Rows are created lazily on first play.
pub const SLIDESHOW_PLAYS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS slideshow_plays (
    slideshow_id INTEGER NOT NULL,
    submission_id INTEGER NOT NULL,
    play_count INTEGER NOT NULL DEFAULT 0,
    last_played_at DATETIME,
    PRIMARY KEY (slideshow_id, submission_id),
    FOREIGN KEY (slideshow_id) REFERENCES slideshows(id) ON DELETE CASCADE,
    FOREIGN KEY (submission_id) REFERENCES submissions(id) ON DELETE CASCADE
)
"#;

pub const SLIDESHOW_HIDDEN_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS slideshow_hidden (
    slideshow_id INTEGER NOT NULL,
    submission_id INTEGER NOT NULL,
    created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (slideshow_id, submission_id),
    FOREIGN KEY (slideshow_id) REFERENCES slideshows(id) ON DELETE CASCADE,
    FOREIGN KEY (submission_id) REFERENCES submissions(id) ON DELETE CASCADE
)
"#;

pub const SCHEMA_SQL: &[&str] = &[
    SLIDESHOWS_TABLE,
    SUBMISSIONS_TABLE,
    "CREATE INDEX IF NOT EXISTS idx_submissions_event_id ON submissions(event_id);",
    "CREATE INDEX IF NOT EXISTS idx_submissions_partner_id ON submissions(partner_id);",
    "CREATE INDEX IF NOT EXISTS idx_submissions_visible ON submissions(archived, hidden);",
    SLIDESHOW_PLAYS_TABLE,
    SLIDESHOW_HIDDEN_TABLE,
];

pub async fn initialize_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for sql in SCHEMA_SQL {
        sqlx::query(sql).execute(pool).await?;
    }
    Ok(())
}
