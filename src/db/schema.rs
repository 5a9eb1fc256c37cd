use sqlx::SqlitePool;

pub const PINS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    latitude REAL NOT NULL CHECK(latitude BETWEEN -90.0 AND 90.0),
    longitude REAL NOT NULL CHECK(longitude BETWEEN -180.0 AND 180.0),

    -- Paging cursor into the remote search results
    photos_page_num INTEGER NOT NULL DEFAULT 0 CHECK(photos_page_num >= 0),
    photos_total_pages INTEGER NOT NULL DEFAULT 0 CHECK(photos_total_pages >= 0),

    created_at DATETIME NOT NULL
)
"#;

pub const PHOTOS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pin_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    image_data BLOB,
    created_at DATETIME NOT NULL,
    FOREIGN KEY (pin_id) REFERENCES pins(id) ON DELETE CASCADE
)
"#;

pub const SCHEMA_SQL: &[&str] = &[
    PINS_TABLE,
    PHOTOS_TABLE,
    "CREATE INDEX IF NOT EXISTS idx_photos_pin_id ON photos(pin_id);",
    "CREATE INDEX IF NOT EXISTS idx_photos_pin_url ON photos(pin_id, url);",
];

pub async fn initialize_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for sql in SCHEMA_SQL {
        sqlx::query(sql).execute(pool).await?;
    }
    Ok(())
}
