//! Price-history store.
//!
//! A small embedded database tracking every listing the engine has seen,
//! with an append-only price history per listing. Price movement is judged
//! against the *first* recorded price, not the previous one.

use chrono::Utc;
use feedlens_protocol::{HistoryStats, ListingSnapshot, PricePoint};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use thiserror::Error;

/// History error type
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, HistoryError>;

/// A tracked listing with its full price history.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedItem {
    pub id: String,
    pub title: String,
    pub current_price: f64,
    pub url: String,
    pub image_url: Option<String>,
    pub location: Option<String>,
    pub seller: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub first_seen: i64,
    pub last_checked: i64,
    /// Oldest first.
    pub history: Vec<PricePoint>,
}

impl TrackedItem {
    fn first_price(&self) -> Option<f64> {
        self.history.first().map(|p| p.price)
    }

    /// Price movement needs at least two observations to mean anything.
    pub fn has_dropped(&self) -> bool {
        self.history.len() >= 2
            && self.first_price().is_some_and(|first| self.current_price < first)
    }

    pub fn has_increased(&self) -> bool {
        self.history.len() >= 2
            && self.first_price().is_some_and(|first| self.current_price > first)
    }
}

/// SQLite-backed price tracker.
pub struct PriceHistory {
    conn: Connection,
}

impl PriceHistory {
    /// Open (creating if needed) the history database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(&conn)?;
        Ok(Self { conn })
    }

    fn initialize(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                current_price REAL NOT NULL,
                url TEXT NOT NULL,
                image_url TEXT,
                location TEXT,
                seller TEXT,
                first_seen INTEGER NOT NULL,
                last_checked INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS price_points (
                item_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                price REAL NOT NULL,
                at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_price_points_item
            ON price_points(item_id, at);
            "#,
        )?;
        Ok(())
    }

    /// Save or update a listing observation.
    ///
    /// New listings get an initial price point; existing listings get their
    /// metadata refreshed and a new price point appended only when the
    /// price actually changed. Optional fields never overwrite a known
    /// value with nothing.
    pub fn save_item(&self, snapshot: &ListingSnapshot) -> Result<TrackedItem> {
        let now = Utc::now().timestamp_millis();
        let existing = self.get_item(&snapshot.id)?;

        match existing {
            Some(previous) => {
                self.conn.execute(
                    r#"
                    UPDATE items
                    SET title = ?2,
                        current_price = ?3,
                        url = ?4,
                        image_url = COALESCE(?5, image_url),
                        location = COALESCE(?6, location),
                        seller = COALESCE(?7, seller),
                        last_checked = ?8
                    WHERE id = ?1
                    "#,
                    params![
                        snapshot.id,
                        snapshot.title,
                        snapshot.price,
                        snapshot.url,
                        snapshot.image_url,
                        snapshot.location,
                        snapshot.seller,
                        now,
                    ],
                )?;
                if previous.current_price != snapshot.price {
                    self.conn.execute(
                        "INSERT INTO price_points (item_id, price, at) VALUES (?1, ?2, ?3)",
                        params![snapshot.id, snapshot.price, now],
                    )?;
                }
            }
            None => {
                self.conn.execute(
                    r#"
                    INSERT INTO items
                        (id, title, current_price, url, image_url, location, seller,
                         first_seen, last_checked)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                    "#,
                    params![
                        snapshot.id,
                        snapshot.title,
                        snapshot.price,
                        snapshot.url,
                        snapshot.image_url,
                        snapshot.location,
                        snapshot.seller,
                        now,
                    ],
                )?;
                self.conn.execute(
                    "INSERT INTO price_points (item_id, price, at) VALUES (?1, ?2, ?3)",
                    params![snapshot.id, snapshot.price, now],
                )?;
            }
        }

        self.get_item(&snapshot.id)?
            .ok_or_else(|| HistoryError::Db(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_item(&self, id: &str) -> Result<Option<TrackedItem>> {
        let item = self
            .conn
            .query_row(
                r#"
                SELECT id, title, current_price, url, image_url, location, seller,
                       first_seen, last_checked
                FROM items WHERE id = ?1
                "#,
                params![id],
                row_to_item,
            )
            .optional()?;

        let Some(mut item) = item else {
            return Ok(None);
        };
        item.history = self.history_of(id)?;
        Ok(Some(item))
    }

    fn history_of(&self, id: &str) -> Result<Vec<PricePoint>> {
        let mut stmt = self
            .conn
            .prepare("SELECT price, at FROM price_points WHERE item_id = ?1 ORDER BY at ASC")?;
        let points = stmt
            .query_map(params![id], |row| {
                Ok(PricePoint {
                    price: row.get(0)?,
                    at: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(points)
    }

    /// Every tracked listing, oldest first.
    pub fn all_items(&self) -> Result<Vec<TrackedItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, title, current_price, url, image_url, location, seller,
                   first_seen, last_checked
            FROM items ORDER BY first_seen ASC, id ASC
            "#,
        )?;
        let mut items = stmt
            .query_map([], row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for item in &mut items {
            item.history = self.history_of(&item.id)?;
        }
        Ok(items)
    }

    /// Listings whose current price is below the first recorded price.
    pub fn price_drops(&self) -> Result<Vec<TrackedItem>> {
        Ok(self
            .all_items()?
            .into_iter()
            .filter(TrackedItem::has_dropped)
            .collect())
    }

    /// Listings whose current price is above the first recorded price.
    pub fn price_increases(&self) -> Result<Vec<TrackedItem>> {
        Ok(self
            .all_items()?
            .into_iter()
            .filter(TrackedItem::has_increased)
            .collect())
    }

    pub fn delete_item(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM price_points WHERE item_id = ?1", params![id])?;
        self.conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM price_points", [])?;
        self.conn.execute("DELETE FROM items", [])?;
        Ok(())
    }

    pub fn stats(&self) -> Result<HistoryStats> {
        let items = self.all_items()?;
        let drops = items.iter().filter(|i| i.has_dropped()).count();
        let increases = items.iter().filter(|i| i.has_increased()).count();
        Ok(HistoryStats {
            total_items: items.len(),
            price_drops: drops,
            price_increases: increases,
            unchanged: items.len() - drops - increases,
        })
    }
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<TrackedItem> {
    Ok(TrackedItem {
        id: row.get(0)?,
        title: row.get(1)?,
        current_price: row.get(2)?,
        url: row.get(3)?,
        image_url: row.get(4)?,
        location: row.get(5)?,
        seller: row.get(6)?,
        first_seen: row.get(7)?,
        last_checked: row.get(8)?,
        history: Vec::new(),
    })
}
