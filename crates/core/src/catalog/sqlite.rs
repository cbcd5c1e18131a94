//! SQLite-backed product catalog implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{CatalogError, CatalogItem, CatalogUpdate, NewCatalogItem, ProductCatalog};

/// SQLite-backed product catalog.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Create a new SQLite catalog, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path).map_err(map_db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite catalog (useful for testing).
    pub fn in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory().map_err(map_db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Recreate the pre-media schema so tests can exercise the stripped
    /// insert path.
    #[cfg(test)]
    pub(crate) fn drop_media_columns_for_test(&self) -> Result<(), CatalogError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "ALTER TABLE products DROP COLUMN image_url;
             ALTER TABLE products DROP COLUMN image_alt;",
        )
        .map_err(map_db_err)
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CatalogError> {
        conn.execute_batch(
            r#"
            -- Canonical catalog rows (one per identity URL)
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL DEFAULT '',
                source TEXT NOT NULL,
                product_type TEXT NOT NULL,
                external_id TEXT,
                image_url TEXT,
                image_alt TEXT,
                rating REAL,
                rating_count INTEGER,
                source_last_updated TEXT,
                metadata TEXT,
                slug TEXT UNIQUE,
                scraped_at TEXT NOT NULL,
                banned INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_products_source ON products(source);

            -- Tag associations (replaced in full on each tagged write)
            CREATE TABLE IF NOT EXISTS product_tags (
                product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
                tag TEXT NOT NULL,
                PRIMARY KEY (product_id, tag)
            );

            CREATE INDEX IF NOT EXISTS idx_product_tags_tag ON product_tags(tag);
            "#,
        )
        .map_err(map_db_err)
    }

    fn row_to_item(row: &Row<'_>) -> rusqlite::Result<CatalogItem> {
        let source_last_updated: Option<String> = row.get(11)?;
        let metadata: Option<String> = row.get(12)?;
        let scraped_at: String = row.get(14)?;

        Ok(CatalogItem {
            id: row.get(0)?,
            name: row.get(1)?,
            url: row.get(2)?,
            description: row.get(3)?,
            source: row.get(4)?,
            product_type: row.get(5)?,
            external_id: row.get(6)?,
            image_url: row.get(7)?,
            image_alt: row.get(8)?,
            rating: row.get(9)?,
            rating_count: row.get(10)?,
            source_last_updated: source_last_updated.and_then(parse_timestamp),
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            slug: row.get(13)?,
            scraped_at: parse_timestamp(scraped_at).unwrap_or_else(Utc::now),
            tags: Vec::new(), // Filled in by the caller
            banned: row.get::<_, i64>(15)? != 0,
        })
    }

    fn tags_for(conn: &Connection, id: i64) -> Result<Vec<String>, CatalogError> {
        let mut stmt = conn
            .prepare("SELECT tag FROM product_tags WHERE product_id = ? ORDER BY tag")
            .map_err(map_db_err)?;
        let tags = stmt
            .query_map(params![id], |row| row.get(0))
            .map_err(map_db_err)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(map_db_err)?;
        Ok(tags)
    }
}

const ITEM_COLUMNS: &str = "id, name, url, description, source, product_type, external_id, \
     image_url, image_alt, rating, rating_count, source_last_updated, metadata, slug, \
     scraped_at, banned";

impl ProductCatalog for SqliteCatalog {
    fn find_by_url(&self, url: &str) -> Result<Option<CatalogItem>, CatalogError> {
        let conn = self.conn.lock().unwrap();

        let item = conn
            .query_row(
                &format!("SELECT {} FROM products WHERE url = ?", ITEM_COLUMNS),
                params![url],
                Self::row_to_item,
            )
            .optional()
            .map_err(map_db_err)?;

        match item {
            Some(mut item) => {
                item.tags = Self::tags_for(&conn, item.id)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    fn slug_exists(&self, slug: &str) -> Result<bool, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM products WHERE slug = ?",
                params![slug],
                |row| row.get(0),
            )
            .map_err(map_db_err)?;
        Ok(count > 0)
    }

    fn insert(&self, item: &NewCatalogItem) -> Result<i64, CatalogError> {
        let conn = self.conn.lock().unwrap();

        let metadata_json = item
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| CatalogError::Serialization(e.to_string()))?;

        // Media columns are named only when carrying a value, so databases
        // created before those columns existed accept stripped inserts.
        let mut columns = vec![
            "name",
            "url",
            "description",
            "source",
            "product_type",
            "external_id",
            "rating",
            "rating_count",
            "source_last_updated",
            "metadata",
            "slug",
            "scraped_at",
            "banned",
        ];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(item.name.clone()),
            Box::new(item.url.clone()),
            Box::new(item.description.clone()),
            Box::new(item.source.clone()),
            Box::new(item.product_type.clone()),
            Box::new(item.external_id.clone()),
            Box::new(item.rating),
            Box::new(item.rating_count),
            Box::new(item.source_last_updated.map(|t| t.to_rfc3339())),
            Box::new(metadata_json),
            Box::new(item.slug.clone()),
            Box::new(item.scraped_at.to_rfc3339()),
            Box::new(item.banned as i64),
        ];

        if item.image_url.is_some() || item.image_alt.is_some() {
            columns.push("image_url");
            values.push(Box::new(item.image_url.clone()));
            columns.push("image_alt");
            values.push(Box::new(item.image_alt.clone()));
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO products ({}) VALUES ({})",
            columns.join(", "),
            placeholders
        );

        let value_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        conn.execute(&sql, value_refs.as_slice())
            .map_err(map_db_err)?;

        Ok(conn.last_insert_rowid())
    }

    fn update(&self, id: i64, update: &CatalogUpdate) -> Result<(), CatalogError> {
        let conn = self.conn.lock().unwrap();

        let metadata_json = update
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| CatalogError::Serialization(e.to_string()))?;

        let mut assignments = vec![
            "name = ?",
            "description = ?",
            "product_type = ?",
            "rating = ?",
            "rating_count = ?",
            "source_last_updated = ?",
            "metadata = ?",
            "slug = COALESCE(slug, ?)",
            "banned = ?",
        ];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(update.name.clone()),
            Box::new(update.description.clone()),
            Box::new(update.product_type.clone()),
            Box::new(update.rating),
            Box::new(update.rating_count),
            Box::new(update.source_last_updated.map(|t| t.to_rfc3339())),
            Box::new(metadata_json),
            Box::new(update.slug_if_absent.clone()),
            Box::new(update.banned as i64),
        ];

        if update.image_url.is_some() || update.image_alt.is_some() {
            assignments.push("image_url = ?");
            values.push(Box::new(update.image_url.clone()));
            assignments.push("image_alt = ?");
            values.push(Box::new(update.image_alt.clone()));
        }

        values.push(Box::new(id));
        let sql = format!(
            "UPDATE products SET {} WHERE id = ?",
            assignments.join(", ")
        );

        let value_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let changed = conn
            .execute(&sql, value_refs.as_slice())
            .map_err(map_db_err)?;

        if changed == 0 {
            return Err(CatalogError::NotFound(format!("product id {}", id)));
        }
        Ok(())
    }

    fn replace_tags(&self, id: i64, tags: &[String]) -> Result<(), CatalogError> {
        let mut conn = self.conn.lock().unwrap();

        let tx = conn.transaction().map_err(map_db_err)?;
        tx.execute("DELETE FROM product_tags WHERE product_id = ?", params![id])
            .map_err(map_db_err)?;
        {
            let mut stmt = tx
                .prepare("INSERT OR IGNORE INTO product_tags (product_id, tag) VALUES (?, ?)")
                .map_err(map_db_err)?;
            for tag in tags {
                let tag = tag.trim();
                if tag.is_empty() {
                    continue;
                }
                stmt.execute(params![id, tag]).map_err(map_db_err)?;
            }
        }
        tx.commit().map_err(map_db_err)
    }

    fn get(&self, id: i64) -> Result<CatalogItem, CatalogError> {
        let conn = self.conn.lock().unwrap();

        let mut item = conn
            .query_row(
                &format!("SELECT {} FROM products WHERE id = ?", ITEM_COLUMNS),
                params![id],
                Self::row_to_item,
            )
            .optional()
            .map_err(map_db_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("product id {}", id)))?;

        item.tags = Self::tags_for(&conn, id)?;
        Ok(item)
    }

    fn count(&self) -> Result<u64, CatalogError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))
            .map_err(map_db_err)?;
        Ok(count as u64)
    }
}

fn map_db_err(e: rusqlite::Error) -> CatalogError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        CatalogError::Duplicate(msg)
    } else if msg.contains("no such column") {
        CatalogError::SchemaMismatch(msg)
    } else {
        CatalogError::Database(msg)
    }
}

fn parse_timestamp(s: String) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
