//! PostgreSQL link store for production use.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE template_links (
//!     child_id  BIGINT NOT NULL,
//!     parent_id BIGINT NOT NULL,
//!     PRIMARY KEY (child_id, parent_id)
//! );
//! CREATE INDEX template_links_parent ON template_links (parent_id);
//!
//! CREATE TABLE template_closure (
//!     node_id     BIGINT NOT NULL,
//!     ancestor_id BIGINT NOT NULL,
//!     PRIMARY KEY (node_id, ancestor_id)
//! );
//! CREATE INDEX template_closure_ancestor ON template_closure (ancestor_id);
//! ```
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10, at least 2)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, Postgres, Row, Transaction};
use std::time::Duration;

use crate::types::{
    ClosureDelta, ClosureRow, ClosureSnapshot, DirectEdge, LinkChange, NodeId, NodeSetMap,
};
use crate::types::closure::{map_to_edges, map_to_rows};
use super::{LinkStore, LinkWriter};

/// Schema for the direct-link and closure tables.
pub const LINK_TABLES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS template_links (
    child_id  BIGINT NOT NULL,
    parent_id BIGINT NOT NULL,
    PRIMARY KEY (child_id, parent_id)
);
CREATE INDEX IF NOT EXISTS template_links_parent ON template_links (parent_id);

CREATE TABLE IF NOT EXISTS template_closure (
    node_id     BIGINT NOT NULL,
    ancestor_id BIGINT NOT NULL,
    PRIMARY KEY (node_id, ancestor_id)
);
CREATE INDEX IF NOT EXISTS template_closure_ancestor ON template_closure (ancestor_id);
"#;

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/templates".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A link scheduled for removal does not exist.
    #[error("Link not found: {0}")]
    LinkNotFound(DirectEdge),
}

/// PostgreSQL link store.
///
/// Reads are batched with `= ANY($1)`. Writes go through a [`PostgresWriter`]
/// whose transaction locks both tables when the session opens, so a batch
/// planned inside the session cannot interleave with another writer.
pub struct PostgresLinkStore {
    pool: PgPool,
}

impl PostgresLinkStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        // An open write session holds one connection while reads need another.
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(2))
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the link and closure tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        (&self.pool).execute(LINK_TABLES_SCHEMA).await?;
        Ok(())
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

fn to_bigints(nodes: &[NodeId]) -> Vec<i64> {
    nodes.iter().map(NodeId::to_i64).collect()
}

fn pair_columns<I>(pairs: I) -> (Vec<i64>, Vec<i64>)
where
    I: IntoIterator<Item = (NodeId, NodeId)>,
{
    pairs
        .into_iter()
        .map(|(left, right)| (left.to_i64(), right.to_i64()))
        .unzip()
}

#[async_trait]
impl LinkStore for PostgresLinkStore {
    type Error = PostgresError;
    type Writer = PostgresWriter;

    async fn direct_parents(&self, nodes: &[NodeId]) -> Result<NodeSetMap, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT child_id, parent_id
            FROM template_links
            WHERE child_id = ANY($1)
            ORDER BY child_id, parent_id
            "#
        )
        .bind(to_bigints(nodes))
        .fetch_all(&self.pool)
        .await?;

        let mut parents = NodeSetMap::new();
        for row in &rows {
            let child: i64 = row.try_get("child_id")?;
            let parent: i64 = row.try_get("parent_id")?;
            parents.entry(NodeId::from_i64(child)).or_default().insert(NodeId::from_i64(parent));
        }
        Ok(parents)
    }

    async fn load_closure(&self, nodes: &[NodeId]) -> Result<ClosureSnapshot, Self::Error> {
        let ids = to_bigints(nodes);
        let rows = sqlx::query(
            r#"
            SELECT node_id, ancestor_id
            FROM template_closure
            WHERE node_id = ANY($1) OR ancestor_id = ANY($1)
            ORDER BY node_id, ancestor_id
            "#
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let requested: std::collections::BTreeSet<NodeId> = nodes.iter().copied().collect();
        let mut snapshot = ClosureSnapshot::default();
        for row in &rows {
            let node = NodeId::from_i64(row.try_get("node_id")?);
            let ancestor = NodeId::from_i64(row.try_get("ancestor_id")?);
            if requested.contains(&node) {
                snapshot.ancestors.entry(node).or_default().insert(ancestor);
            }
            if requested.contains(&ancestor) {
                snapshot.descendants.entry(ancestor).or_default().insert(node);
            }
        }
        Ok(snapshot)
    }

    async fn begin_write(&self) -> Result<Self::Writer, Self::Error> {
        let mut tx = self.pool.begin().await?;

        // Self-conflicting mode: one session at a time, plain reads still pass.
        sqlx::query("LOCK TABLE template_links, template_closure IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        Ok(PostgresWriter { tx })
    }

    async fn direct_edges(&self) -> Result<Vec<DirectEdge>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT child_id, parent_id
            FROM template_links
            ORDER BY child_id, parent_id
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let child: i64 = row.try_get("child_id")?;
                let parent: i64 = row.try_get("parent_id")?;
                Ok(DirectEdge::new(NodeId::from_i64(child), NodeId::from_i64(parent)))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(PostgresError::from)
    }

    async fn closure_rows(&self) -> Result<Vec<ClosureRow>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT node_id, ancestor_id
            FROM template_closure
            ORDER BY node_id, ancestor_id
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let node: i64 = row.try_get("node_id")?;
                let ancestor: i64 = row.try_get("ancestor_id")?;
                Ok(ClosureRow::new(NodeId::from_i64(node), NodeId::from_i64(ancestor)))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(PostgresError::from)
    }
}

/// Write session over a [`PostgresLinkStore`].
///
/// Holds an open transaction that has locked both tables; dropping it
/// without committing rolls the transaction back.
pub struct PostgresWriter {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LinkWriter for PostgresWriter {
    type Error = PostgresError;

    async fn commit(self, links: &LinkChange, closure: &ClosureDelta) -> Result<(), Self::Error> {
        let mut tx = self.tx;

        let removed = map_to_edges(&links.remove);
        if !removed.is_empty() {
            let (children, parents) = pair_columns(removed.iter().map(|e| (e.child, e.parent)));

            // Dropping the transaction on error rolls it back.
            let existing = fetch_links_in(&mut tx, &children).await?;
            if let Some(missing) = removed.iter().find(|edge| !existing.contains(*edge)) {
                return Err(PostgresError::LinkNotFound(*missing));
            }

            sqlx::query(
                r#"
                DELETE FROM template_links l
                USING UNNEST($1::bigint[], $2::bigint[]) AS d(child_id, parent_id)
                WHERE l.child_id = d.child_id AND l.parent_id = d.parent_id
                "#
            )
            .bind(&children)
            .bind(&parents)
            .execute(&mut *tx)
            .await?;
        }

        let deleted = map_to_rows(&closure.delete);
        if !deleted.is_empty() {
            let (nodes, ancestors) = pair_columns(deleted.iter().map(|r| (r.node, r.ancestor)));
            sqlx::query(
                r#"
                DELETE FROM template_closure c
                USING UNNEST($1::bigint[], $2::bigint[]) AS d(node_id, ancestor_id)
                WHERE c.node_id = d.node_id AND c.ancestor_id = d.ancestor_id
                "#
            )
            .bind(&nodes)
            .bind(&ancestors)
            .execute(&mut *tx)
            .await?;
        }

        let inserted = map_to_edges(&links.insert);
        if !inserted.is_empty() {
            let (children, parents) = pair_columns(inserted.iter().map(|e| (e.child, e.parent)));
            sqlx::query(
                r#"
                INSERT INTO template_links (child_id, parent_id)
                SELECT * FROM UNNEST($1::bigint[], $2::bigint[])
                ON CONFLICT DO NOTHING
                "#
            )
            .bind(&children)
            .bind(&parents)
            .execute(&mut *tx)
            .await?;
        }

        let rows = map_to_rows(&closure.insert);
        if !rows.is_empty() {
            let (nodes, ancestors) = pair_columns(rows.iter().map(|r| (r.node, r.ancestor)));
            sqlx::query(
                r#"
                INSERT INTO template_closure (node_id, ancestor_id)
                SELECT * FROM UNNEST($1::bigint[], $2::bigint[])
                ON CONFLICT DO NOTHING
                "#
            )
            .bind(&nodes)
            .bind(&ancestors)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            links_removed = removed.len(),
            links_inserted = inserted.len(),
            rows_deleted = deleted.len(),
            rows_inserted = rows.len(),
            "Applied link changes"
        );

        Ok(())
    }
}

async fn fetch_links_in(
    tx: &mut Transaction<'_, Postgres>,
    children: &[i64],
) -> Result<std::collections::BTreeSet<DirectEdge>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT child_id, parent_id
        FROM template_links
        WHERE child_id = ANY($1)
        "#
    )
    .bind(children)
    .fetch_all(&mut **tx)
    .await?;

    rows.iter()
        .map(|row| {
            let child: i64 = row.try_get("child_id")?;
            let parent: i64 = row.try_get("parent_id")?;
            Ok(DirectEdge::new(NodeId::from_i64(child), NodeId::from_i64(parent)))
        })
        .collect()
}
