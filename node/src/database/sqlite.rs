// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
// Copyright (c) DUSK NETWORK. All rights reserved.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use node_data::ledger::{Height, Op};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use tracing::{debug, info};

use super::conf::Params;
use super::Gateway;

// Folder containing the mirror database
const MIRROR_FOLDER_NAME: &str = "mirror";
/// The name of the mirror SQLite database.
const SQLITE_DB_NAME: &str = "mirror.sqlite3";

/// SQLite backed storage for mirrored ops and the sync checkpoint.
#[derive(Debug, Clone)]
pub struct SqliteGateway {
    // Writer pool (single connection) to the SQLite database
    writer: SqlitePool,
    // Reader pool (read-only) for downstream queries
    reader: SqlitePool,
}

impl SqliteGateway {
    fn mirror_folder_path<P: AsRef<Path>>(base_path: P) -> Result<PathBuf> {
        let path = base_path.as_ref().join(MIRROR_FOLDER_NAME);

        // Recursively create the mirror folder if it doesn't exist already
        fs::create_dir_all(&path)
            .with_context(|| format!("creating directory {path:?}"))?;
        Ok(path)
    }

    /// Create or open the mirror database
    ///
    /// # Arguments
    ///
    /// * `base_path` - The path to the base folder where the mirror folder
    ///   resides in or will be created.
    /// * `params` - Storage configuration parameters.
    pub async fn create_or_open<P: AsRef<Path>>(
        base_path: P,
        params: Params,
    ) -> Result<Self> {
        let path = Self::mirror_folder_path(base_path)?;
        info!("Opening SQLite mirror db in {path:?} with conf {params}");

        let db_options = SqliteConnectOptions::new()
            // append the database name to the path
            .filename(path.join(SQLITE_DB_NAME))
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(params.busy_timeout)
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(db_options.clone())
            .await
            .context("opening mirror database")?;

        sqlx::migrate!("./migrations")
            .run(&writer)
            .await
            .context("running mirror migrations")?;

        let reader = SqlitePoolOptions::new()
            .max_connections(params.reader_max_connections)
            .connect_with(db_options.read_only(true))
            .await
            .context("opening mirror reader pool")?;

        Ok(Self { writer, reader })
    }

    /// Fetch all ops stored for the given height, in application order.
    pub async fn fetch_ops_by_height(&self, height: Height) -> Result<Vec<Op>> {
        let rows = sqlx::query_as::<_, data::StoredOp>(
            r#"SELECT op_order, height, is_executed, tx_hash, op_hash, public_key, signature, op_str
            FROM ops WHERE height = ? ORDER BY id"#,
        )
        .bind(to_sql(height)?)
        .fetch_all(&self.reader)
        .await?;

        rows.into_iter().map(Op::try_from).collect()
    }

    /// Fetch the first stored op with the given op hash
    pub async fn fetch_op_by_hash(&self, op_hash: &str) -> Result<Option<Op>> {
        let row = sqlx::query_as::<_, data::StoredOp>(
            r#"SELECT op_order, height, is_executed, tx_hash, op_hash, public_key, signature, op_str
            FROM ops WHERE op_hash = ? ORDER BY id LIMIT 1"#,
        )
        .bind(op_hash)
        .fetch_optional(&self.reader)
        .await?;

        row.map(Op::try_from).transpose()
    }

    pub async fn count_ops(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM ops"#)
            .fetch_one(&self.reader)
            .await?;

        Ok(u64::try_from(count)?)
    }

    /// Check if the given height has been applied, even without ops
    pub async fn is_height_synced(&self, height: Height) -> Result<bool> {
        let r: Option<i64> = sqlx::query_scalar(
            r#"SELECT height FROM synced_heights WHERE height = ?"#,
        )
        .bind(to_sql(height)?)
        .fetch_optional(&self.reader)
        .await?;

        Ok(r.is_some())
    }
}

#[async_trait]
impl Gateway for SqliteGateway {
    async fn read_checkpoint(&self) -> Result<Option<Height>> {
        let height: Option<i64> = sqlx::query_scalar(
            r#"SELECT height FROM sync_checkpoint WHERE id = 0"#,
        )
        .fetch_optional(&self.writer)
        .await?;

        height
            .map(|h| {
                Height::try_from(h)
                    .with_context(|| format!("invalid checkpoint {h}"))
            })
            .transpose()
    }

    async fn write_checkpoint(&self, height: Height) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO sync_checkpoint (id, height) VALUES (0, ?)
            ON CONFLICT(id) DO UPDATE SET height = MAX(height, excluded.height)"#,
        )
        .bind(to_sql(height)?)
        .execute(&self.writer)
        .await?;

        debug!(event = "checkpoint stored", height);
        Ok(())
    }

    async fn apply_height(&self, height: Height, ops: &mut [Op]) -> Result<()> {
        if let Some(op) = ops.iter().find(|op| op.height != height) {
            bail!(
                "op {} at height {} does not belong to height {height}",
                op.op_hash,
                op.height
            );
        }

        let block_height = to_sql(height)?;
        let orders = ops
            .iter()
            .map(|op| to_sql(op.order))
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self.writer.begin().await?;

        let mut inserted = 0;
        for (op, order) in ops.iter().zip(orders) {
            inserted += sqlx::query(
                r#"INSERT OR IGNORE INTO ops (op_order, height, is_executed, tx_hash, op_hash, public_key, signature, op_str)
                VALUES (?, ?, TRUE, ?, ?, ?, ?, ?)"#,
            )
            .bind(order)
            .bind(block_height)
            .bind(&op.tx_hash)
            .bind(&op.op_hash)
            .bind(&op.public_key)
            .bind(&op.signature)
            .bind(&op.op_str)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        sqlx::query(
            r#"INSERT OR REPLACE INTO synced_heights (height, op_count)
            VALUES (?, (SELECT COUNT(*) FROM ops WHERE height = ?))"#,
        )
        .bind(block_height)
        .bind(block_height)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        for op in ops.iter_mut() {
            op.is_executed = true;
        }

        info!(
            event = "height applied",
            height,
            ops = ops.len(),
            inserted,
        );

        Ok(())
    }
}

/// Converts a height or order index to the SQLite integer type.
///
/// Values above `i64::MAX` are rejected instead of wrapping.
fn to_sql(value: u64) -> Result<i64> {
    i64::try_from(value)
        .with_context(|| format!("{value} does not fit a SQLite integer"))
}

mod data {
    use node_data::ledger::Op;
    use sqlx::FromRow;

    /// Op row as stored in the `ops` table.
    #[derive(Debug, Clone, FromRow)]
    pub struct StoredOp {
        pub op_order: i64,
        pub height: i64,
        pub is_executed: bool,
        pub tx_hash: String,
        pub op_hash: String,
        pub public_key: String,
        pub signature: String,
        pub op_str: String,
    }

    impl TryFrom<StoredOp> for Op {
        type Error = anyhow::Error;

        fn try_from(row: StoredOp) -> Result<Self, Self::Error> {
            Ok(Op {
                order: u64::try_from(row.op_order)?,
                height: u64::try_from(row.height)?,
                is_executed: row.is_executed,
                tx_hash: row.tx_hash,
                op_hash: row.op_hash,
                public_key: row.public_key,
                signature: row.signature,
                op_str: row.op_str,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(order: u64, height: Height, op_hash: &str) -> Op {
        Op {
            order,
            height,
            is_executed: false,
            tx_hash: format!("tx-{op_hash}"),
            op_hash: op_hash.to_owned(),
            public_key: "02aa".into(),
            signature: "30bb".into(),
            op_str: format!(r#"{{"op":"{op_hash}"}}"#),
        }
    }

    async fn gateway(dir: &tempfile::TempDir) -> SqliteGateway {
        SqliteGateway::create_or_open(dir.path(), Params::default())
            .await
            .expect("mirror db opens")
    }

    #[tokio::test]
    async fn test_apply_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let db = gateway(&dir).await;

        let mut ops = vec![op(0, 5, "aa"), op(1, 5, "bb")];
        db.apply_height(5, &mut ops).await.unwrap();
        assert!(ops.iter().all(|op| op.is_executed));

        let stored = db.fetch_ops_by_height(5).await.unwrap();
        assert_eq!(stored, ops);
        assert_eq!(
            db.fetch_op_by_hash("bb").await.unwrap(),
            Some(ops[1].clone())
        );
        assert_eq!(db.fetch_op_by_hash("cc").await.unwrap(), None);
        assert!(db.is_height_synced(5).await.unwrap());
        assert!(!db.is_height_synced(6).await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = gateway(&dir).await;

        let mut first = vec![op(0, 7, "aa"), op(1, 7, "bb")];
        db.apply_height(7, &mut first).await.unwrap();
        let once = db.fetch_ops_by_height(7).await.unwrap();

        // Same ops re-translated after a restart get new order indices
        let mut again = vec![op(10, 7, "aa"), op(11, 7, "bb")];
        db.apply_height(7, &mut again).await.unwrap();
        let twice = db.fetch_ops_by_height(7).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(db.count_ops().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_apply_empty_height() {
        let dir = tempfile::tempdir().unwrap();
        let db = gateway(&dir).await;

        db.apply_height(3, &mut []).await.unwrap();
        assert!(db.is_height_synced(3).await.unwrap());
        assert_eq!(db.count_ops().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_apply_rejects_foreign_ops() {
        let dir = tempfile::tempdir().unwrap();
        let db = gateway(&dir).await;

        let mut ops = vec![op(0, 3, "aa"), op(1, 4, "bb")];
        assert!(db.apply_height(3, &mut ops).await.is_err());
        assert_eq!(db.count_ops().await.unwrap(), 0);
        assert!(ops.iter().all(|op| !op.is_executed));
    }

    #[tokio::test]
    async fn test_out_of_range_height_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = gateway(&dir).await;

        let huge = i64::MAX as u64 + 1;
        let mut ops = vec![op(0, huge, "aa")];
        assert!(db.apply_height(huge, &mut ops).await.is_err());
        assert!(!ops[0].is_executed);
        assert!(db.write_checkpoint(huge).await.is_err());
        assert!(db.fetch_ops_by_height(huge).await.is_err());

        assert_eq!(db.count_ops().await.unwrap(), 0);
        assert_eq!(db.read_checkpoint().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_checkpoint_never_decreases() {
        let dir = tempfile::tempdir().unwrap();

        {
            let db = gateway(&dir).await;
            assert_eq!(db.read_checkpoint().await.unwrap(), None);

            db.write_checkpoint(10).await.unwrap();
            db.write_checkpoint(8).await.unwrap();
            assert_eq!(db.read_checkpoint().await.unwrap(), Some(10));
        }

        // Survives reopening
        let db = gateway(&dir).await;
        assert_eq!(db.read_checkpoint().await.unwrap(), Some(10));
        db.write_checkpoint(11).await.unwrap();
        assert_eq!(db.read_checkpoint().await.unwrap(), Some(11));
    }
}
