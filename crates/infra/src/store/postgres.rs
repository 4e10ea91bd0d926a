//! Postgres-backed inventory store.
//!
//! Catalog records are kept as JSONB documents next to the columns the store
//! needs to lock, filter and constrain on. Every mutating operation runs in
//! one transaction; the rows of the units it touches are locked with
//! `SELECT ... FOR UPDATE` before their versions are checked, so concurrent
//! commits against the same unit serialize instead of overselling.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `23505` | `Conflict` | duplicate id or active batch number (partial unique index) |
//! | `40001` / `40P01` | `Concurrency` | serialization failure or deadlock |
//! | any other | `Backend` | connectivity, pool closed, decoding |
//!
//! ## Sync boundary
//!
//! The store traits are synchronous. Calls are bridged onto the ambient tokio
//! runtime with `block_in_place` + `Handle::block_on`, which requires a
//! multi-threaded runtime (the API server runs one).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockledger_core::{AggregateId, ShopId, UserId};
use stockledger_inventory::{
    LedgerEntry, LedgerEntryId, MovementKind, OriginKind, OriginRef, Reconciliation, replay_balance,
};
use stockledger_products::{Batch, BatchId, Product, ProductId, StockUnit, UnitBalance};

use super::query::{LedgerFilter, LedgerPage, Pagination};
use super::{
    CatalogStore, CommitReceipt, DocumentKind, DocumentStore, LedgerStore, ProductEdit,
    RecordedEntry, StoreError, StoreResult, StoredEvent, UnitAccess, WriteBatch,
};

/// Schema applied by [`PostgresInventoryStore::migrate`]. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    shop_id      UUID        NOT NULL,
    product_id   UUID        NOT NULL,
    barcode      TEXT,
    active       BOOLEAN     NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL,
    doc          JSONB       NOT NULL,
    PRIMARY KEY (shop_id, product_id)
);
CREATE INDEX IF NOT EXISTS products_barcode_idx ON products (shop_id, barcode) WHERE active;

CREATE TABLE IF NOT EXISTS batches (
    shop_id      UUID        NOT NULL,
    batch_id     UUID        NOT NULL,
    batch_number TEXT        NOT NULL,
    active       BOOLEAN     NOT NULL,
    expiry_date  TIMESTAMPTZ NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL,
    doc          JSONB       NOT NULL,
    PRIMARY KEY (shop_id, batch_id)
);
CREATE UNIQUE INDEX IF NOT EXISTS batches_active_number_idx
    ON batches (shop_id, batch_number) WHERE active;

CREATE TABLE IF NOT EXISTS ledger_entries (
    position          BIGSERIAL   PRIMARY KEY,
    entry_id          UUID        NOT NULL UNIQUE,
    shop_id           UUID        NOT NULL,
    product_id        UUID        NOT NULL,
    batch_id          UUID,
    kind              TEXT        NOT NULL,
    quantity          BIGINT      NOT NULL CHECK (quantity <> 0),
    resulting_balance BIGINT      NOT NULL,
    sequence          BIGINT      NOT NULL CHECK (sequence > 0),
    reason            TEXT,
    origin_kind       TEXT,
    origin_id         UUID,
    created_by        UUID,
    occurred_at       TIMESTAMPTZ NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS ledger_product_seq_idx
    ON ledger_entries (shop_id, product_id, sequence) WHERE batch_id IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS ledger_batch_seq_idx
    ON ledger_entries (shop_id, batch_id, sequence) WHERE batch_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS document_events (
    event_id        UUID        PRIMARY KEY,
    shop_id         UUID        NOT NULL,
    stream_id       UUID        NOT NULL,
    kind            TEXT        NOT NULL,
    sequence_number BIGINT      NOT NULL,
    event_type      TEXT        NOT NULL,
    event_version   INTEGER     NOT NULL,
    occurred_at     TIMESTAMPTZ NOT NULL,
    payload         JSONB       NOT NULL,
    UNIQUE (shop_id, stream_id, sequence_number)
);
"#;

/// Postgres-backed [`super::InventoryStore`].
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    fn run<T>(&self, fut: impl std::future::Future<Output = StoreResult<T>>) -> StoreResult<T> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            StoreError::Backend("PostgresInventoryStore requires a tokio runtime".to_string())
        })?;
        tokio::task::block_in_place(|| handle.block_on(fut))
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    #[instrument(skip(self, batch), fields(postings = batch.postings.len()), err)]
    async fn commit_async(&self, batch: WriteBatch) -> StoreResult<CommitReceipt> {
        let mut tx = self.begin().await?;

        // Lock every unit once, in posting order, and check expectations against
        // the pre-batch versions.
        let mut running: HashMap<(ShopId, Uuid), UnitBalance> = HashMap::new();
        let mut base: HashMap<(ShopId, Uuid), u64> = HashMap::new();
        let mut thresholds: HashMap<(ShopId, Uuid), i64> = HashMap::new();
        let mut staged = Vec::with_capacity(batch.postings.len());
        for posting in batch.postings {
            posting.validate()?;
            let key = (posting.unit.shop_id, *posting.unit.stream_id().as_uuid());
            if !running.contains_key(&key) {
                let access = UnitAccess::for_kind(posting.kind);
                let (balance, threshold) = lock_unit(&mut tx, &posting.unit, access).await?;
                base.insert(key, balance.version);
                running.insert(key, balance);
                thresholds.insert(key, threshold);
            }
            let base_version = base.get(&key).copied().unwrap_or_default();
            if !posting.expected.matches(base_version) {
                return Err(StoreError::Concurrency(format!(
                    "{}: expected {:?}, found {base_version}",
                    posting.unit, posting.expected
                )));
            }
            let prior = running.get(&key).copied().unwrap_or_default();
            let entry = posting.into_entry(LedgerEntryId::new(), prior);
            running.insert(key, entry.balance());
            staged.push(RecordedEntry {
                stock_alert_threshold: thresholds.get(&key).copied().unwrap_or_default(),
                entry,
            });
        }

        for recorded in &staged {
            insert_entry(&mut tx, &recorded.entry).await?;
        }
        for recorded in &staged {
            let entry = &recorded.entry;
            write_balance(&mut tx, &entry.unit(), entry.balance(), entry.created_by, entry.occurred_at)
                .await?;
        }

        let mut document_events = Vec::new();
        if let Some(doc) = batch.document {
            let row = sqlx::query(
                r#"
                SELECT COALESCE(MAX(sequence_number), 0) AS current, MAX(kind) AS kind
                FROM document_events
                WHERE shop_id = $1 AND stream_id = $2
                "#,
            )
            .bind(doc.shop_id.as_uuid())
            .bind(doc.stream_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("check_document_version", e))?;
            let current: i64 = row.try_get("current").map_err(|e| map_sqlx_error("check_document_version", e))?;
            let kind: Option<String> = row.try_get("kind").map_err(|e| map_sqlx_error("check_document_version", e))?;
            if kind.as_deref().is_some_and(|k| k != doc.kind.as_str()) {
                return Err(StoreError::Validation(format!(
                    "stream {} is not a {} stream",
                    doc.stream_id,
                    doc.kind.as_str()
                )));
            }
            let current = current as u64;
            if !doc.expected.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "{} {}: expected {:?}, found {current}",
                    doc.kind.as_str(),
                    doc.stream_id,
                    doc.expected
                )));
            }
            for (offset, e) in doc.events.into_iter().enumerate() {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    shop_id: doc.shop_id,
                    stream_id: doc.stream_id,
                    kind: doc.kind,
                    sequence_number: current + 1 + offset as u64,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                sqlx::query(
                    r#"
                    INSERT INTO document_events (
                        event_id, shop_id, stream_id, kind, sequence_number,
                        event_type, event_version, occurred_at, payload
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(stored.event_id)
                .bind(stored.shop_id.as_uuid())
                .bind(stored.stream_id.as_uuid())
                .bind(stored.kind.as_str())
                .bind(stored.sequence_number as i64)
                .bind(&stored.event_type)
                .bind(stored.event_version as i32)
                .bind(stored.occurred_at)
                .bind(&stored.payload)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        StoreError::Concurrency(format!(
                            "concurrent append to {} {}",
                            stored.kind.as_str(),
                            stored.stream_id
                        ))
                    } else {
                        map_sqlx_error("insert_document_event", e)
                    }
                })?;
                document_events.push(stored);
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(CommitReceipt {
            entries: staged,
            document_events,
        })
    }

    async fn unit_entries_async(&self, unit: StockUnit) -> StoreResult<Vec<LedgerEntry>> {
        let rows = match unit.batch_id {
            Some(batch_id) => {
                sqlx::query(
                    "SELECT * FROM ledger_entries WHERE shop_id = $1 AND batch_id = $2 ORDER BY sequence ASC",
                )
                .bind(unit.shop_id.as_uuid())
                .bind(batch_id.0.as_uuid())
                .fetch_all(&*self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM ledger_entries WHERE shop_id = $1 AND product_id = $2 AND batch_id IS NULL ORDER BY sequence ASC",
                )
                .bind(unit.shop_id.as_uuid())
                .bind(unit.product_id.0.as_uuid())
                .fetch_all(&*self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("unit_entries", e))?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn query_entries_async(
        &self,
        shop_id: ShopId,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> StoreResult<LedgerPage> {
        const WHERE: &str = r#"
            WHERE shop_id = $1
              AND ($2::uuid IS NULL OR product_id = $2)
              AND ($3::uuid IS NULL OR batch_id = $3)
              AND ($4::text IS NULL OR kind = $4)
              AND ($5::text IS NULL OR origin_kind = $5)
              AND ($6::uuid IS NULL OR origin_id = $6)
              AND ($7::timestamptz IS NULL OR occurred_at >= $7)
              AND ($8::timestamptz IS NULL OR occurred_at <= $8)
        "#;
        let product = filter.product_id.map(|p| *p.0.as_uuid());
        let batch = filter.batch_id.map(|b| *b.0.as_uuid());
        let kind = filter.kind.map(|k| k.as_str());
        let origin_kind = filter.origin.map(|o| origin_kind_str(o.kind));
        let origin_id = filter.origin.map(|o| o.id);

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total FROM ledger_entries {WHERE}"))
            .bind(shop_id.as_uuid())
            .bind(product)
            .bind(batch)
            .bind(kind)
            .bind(origin_kind)
            .bind(origin_id)
            .bind(filter.occurred_after)
            .bind(filter.occurred_before)
            .fetch_one(&*self.pool)
            .await
            .and_then(|row| row.try_get("total"))
            .map_err(|e| map_sqlx_error("count_entries", e))?;

        let rows = sqlx::query(&format!(
            "SELECT * FROM ledger_entries {WHERE} ORDER BY position ASC LIMIT $9 OFFSET $10"
        ))
        .bind(shop_id.as_uuid())
        .bind(product)
        .bind(batch)
        .bind(kind)
        .bind(origin_kind)
        .bind(origin_id)
        .bind(filter.occurred_after)
        .bind(filter.occurred_before)
        .bind(pagination.limit as i64)
        .bind(pagination.offset as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_entries", e))?;

        let entries = rows.iter().map(entry_from_row).collect::<StoreResult<Vec<_>>>()?;
        let total = total as u64;
        let has_more = (pagination.offset as u64) + (entries.len() as u64) < total;
        Ok(LedgerPage {
            entries,
            total,
            pagination,
            has_more,
        })
    }

    async fn rematerialize_async(&self, unit: StockUnit) -> StoreResult<Reconciliation> {
        let mut tx = self.begin().await?;
        let (materialized, _) = lock_unit(&mut tx, &unit, UnitAccess::Historical).await?;
        let entries = self.unit_entries_async(unit).await?;
        let reconciliation = Reconciliation::new(unit, materialized, &entries);
        if !reconciliation.is_consistent() {
            write_balance(&mut tx, &unit, replay_balance(&entries), None, Utc::now()).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(reconciliation)
    }

    async fn load_document_async(
        &self,
        shop_id: ShopId,
        kind: DocumentKind,
        stream_id: AggregateId,
    ) -> StoreResult<Vec<StoredEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, sequence_number, event_type, event_version, occurred_at, payload
            FROM document_events
            WHERE shop_id = $1 AND stream_id = $2 AND kind = $3
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(shop_id.as_uuid())
        .bind(stream_id.as_uuid())
        .bind(kind.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_document", e))?;

        rows.iter()
            .map(|row| {
                let decode = |e| map_sqlx_error("load_document", e);
                Ok(StoredEvent {
                    event_id: row.try_get("event_id").map_err(decode)?,
                    shop_id,
                    stream_id,
                    kind,
                    sequence_number: row.try_get::<i64, _>("sequence_number").map_err(decode)? as u64,
                    event_type: row.try_get("event_type").map_err(decode)?,
                    event_version: row.try_get::<i32, _>("event_version").map_err(decode)? as u32,
                    occurred_at: row.try_get("occurred_at").map_err(decode)?,
                    payload: row.try_get("payload").map_err(decode)?,
                })
            })
            .collect()
    }

    async fn fetch_product(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        shop_id: ShopId,
        product_id: ProductId,
    ) -> StoreResult<Product> {
        let row = sqlx::query("SELECT doc FROM products WHERE shop_id = $1 AND product_id = $2 FOR UPDATE")
            .bind(shop_id.as_uuid())
            .bind(product_id.0.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_product", e))?
            .ok_or_else(|| StoreError::NotFound(format!("product {product_id}")))?;
        decode_doc(&row)
    }

    async fn fetch_batch(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        shop_id: ShopId,
        batch_id: BatchId,
    ) -> StoreResult<Batch> {
        let row = sqlx::query("SELECT doc FROM batches WHERE shop_id = $1 AND batch_id = $2 FOR UPDATE")
            .bind(shop_id.as_uuid())
            .bind(batch_id.0.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_batch", e))?
            .ok_or_else(|| StoreError::NotFound(format!("batch {batch_id}")))?;
        decode_doc(&row)
    }

    async fn fetch_docs<T: DeserializeOwned>(&self, sql: &str, shop_id: ShopId, arg: Option<&str>) -> StoreResult<Vec<T>> {
        let mut query = sqlx::query(sql).bind(shop_id.as_uuid());
        if let Some(arg) = arg {
            query = query.bind(arg);
        }
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_docs", e))?;
        rows.iter().map(decode_doc).collect()
    }
}

impl CatalogStore for PostgresInventoryStore {
    fn insert_product(&self, product: Product) -> StoreResult<()> {
        self.run(async {
            let mut tx = self.begin().await?;
            upsert_product(&mut tx, &product, true).await?;
            tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))
        })
    }

    fn product(&self, shop_id: ShopId, product_id: ProductId) -> StoreResult<Option<Product>> {
        self.run(async {
            let row = sqlx::query("SELECT doc FROM products WHERE shop_id = $1 AND product_id = $2")
                .bind(shop_id.as_uuid())
                .bind(product_id.0.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_product", e))?;
            row.as_ref().map(decode_doc).transpose()
        })
    }

    fn products(&self, shop_id: ShopId) -> StoreResult<Vec<Product>> {
        self.run(self.fetch_docs(
            "SELECT doc FROM products WHERE shop_id = $1 ORDER BY created_at, product_id",
            shop_id,
            None,
        ))
    }

    fn find_product_by_barcode(&self, shop_id: ShopId, barcode: &str) -> StoreResult<Option<Product>> {
        let found: Vec<Product> = self.run(self.fetch_docs(
            "SELECT doc FROM products WHERE shop_id = $1 AND barcode = $2 AND active ORDER BY created_at LIMIT 1",
            shop_id,
            Some(barcode),
        ))?;
        Ok(found.into_iter().next())
    }

    fn modify_product(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        edit: ProductEdit<'_>,
    ) -> StoreResult<Product> {
        self.run(async {
            let mut tx = self.begin().await?;
            let mut product = self.fetch_product(&mut tx, shop_id, product_id).await?;
            let before = product.balance();
            edit(&mut product)?;
            if product.balance() != before {
                return Err(StoreError::Validation(
                    "product quantity can only change through the ledger".to_string(),
                ));
            }
            upsert_product(&mut tx, &product, false).await?;
            tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
            Ok(product)
        })
    }

    fn insert_batch(
        &self,
        mut batch: Batch,
        link_to: Option<ProductId>,
        actor: Option<UserId>,
    ) -> StoreResult<Batch> {
        self.run(async {
            let mut tx = self.begin().await?;
            if let Some(product_id) = link_to {
                let mut product = self.fetch_product(&mut tx, batch.shop_id(), product_id).await?;
                batch.link_to(product_id, batch.created_at())?;
                product.link_batches(&[batch.id_typed()], actor, batch.created_at())?;
                upsert_product(&mut tx, &product, false).await?;
            }
            upsert_batch(&mut tx, &batch, true).await?;
            tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
            Ok(batch)
        })
    }

    fn batch(&self, shop_id: ShopId, batch_id: BatchId) -> StoreResult<Option<Batch>> {
        self.run(async {
            let row = sqlx::query("SELECT doc FROM batches WHERE shop_id = $1 AND batch_id = $2")
                .bind(shop_id.as_uuid())
                .bind(batch_id.0.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_batch", e))?;
            row.as_ref().map(decode_doc).transpose()
        })
    }

    fn batches(&self, shop_id: ShopId) -> StoreResult<Vec<Batch>> {
        self.run(self.fetch_docs(
            "SELECT doc FROM batches WHERE shop_id = $1 ORDER BY expiry_date, created_at, batch_id",
            shop_id,
            None,
        ))
    }

    fn find_active_batch_by_number(&self, shop_id: ShopId, batch_number: &str) -> StoreResult<Option<Batch>> {
        let found: Vec<Batch> = self.run(self.fetch_docs(
            "SELECT doc FROM batches WHERE shop_id = $1 AND batch_number = $2 AND active",
            shop_id,
            Some(batch_number),
        ))?;
        Ok(found.into_iter().next())
    }

    fn link_batches(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        batch_ids: &[BatchId],
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        self.run(async {
            let mut tx = self.begin().await?;
            let mut product = self.fetch_product(&mut tx, shop_id, product_id).await?;
            product.link_batches(batch_ids, actor, at)?;
            for batch_id in batch_ids {
                let mut batch = self.fetch_batch(&mut tx, shop_id, *batch_id).await?;
                if let Some(previous) = batch.link_to(product_id, at)? {
                    let mut owner = self.fetch_product(&mut tx, shop_id, previous).await?;
                    owner.unlink_batch(*batch_id);
                    upsert_product(&mut tx, &owner, false).await?;
                }
                upsert_batch(&mut tx, &batch, false).await?;
            }
            upsert_product(&mut tx, &product, false).await?;
            tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
            Ok(product)
        })
    }

    fn deactivate_product(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> StoreResult<(Product, Vec<BatchId>)> {
        self.run(async {
            let mut tx = self.begin().await?;
            let mut product = self.fetch_product(&mut tx, shop_id, product_id).await?;
            let released = product.deactivate(actor, at);
            for batch_id in &released {
                let mut batch = self.fetch_batch(&mut tx, shop_id, *batch_id).await?;
                batch.clear_product(at);
                upsert_batch(&mut tx, &batch, false).await?;
            }
            upsert_product(&mut tx, &product, false).await?;
            tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
            Ok((product, released))
        })
    }

    fn deactivate_batch(&self, shop_id: ShopId, batch_id: BatchId, at: DateTime<Utc>) -> StoreResult<Batch> {
        self.run(async {
            let mut tx = self.begin().await?;
            let mut batch = self.fetch_batch(&mut tx, shop_id, batch_id).await?;
            if let Some(product_id) = batch.deactivate(at) {
                let mut product = self.fetch_product(&mut tx, shop_id, product_id).await?;
                product.unlink_batch(batch_id);
                upsert_product(&mut tx, &product, false).await?;
            }
            upsert_batch(&mut tx, &batch, false).await?;
            tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
            Ok(batch)
        })
    }
}

impl LedgerStore for PostgresInventoryStore {
    fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReceipt> {
        if batch.is_empty() {
            return Ok(CommitReceipt::default());
        }
        self.run(self.commit_async(batch))
    }

    fn balance(&self, unit: StockUnit) -> StoreResult<UnitBalance> {
        self.run(async {
            let mut tx = self.begin().await?;
            let (balance, _) = read_unit(&mut tx, &unit, UnitAccess::Historical, false).await?;
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            Ok(balance)
        })
    }

    fn unit_entries(&self, unit: StockUnit) -> StoreResult<Vec<LedgerEntry>> {
        self.run(self.unit_entries_async(unit))
    }

    fn query_entries(
        &self,
        shop_id: ShopId,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> StoreResult<LedgerPage> {
        self.run(self.query_entries_async(shop_id, filter, pagination))
    }

    fn rematerialize(&self, unit: StockUnit) -> StoreResult<Reconciliation> {
        self.run(self.rematerialize_async(unit))
    }
}

impl DocumentStore for PostgresInventoryStore {
    fn load_document(
        &self,
        shop_id: ShopId,
        kind: DocumentKind,
        stream_id: AggregateId,
    ) -> StoreResult<Vec<StoredEvent>> {
        self.run(self.load_document_async(shop_id, kind, stream_id))
    }
}

async fn lock_unit(
    tx: &mut Transaction<'_, Postgres>,
    unit: &StockUnit,
    access: UnitAccess,
) -> StoreResult<(UnitBalance, i64)> {
    read_unit(tx, unit, access, true).await
}

/// Balance and alert threshold of the unit's holder row, with the same
/// addressability checks as the in-memory store.
async fn read_unit(
    tx: &mut Transaction<'_, Postgres>,
    unit: &StockUnit,
    access: UnitAccess,
    for_update: bool,
) -> StoreResult<(UnitBalance, i64)> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let product_row = sqlx::query(&format!(
        "SELECT doc FROM products WHERE shop_id = $1 AND product_id = $2{lock}"
    ))
    .bind(unit.shop_id.as_uuid())
    .bind(unit.product_id.0.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("read_unit", e))?
    .ok_or_else(|| StoreError::NotFound(format!("product {}", unit.product_id)))?;
    let product: Product = decode_doc(&product_row)?;
    if !product.tracks_inventory() {
        return Err(StoreError::Validation(format!(
            "product {} does not track inventory",
            unit.product_id
        )));
    }

    match unit.batch_id {
        None => {
            if product.tracks_expiry() {
                return Err(StoreError::Validation(format!(
                    "product {} tracks expiry; a batch is required",
                    unit.product_id
                )));
            }
            Ok((product.balance(), product.stock_alert_threshold()))
        }
        Some(batch_id) => {
            let row = sqlx::query(&format!(
                "SELECT doc FROM batches WHERE shop_id = $1 AND batch_id = $2{lock}"
            ))
            .bind(unit.shop_id.as_uuid())
            .bind(batch_id.0.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("read_unit", e))?
            .ok_or_else(|| StoreError::NotFound(format!("batch {batch_id}")))?;
            let batch: Batch = decode_doc(&row)?;
            if !access.admits(&batch, unit.product_id) {
                return Err(StoreError::Validation(format!(
                    "batch {batch_id} is not linked to product {}",
                    unit.product_id
                )));
            }
            Ok((batch.balance(), batch.stock_alert_threshold()))
        }
    }
}

async fn write_balance(
    tx: &mut Transaction<'_, Postgres>,
    unit: &StockUnit,
    balance: UnitBalance,
    actor: Option<UserId>,
    at: DateTime<Utc>,
) -> StoreResult<()> {
    match unit.batch_id {
        None => {
            let row = sqlx::query("SELECT doc FROM products WHERE shop_id = $1 AND product_id = $2")
                .bind(unit.shop_id.as_uuid())
                .bind(unit.product_id.0.as_uuid())
                .fetch_one(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("write_balance", e))?;
            let mut product: Product = decode_doc(&row)?;
            product.materialize(balance, actor, at);
            upsert_product(tx, &product, false).await
        }
        Some(batch_id) => {
            let row = sqlx::query("SELECT doc FROM batches WHERE shop_id = $1 AND batch_id = $2")
                .bind(unit.shop_id.as_uuid())
                .bind(batch_id.0.as_uuid())
                .fetch_one(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("write_balance", e))?;
            let mut batch: Batch = decode_doc(&row)?;
            batch.materialize(balance, at);
            upsert_batch(tx, &batch, false).await
        }
    }
}

async fn upsert_product(tx: &mut Transaction<'_, Postgres>, product: &Product, insert: bool) -> StoreResult<()> {
    let doc = encode_doc(product)?;
    let sql = if insert {
        r#"
        INSERT INTO products (shop_id, product_id, barcode, active, created_at, doc)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#
    } else {
        r#"
        UPDATE products SET barcode = $3, active = $4, created_at = $5, doc = $6
        WHERE shop_id = $1 AND product_id = $2
        "#
    };
    sqlx::query(sql)
        .bind(product.shop_id().as_uuid())
        .bind(product.id_typed().0.as_uuid())
        .bind(product.barcode())
        .bind(product.is_active())
        .bind(product.created_at())
        .bind(doc)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_product", e))?;
    Ok(())
}

async fn upsert_batch(tx: &mut Transaction<'_, Postgres>, batch: &Batch, insert: bool) -> StoreResult<()> {
    let doc = encode_doc(batch)?;
    let sql = if insert {
        r#"
        INSERT INTO batches (shop_id, batch_id, batch_number, active, expiry_date, created_at, doc)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#
    } else {
        r#"
        UPDATE batches SET batch_number = $3, active = $4, expiry_date = $5, created_at = $6, doc = $7
        WHERE shop_id = $1 AND batch_id = $2
        "#
    };
    sqlx::query(sql)
        .bind(batch.shop_id().as_uuid())
        .bind(batch.id_typed().0.as_uuid())
        .bind(batch.batch_number())
        .bind(batch.is_active())
        .bind(batch.expiry_date())
        .bind(batch.created_at())
        .bind(doc)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "an active batch numbered {} already exists in this shop",
                    batch.batch_number()
                ))
            } else {
                map_sqlx_error("upsert_batch", e)
            }
        })?;
    Ok(())
}

async fn insert_entry(tx: &mut Transaction<'_, Postgres>, entry: &LedgerEntry) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (
            entry_id, shop_id, product_id, batch_id, kind, quantity, resulting_balance,
            sequence, reason, origin_kind, origin_id, created_by, occurred_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(entry.id.0)
    .bind(entry.shop_id.as_uuid())
    .bind(entry.product_id.0.as_uuid())
    .bind(entry.batch_id.map(|b| *b.0.as_uuid()))
    .bind(entry.kind.as_str())
    .bind(entry.quantity)
    .bind(entry.resulting_balance)
    .bind(entry.sequence as i64)
    .bind(entry.reason.as_deref())
    .bind(entry.origin.map(|o| origin_kind_str(o.kind)))
    .bind(entry.origin.map(|o| o.id))
    .bind(entry.created_by.map(|u| *u.as_uuid()))
    .bind(entry.occurred_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::Concurrency(format!(
                "sequence {} of {} already exists",
                entry.sequence,
                entry.unit()
            ))
        } else {
            map_sqlx_error("insert_entry", e)
        }
    })?;
    Ok(())
}

fn entry_from_row(row: &PgRow) -> StoreResult<LedgerEntry> {
    let decode = |e| map_sqlx_error("decode_entry", e);
    let kind: String = row.try_get("kind").map_err(decode)?;
    let origin_kind: Option<String> = row.try_get("origin_kind").map_err(decode)?;
    let origin_id: Option<Uuid> = row.try_get("origin_id").map_err(decode)?;
    let origin = match (origin_kind.as_deref(), origin_id) {
        (Some(k), Some(id)) => Some(OriginRef {
            kind: parse_origin_kind(k)?,
            id,
        }),
        _ => None,
    };
    Ok(LedgerEntry {
        id: LedgerEntryId(row.try_get("entry_id").map_err(decode)?),
        shop_id: ShopId::from_uuid(row.try_get("shop_id").map_err(decode)?),
        product_id: ProductId::new(AggregateId::from_uuid(row.try_get("product_id").map_err(decode)?)),
        batch_id: row
            .try_get::<Option<Uuid>, _>("batch_id")
            .map_err(decode)?
            .map(|u| BatchId::new(AggregateId::from_uuid(u))),
        kind: kind.parse::<MovementKind>()?,
        quantity: row.try_get("quantity").map_err(decode)?,
        resulting_balance: row.try_get("resulting_balance").map_err(decode)?,
        sequence: row.try_get::<i64, _>("sequence").map_err(decode)? as u64,
        reason: row.try_get("reason").map_err(decode)?,
        origin,
        created_by: row
            .try_get::<Option<Uuid>, _>("created_by")
            .map_err(decode)?
            .map(UserId::from_uuid),
        occurred_at: row.try_get("occurred_at").map_err(decode)?,
    })
}

fn origin_kind_str(kind: OriginKind) -> &'static str {
    match kind {
        OriginKind::Order => "order",
        OriginKind::Expense => "expense",
        OriginKind::Transfer => "transfer",
    }
}

fn parse_origin_kind(raw: &str) -> StoreResult<OriginKind> {
    match raw {
        "order" => Ok(OriginKind::Order),
        "expense" => Ok(OriginKind::Expense),
        "transfer" => Ok(OriginKind::Transfer),
        other => Err(StoreError::Backend(format!("unknown origin kind in ledger: {other}"))),
    }
}

fn encode_doc<T: Serialize>(value: &T) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StoreError::Backend(format!("failed to encode record: {e}")))
}

fn decode_doc<T: DeserializeOwned>(row: &PgRow) -> StoreResult<T> {
    let doc: serde_json::Value = row.try_get("doc").map_err(|e| map_sqlx_error("decode_doc", e))?;
    serde_json::from_value(doc).map_err(|e| StoreError::Backend(format!("failed to decode record: {e}")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("40001") | Some("40P01") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}
