use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use stockledger_core::{AggregateId, ShopId, UserId};
use stockledger_inventory::{LedgerEntry, LedgerEntryId, Reconciliation, replay_balance};
use stockledger_products::{Batch, BatchId, Product, ProductId, StockUnit, UnitBalance};

use super::query::{LedgerFilter, LedgerPage, Pagination};
use super::{
    CatalogStore, CommitReceipt, DocumentKind, DocumentStore, LedgerStore, ProductEdit,
    RecordedEntry, StoreError, StoreResult, StoredEvent, UnitAccess, WriteBatch,
};

/// Record carrying a unit's materialized balance.
///
/// Batch balances belong to the batch whatever product it is linked to, so
/// entries are indexed by holder rather than by (product, batch) pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum Holder {
    Product(ShopId, ProductId),
    Batch(ShopId, BatchId),
}

impl Holder {
    fn of(unit: &StockUnit) -> Self {
        match unit.batch_id {
            Some(batch_id) => Holder::Batch(unit.shop_id, batch_id),
            None => Holder::Product(unit.shop_id, unit.product_id),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    products: HashMap<(ShopId, ProductId), Product>,
    batches: HashMap<(ShopId, BatchId), Batch>,
    entries: Vec<LedgerEntry>,
    by_holder: HashMap<Holder, Vec<usize>>,
    documents: HashMap<(ShopId, AggregateId), Vec<StoredEvent>>,
}

impl State {
    fn product(&self, shop_id: ShopId, product_id: ProductId) -> StoreResult<&Product> {
        self.products
            .get(&(shop_id, product_id))
            .ok_or_else(|| StoreError::NotFound(format!("product {product_id}")))
    }

    fn batch(&self, shop_id: ShopId, batch_id: BatchId) -> StoreResult<&Batch> {
        self.batches
            .get(&(shop_id, batch_id))
            .ok_or_else(|| StoreError::NotFound(format!("batch {batch_id}")))
    }

    /// Current balance and alert threshold of the unit's holder, after checking
    /// that the unit is addressable under `access`.
    fn holder_balance(
        &self,
        unit: &StockUnit,
        access: UnitAccess,
    ) -> StoreResult<(UnitBalance, i64)> {
        let product = self.product(unit.shop_id, unit.product_id)?;
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
                let batch = self.batch(unit.shop_id, batch_id)?;
                if !access.admits(batch, unit.product_id) {
                    return Err(StoreError::Validation(format!(
                        "batch {batch_id} is not linked to product {}",
                        unit.product_id
                    )));
                }
                Ok((batch.balance(), batch.stock_alert_threshold()))
            }
        }
    }

    fn materialize(&mut self, unit: &StockUnit, balance: UnitBalance, actor: Option<UserId>, at: DateTime<Utc>) {
        match unit.batch_id {
            None => {
                if let Some(p) = self.products.get_mut(&(unit.shop_id, unit.product_id)) {
                    p.materialize(balance, actor, at);
                }
            }
            Some(batch_id) => {
                if let Some(b) = self.batches.get_mut(&(unit.shop_id, batch_id)) {
                    b.materialize(balance, at);
                }
            }
        }
    }

    fn holder_entries(&self, holder: Holder) -> Vec<LedgerEntry> {
        self.by_holder
            .get(&holder)
            .map(|idx| idx.iter().map(|i| self.entries[*i].clone()).collect())
            .unwrap_or_default()
    }
}

/// In-memory inventory store.
///
/// One lock guards catalog, ledger and documents together, so every commit is
/// trivially atomic. Intended for tests, dev and the single-process API.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    state: RwLock<State>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    /// Total number of ledger entries across all shops.
    pub fn entry_count(&self) -> usize {
        self.read().map(|s| s.entries.len()).unwrap_or(0)
    }
}

impl CatalogStore for InMemoryInventoryStore {
    fn insert_product(&self, product: Product) -> StoreResult<()> {
        let mut state = self.write()?;
        let key = (product.shop_id(), product.id_typed());
        if state.products.contains_key(&key) {
            return Err(StoreError::Conflict(format!("product {} already exists", key.1)));
        }
        state.products.insert(key, product);
        Ok(())
    }

    fn product(&self, shop_id: ShopId, product_id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.read()?.products.get(&(shop_id, product_id)).cloned())
    }

    fn products(&self, shop_id: ShopId) -> StoreResult<Vec<Product>> {
        let state = self.read()?;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| p.shop_id() == shop_id)
            .cloned()
            .collect();
        products.sort_by_key(|p| (p.created_at(), p.id_typed()));
        Ok(products)
    }

    fn find_product_by_barcode(&self, shop_id: ShopId, barcode: &str) -> StoreResult<Option<Product>> {
        let state = self.read()?;
        Ok(state
            .products
            .values()
            .find(|p| p.shop_id() == shop_id && p.is_active() && p.barcode() == Some(barcode))
            .cloned())
    }

    fn modify_product(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        edit: ProductEdit<'_>,
    ) -> StoreResult<Product> {
        let mut state = self.write()?;
        let mut product = state.product(shop_id, product_id)?.clone();
        let before = product.balance();
        edit(&mut product)?;
        if product.balance() != before {
            return Err(StoreError::Validation(
                "product quantity can only change through the ledger".to_string(),
            ));
        }
        state.products.insert((shop_id, product_id), product.clone());
        Ok(product)
    }

    fn insert_batch(
        &self,
        mut batch: Batch,
        link_to: Option<ProductId>,
        actor: Option<UserId>,
    ) -> StoreResult<Batch> {
        let mut state = self.write()?;
        let shop_id = batch.shop_id();
        if state.batches.contains_key(&(shop_id, batch.id_typed())) {
            return Err(StoreError::Conflict(format!("batch {} already exists", batch.id_typed())));
        }
        let duplicate = state.batches.values().any(|b| {
            b.shop_id() == shop_id && b.is_active() && b.batch_number() == batch.batch_number()
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "an active batch numbered {} already exists in this shop",
                batch.batch_number()
            )));
        }

        if let Some(product_id) = link_to {
            let mut product = state.product(shop_id, product_id)?.clone();
            batch.link_to(product_id, batch.created_at())?;
            product.link_batches(&[batch.id_typed()], actor, batch.created_at())?;
            state.products.insert((shop_id, product_id), product);
        }
        state.batches.insert((shop_id, batch.id_typed()), batch.clone());
        Ok(batch)
    }

    fn batch(&self, shop_id: ShopId, batch_id: BatchId) -> StoreResult<Option<Batch>> {
        Ok(self.read()?.batches.get(&(shop_id, batch_id)).cloned())
    }

    fn batches(&self, shop_id: ShopId) -> StoreResult<Vec<Batch>> {
        let state = self.read()?;
        let mut batches: Vec<Batch> = state
            .batches
            .values()
            .filter(|b| b.shop_id() == shop_id)
            .cloned()
            .collect();
        batches.sort_by_key(|b| (b.expiry_date(), b.created_at(), b.id_typed()));
        Ok(batches)
    }

    fn find_active_batch_by_number(&self, shop_id: ShopId, batch_number: &str) -> StoreResult<Option<Batch>> {
        let state = self.read()?;
        Ok(state
            .batches
            .values()
            .find(|b| b.shop_id() == shop_id && b.is_active() && b.batch_number() == batch_number)
            .cloned())
    }

    fn link_batches(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        batch_ids: &[BatchId],
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        let mut state = self.write()?;
        let mut product = state.product(shop_id, product_id)?.clone();
        product.link_batches(batch_ids, actor, at)?;

        let mut linked = Vec::with_capacity(batch_ids.len());
        let mut moved = Vec::new();
        for batch_id in batch_ids {
            let mut batch = state.batch(shop_id, *batch_id)?.clone();
            if let Some(previous) = batch.link_to(product_id, at)? {
                moved.push((previous, *batch_id));
            }
            linked.push(batch);
        }

        for (previous, batch_id) in moved {
            if let Some(owner) = state.products.get_mut(&(shop_id, previous)) {
                owner.unlink_batch(batch_id);
            }
        }
        for batch in linked {
            state.batches.insert((shop_id, batch.id_typed()), batch);
        }
        state.products.insert((shop_id, product_id), product.clone());
        Ok(product)
    }

    fn deactivate_product(
        &self,
        shop_id: ShopId,
        product_id: ProductId,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> StoreResult<(Product, Vec<BatchId>)> {
        let mut state = self.write()?;
        let mut product = state.product(shop_id, product_id)?.clone();
        let released = product.deactivate(actor, at);
        for batch_id in &released {
            if let Some(batch) = state.batches.get_mut(&(shop_id, *batch_id)) {
                batch.clear_product(at);
            }
        }
        state.products.insert((shop_id, product_id), product.clone());
        Ok((product, released))
    }

    fn deactivate_batch(&self, shop_id: ShopId, batch_id: BatchId, at: DateTime<Utc>) -> StoreResult<Batch> {
        let mut state = self.write()?;
        let mut batch = state.batch(shop_id, batch_id)?.clone();
        if let Some(product_id) = batch.deactivate(at) {
            if let Some(product) = state.products.get_mut(&(shop_id, product_id)) {
                product.unlink_batch(batch_id);
            }
        }
        state.batches.insert((shop_id, batch_id), batch.clone());
        Ok(batch)
    }
}

impl LedgerStore for InMemoryInventoryStore {
    fn commit(&self, batch: WriteBatch) -> StoreResult<CommitReceipt> {
        let mut state = self.write()?;

        // 1) Check everything before touching state.
        let mut base: HashMap<Holder, u64> = HashMap::new();
        let mut running: HashMap<Holder, UnitBalance> = HashMap::new();
        let mut staged = Vec::with_capacity(batch.postings.len());
        for posting in batch.postings {
            posting.validate()?;
            let holder = Holder::of(&posting.unit);
            let access = UnitAccess::for_kind(posting.kind);
            let (current, threshold) = state.holder_balance(&posting.unit, access)?;
            let base_version = *base.entry(holder).or_insert(current.version);
            if !posting.expected.matches(base_version) {
                return Err(StoreError::Concurrency(format!(
                    "{}: expected {:?}, found {base_version}",
                    posting.unit, posting.expected
                )));
            }
            let prior = *running.entry(holder).or_insert(current);
            let entry = posting.into_entry(LedgerEntryId::new(), prior);
            running.insert(holder, entry.balance());
            staged.push(RecordedEntry {
                entry,
                stock_alert_threshold: threshold,
            });
        }

        let mut document_events = Vec::new();
        if let Some(doc) = &batch.document {
            let key = (doc.shop_id, doc.stream_id);
            let stream = state.documents.get(&key).map(Vec::as_slice).unwrap_or_default();
            if let Some(first) = stream.first() {
                if first.kind != doc.kind {
                    return Err(StoreError::Validation(format!(
                        "stream {} holds {} events, not {}",
                        doc.stream_id,
                        first.kind.as_str(),
                        doc.kind.as_str()
                    )));
                }
            }
            let current = stream.len() as u64;
            if !doc.expected.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "{} {}: expected {:?}, found {current}",
                    doc.kind.as_str(),
                    doc.stream_id,
                    doc.expected
                )));
            }
            for (offset, e) in doc.events.iter().enumerate() {
                document_events.push(StoredEvent {
                    event_id: e.event_id,
                    shop_id: doc.shop_id,
                    stream_id: doc.stream_id,
                    kind: doc.kind,
                    sequence_number: current + 1 + offset as u64,
                    event_type: e.event_type.clone(),
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload.clone(),
                });
            }
        }

        // 2) Apply (cannot fail past this point).
        for recorded in &staged {
            let entry = &recorded.entry;
            let unit = entry.unit();
            state.materialize(&unit, entry.balance(), entry.created_by, entry.occurred_at);
            let idx = state.entries.len();
            state.entries.push(entry.clone());
            state.by_holder.entry(Holder::of(&unit)).or_default().push(idx);
        }
        if let Some(doc) = batch.document {
            state
                .documents
                .entry((doc.shop_id, doc.stream_id))
                .or_default()
                .extend(document_events.iter().cloned());
        }

        Ok(CommitReceipt {
            entries: staged,
            document_events,
        })
    }

    fn balance(&self, unit: StockUnit) -> StoreResult<UnitBalance> {
        let state = self.read()?;
        let (balance, _) = state.holder_balance(&unit, UnitAccess::Historical)?;
        Ok(balance)
    }

    fn unit_entries(&self, unit: StockUnit) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self.read()?.holder_entries(Holder::of(&unit)))
    }

    fn query_entries(
        &self,
        shop_id: ShopId,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> StoreResult<LedgerPage> {
        let state = self.read()?;
        let matches: Vec<LedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.shop_id == shop_id && filter.matches(e))
            .cloned()
            .collect();
        Ok(LedgerPage::from_matches(matches, pagination))
    }

    fn rematerialize(&self, unit: StockUnit) -> StoreResult<Reconciliation> {
        let mut state = self.write()?;
        let (materialized, _) = state.holder_balance(&unit, UnitAccess::Historical)?;
        let entries = state.holder_entries(Holder::of(&unit));
        let reconciliation = Reconciliation::new(unit, materialized, &entries);
        if !reconciliation.is_consistent() {
            let at = Utc::now();
            state.materialize(&unit, replay_balance(&entries), None, at);
        }
        Ok(reconciliation)
    }
}

impl DocumentStore for InMemoryInventoryStore {
    fn load_document(
        &self,
        shop_id: ShopId,
        kind: DocumentKind,
        stream_id: AggregateId,
    ) -> StoreResult<Vec<StoredEvent>> {
        let state = self.read()?;
        Ok(state
            .documents
            .get(&(shop_id, stream_id))
            .map(|events| events.iter().filter(|e| e.kind == kind).cloned().collect())
            .unwrap_or_default())
    }
}

impl InMemoryInventoryStore {
    /// Overwrite a unit's materialized balance without an entry.
    ///
    /// Test support for drift detection; nothing in the engine calls this.
    #[cfg(test)]
    pub(crate) fn corrupt_balance(&self, unit: StockUnit, balance: UnitBalance) {
        if let Ok(mut state) = self.state.write() {
            state.materialize(&unit, balance, None, Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentAppend, UncommittedEvent};
    use chrono::Duration;
    use stockledger_core::ExpectedVersion;
    use stockledger_inventory::{LedgerPosting, MovementKind};
    use stockledger_products::{CreateBatch, CreateProduct};

    fn product(shop_id: ShopId, tracks_expiry: bool) -> Product {
        Product::create(CreateProduct {
            shop_id,
            product_id: ProductId::new(AggregateId::new()),
            name: "Rice".to_string(),
            barcode: Some("RICE-1".to_string()),
            cost_price: 100,
            selling_price: 150,
            tracks_inventory: true,
            tracks_expiry,
            stock_alert_threshold: 1,
            actor: None,
            occurred_at: Utc::now(),
        })
        .unwrap()
    }

    fn batch(shop_id: ShopId, number: &str) -> Batch {
        let now = Utc::now();
        Batch::create(CreateBatch {
            shop_id,
            batch_id: BatchId::new(AggregateId::new()),
            batch_number: number.to_string(),
            expiry_date: now + Duration::days(30),
            stock_alert_threshold: 2,
            actor: None,
            occurred_at: now,
        })
        .unwrap()
    }

    fn purchase(unit: StockUnit, qty: i64) -> LedgerPosting {
        LedgerPosting::new(unit, MovementKind::Purchase, qty, None, Utc::now())
    }

    #[test]
    fn commit_stamps_balance_and_materializes() {
        let store = InMemoryInventoryStore::new();
        let shop = ShopId::new();
        let p = product(shop, false);
        let unit = p.unit();
        store.insert_product(p).unwrap();

        let receipt = store
            .commit(WriteBatch::postings(vec![purchase(unit, 100), purchase(unit, 5)]))
            .unwrap();

        assert_eq!(receipt.entries[1].entry.resulting_balance, 105);
        assert_eq!(store.balance(unit).unwrap(), UnitBalance { quantity: 105, version: 2 });
        assert_eq!(store.unit_entries(unit).unwrap().len(), 2);
    }

    #[test]
    fn stale_expected_version_rolls_back_whole_batch() {
        let store = InMemoryInventoryStore::new();
        let shop = ShopId::new();
        let a = product(shop, false);
        let b = product(shop, false);
        let (ua, ub) = (a.unit(), b.unit());
        store.insert_product(a).unwrap();
        store.insert_product(b).unwrap();
        store.commit(WriteBatch::postings(vec![purchase(ub, 1)])).unwrap();

        let err = store
            .commit(WriteBatch::postings(vec![
                purchase(ua, 10).expecting(ExpectedVersion::Exact(0)),
                purchase(ub, 10).expecting(ExpectedVersion::Exact(0)),
            ]))
            .unwrap_err();

        assert!(matches!(err, StoreError::Concurrency(_)));
        assert_eq!(store.balance(ua).unwrap().quantity, 0);
        assert_eq!(store.entry_count(), 1);
    }

    #[test]
    fn document_version_is_checked_with_postings() {
        let store = InMemoryInventoryStore::new();
        let shop = ShopId::new();
        let p = product(shop, false);
        let unit = p.unit();
        store.insert_product(p).unwrap();
        let stream_id = AggregateId::new();
        let doc = |expected| DocumentAppend {
            shop_id: shop,
            stream_id,
            kind: DocumentKind::Expense,
            expected,
            events: vec![UncommittedEvent {
                event_id: uuid::Uuid::now_v7(),
                event_type: "purchasing.expense.recorded".to_string(),
                event_version: 1,
                occurred_at: Utc::now(),
                payload: serde_json::json!({}),
            }],
        };

        store
            .commit(WriteBatch::postings(vec![purchase(unit, 3)]).with_document(doc(ExpectedVersion::Exact(0))))
            .unwrap();
        let err = store
            .commit(WriteBatch::postings(vec![purchase(unit, 3)]).with_document(doc(ExpectedVersion::Exact(0))))
            .unwrap_err();

        assert!(matches!(err, StoreError::Concurrency(_)));
        assert_eq!(store.balance(unit).unwrap().quantity, 3);
        assert_eq!(store.load_document(shop, DocumentKind::Expense, stream_id).unwrap().len(), 1);
    }

    #[test]
    fn product_level_unit_of_expiry_product_is_rejected() {
        let store = InMemoryInventoryStore::new();
        let shop = ShopId::new();
        let p = product(shop, true);
        let unit = p.unit();
        store.insert_product(p).unwrap();
        let err = store.commit(WriteBatch::postings(vec![purchase(unit, 3)])).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn batch_numbers_are_unique_among_active_batches() {
        let store = InMemoryInventoryStore::new();
        let shop = ShopId::new();
        let first = store.insert_batch(batch(shop, "L1"), None, None).unwrap();
        assert!(matches!(
            store.insert_batch(batch(shop, "L1"), None, None),
            Err(StoreError::Conflict(_))
        ));
        assert!(store.insert_batch(batch(ShopId::new(), "L1"), None, None).is_ok());

        store.deactivate_batch(shop, first.id_typed(), Utc::now()).unwrap();
        assert!(store.insert_batch(batch(shop, "L1"), None, None).is_ok());
    }

    #[test]
    fn deactivation_cascades_to_batches() {
        let store = InMemoryInventoryStore::new();
        let shop = ShopId::new();
        let p = product(shop, true);
        let pid = p.id_typed();
        store.insert_product(p).unwrap();
        let b1 = store.insert_batch(batch(shop, "A"), Some(pid), None).unwrap();
        let b2 = store.insert_batch(batch(shop, "B"), None, None).unwrap();
        store.link_batches(shop, pid, &[b2.id_typed()], None, Utc::now()).unwrap();

        let (product, released) = store.deactivate_product(shop, pid, None, Utc::now()).unwrap();

        assert_eq!(released, vec![b1.id_typed(), b2.id_typed()]);
        assert!(product.batch_ids().is_empty());
        for id in released {
            assert_eq!(store.batch(shop, id).unwrap().unwrap().product_id(), None);
        }
    }

    #[test]
    fn unlinked_batch_accepts_returns_but_not_new_movements() {
        let store = InMemoryInventoryStore::new();
        let shop = ShopId::new();
        let p = product(shop, true);
        let pid = p.id_typed();
        store.insert_product(p).unwrap();
        let b = store.insert_batch(batch(shop, "A"), Some(pid), None).unwrap();
        let unit = StockUnit::batch(shop, pid, b.id_typed());
        store.commit(WriteBatch::postings(vec![purchase(unit, 6)])).unwrap();
        store.deactivate_batch(shop, b.id_typed(), Utc::now()).unwrap();

        let err = store.commit(WriteBatch::postings(vec![purchase(unit, 1)])).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let returned = LedgerPosting::new(unit, MovementKind::Return, 2, None, Utc::now());
        let receipt = store.commit(WriteBatch::postings(vec![returned])).unwrap();
        assert_eq!(receipt.entries[0].entry.resulting_balance, 8);
        assert_eq!(store.balance(unit).unwrap(), UnitBalance { quantity: 8, version: 2 });
        assert!(store.rematerialize(unit).unwrap().is_consistent());
    }

    #[test]
    fn relinking_moves_the_batch_between_products() {
        let store = InMemoryInventoryStore::new();
        let shop = ShopId::new();
        let (a, b) = (product(shop, true), product(shop, true));
        let (aid, bid) = (a.id_typed(), b.id_typed());
        store.insert_product(a).unwrap();
        store.insert_product(b).unwrap();
        let lot = store.insert_batch(batch(shop, "L1"), Some(aid), None).unwrap();

        let linked = store.link_batches(shop, bid, &[lot.id_typed()], None, Utc::now()).unwrap();

        assert_eq!(linked.batch_ids(), &[lot.id_typed()]);
        assert!(store.product(shop, aid).unwrap().unwrap().batch_ids().is_empty());
        assert_eq!(store.batch(shop, lot.id_typed()).unwrap().unwrap().product_id(), Some(bid));
    }

    #[test]
    fn rematerialize_repairs_drift() {
        let store = InMemoryInventoryStore::new();
        let shop = ShopId::new();
        let p = product(shop, false);
        let unit = p.unit();
        store.insert_product(p).unwrap();
        store.commit(WriteBatch::postings(vec![purchase(unit, 8)])).unwrap();
        store.corrupt_balance(unit, UnitBalance { quantity: 11, version: 1 });

        let rec = store.rematerialize(unit).unwrap();

        assert_eq!(rec.drift(), 3);
        assert_eq!(store.balance(unit).unwrap().quantity, 8);
        assert!(store.rematerialize(unit).unwrap().is_consistent());
    }
}
