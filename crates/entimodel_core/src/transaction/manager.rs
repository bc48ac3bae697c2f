//! Transaction manager.

use super::state::{Transaction, TransactionId};
use crate::fetch_plan::FetchPlanRepository;
use crate::metadata::Metamodel;
use entimodel_storage::StoreRegistry;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Hands out transactions over a set of data stores.
///
/// The manager is shared; each transaction it begins belongs to one thread
/// of control and is never shared.
#[derive(Debug)]
pub struct TransactionManager {
    stores: Arc<StoreRegistry>,
    metamodel: Arc<Metamodel>,
    plans: Arc<FetchPlanRepository>,
    next_txid: AtomicU64,
    /// Transactions begun and not yet ended.
    active_txns: RwLock<BTreeSet<TransactionId>>,
}

impl TransactionManager {
    /// Creates a transaction manager.
    pub fn new(
        stores: Arc<StoreRegistry>,
        metamodel: Arc<Metamodel>,
        plans: Arc<FetchPlanRepository>,
    ) -> Self {
        Self {
            stores,
            metamodel,
            plans,
            next_txid: AtomicU64::new(1),
            active_txns: RwLock::new(BTreeSet::new()),
        }
    }

    /// Begins a new transaction.
    ///
    /// The transaction rolls back when dropped without a commit.
    pub fn begin(&self) -> Transaction<'_> {
        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        self.active_txns.write().insert(id);
        debug!("begin transaction {}", id);
        Transaction::new(id, self)
    }

    /// Returns the ids of transactions that have not ended.
    #[must_use]
    pub fn active_transactions(&self) -> Vec<TransactionId> {
        self.active_txns.read().iter().copied().collect()
    }

    pub(crate) fn end(&self, id: TransactionId) {
        self.active_txns.write().remove(&id);
    }

    /// Returns the data stores.
    #[must_use]
    pub fn stores(&self) -> &StoreRegistry {
        &self.stores
    }

    /// Returns the metamodel.
    #[must_use]
    pub fn metamodel(&self) -> &Metamodel {
        &self.metamodel
    }

    /// Returns the fetch plans.
    #[must_use]
    pub fn plans(&self) -> &FetchPlanRepository {
        &self.plans
    }
}
