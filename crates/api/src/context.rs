use stockledger_core::{ShopId, UserId};

/// Shop context for a request.
///
/// This is immutable and must be present for all shop-scoped routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShopContext {
    shop_id: ShopId,
}

impl ShopContext {
    pub fn new(shop_id: ShopId) -> Self {
        Self { shop_id }
    }

    pub fn shop_id(&self) -> ShopId {
        self.shop_id
    }
}

/// Identity recorded as creator/updater on ledger entries and documents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ActorContext {
    actor: Option<UserId>,
}

impl ActorContext {
    pub fn new(actor: Option<UserId>) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> Option<UserId> {
        self.actor
    }
}
