use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use payboard_core::Operation;
use payboard_storage::ViewInvalidator;

use crate::executor::MutationReceipt;

/// What the caller should do once a mutation has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Navigate to the listing route. Terminal for the request.
    Navigate(&'static str),
    /// Stay on the current view.
    Stay,
}

/// Applies cache invalidation and picks the navigation for successful mutations.
///
/// Only receipts reach this type, so a failed mutation can never invalidate
/// or navigate.
#[derive(Clone)]
pub struct EffectsCoordinator {
    views: Arc<dyn ViewInvalidator>,
}

impl EffectsCoordinator {
    pub fn new(views: Arc<dyn ViewInvalidator>) -> Self {
        Self { views }
    }

    pub fn apply(&self, receipt: &MutationReceipt) -> Effect {
        let route = receipt.entity.listing_route();
        let dropped = self.views.invalidate(route);
        counter!("view_cache_invalidations_total", "route" => route).increment(1);
        debug!(
            stage = "effects",
            route,
            dropped,
            entity = receipt.entity.as_str(),
            operation = receipt.operation.as_str(),
            id = %receipt.id,
            "listing views invalidated"
        );

        match receipt.operation {
            Operation::Create | Operation::Update => Effect::Navigate(route),
            Operation::Delete => Effect::Stay,
        }
    }
}
