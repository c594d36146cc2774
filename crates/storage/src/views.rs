use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use chrono::{DateTime, Utc};

/// Drops cached renderings of a route after its data changed.
///
/// Implemented by whatever serves the read side; mutations only ever call
/// [`ViewInvalidator::invalidate`].
pub trait ViewInvalidator: Send + Sync {
    /// Drops the view for `route` and every view nested below it.
    /// Returns how many entries were removed; invalidating twice is harmless.
    fn invalidate(&self, route: &str) -> usize;
}

/// Rendered view kept for a route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedView {
    pub body: String,
    pub rendered_at: DateTime<Utc>,
}

/// In-process cache of rendered views keyed by route path.
///
/// The read layer fills it with [`ViewCache::store`] as it renders listings.
#[derive(Clone, Default)]
pub struct ViewCache {
    views: Arc<RwLock<HashMap<String, CachedView>>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, route: &str, view: CachedView) {
        self.views
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(route.to_string(), view);
    }

    pub fn get(&self, route: &str) -> Option<CachedView> {
        self.views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(route)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.views.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ViewInvalidator for ViewCache {
    fn invalidate(&self, route: &str) -> usize {
        let base = route.trim_end_matches('/');
        let prefix = format!("{base}/");
        let mut views = self.views.write().unwrap_or_else(PoisonError::into_inner);
        let before = views.len();
        views.retain(|path, _| path != base && !path.starts_with(&prefix));
        before - views.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(body: &str) -> CachedView {
        CachedView {
            body: body.to_string(),
            rendered_at: Utc::now(),
        }
    }

    #[test]
    fn invalidation_drops_route_and_nested_paths_only() {
        let cache = ViewCache::new();
        cache.store("/dashboard/invoices", view("list"));
        cache.store("/dashboard/invoices/abc/edit", view("edit"));
        cache.store("/dashboard/invoices-archive", view("archive"));
        cache.store("/dashboard/customers", view("customers"));

        assert_eq!(cache.invalidate("/dashboard/invoices"), 2);
        assert!(cache.get("/dashboard/invoices").is_none());
        assert!(cache.get("/dashboard/invoices/abc/edit").is_none());
        assert!(cache.get("/dashboard/invoices-archive").is_some());
        assert_eq!(
            cache.get("/dashboard/customers").map(|view| view.body),
            Some("customers".to_string())
        );
    }

    #[test]
    fn invalidation_is_idempotent() {
        let cache = ViewCache::new();
        cache.store("/dashboard/customers", view("customers"));
        assert_eq!(cache.invalidate("/dashboard/customers"), 1);
        assert_eq!(cache.invalidate("/dashboard/customers"), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn works_behind_the_invalidator_seam() {
        let cache = ViewCache::new();
        cache.store("/dashboard/invoices", view("list"));
        let invalidator: Arc<dyn ViewInvalidator> = Arc::new(cache.clone());

        assert_eq!(invalidator.invalidate("/dashboard/invoices/"), 1);
        assert!(cache.is_empty());
    }
}
