use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

/// Rejects a second submission of the same form while the first is in flight.
#[derive(Clone, Default)]
pub struct SubmissionGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl SubmissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` when `key` is already being processed.
    pub fn try_acquire(&self, key: impl Into<String>) -> Option<SubmissionPermit> {
        let key = key.into();
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(SubmissionPermit {
            key,
            in_flight: self.in_flight.clone(),
        })
    }
}

/// Held for the duration of a submission; releases the key on drop.
pub struct SubmissionPermit {
    key: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_is_refused_until_released() {
        let guard = SubmissionGuard::new();
        let permit = guard.try_acquire("s1:invoice:create").expect("first");
        assert!(guard.try_acquire("s1:invoice:create").is_none());
        assert!(guard.try_acquire("s2:invoice:create").is_some());

        drop(permit);
        assert!(guard.try_acquire("s1:invoice:create").is_some());
    }
}
