use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::model::ElementId;

/// Identifier of one open diagram document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagramId(String);

impl DiagramId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DiagramId {
    /// Anonymous session key for embedders that drive a single diagram.
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for DiagramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DiagramId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Ids excluded from re-layout. Whether a pinned id means "keep position"
/// or "keep waypoints" is decided per pass by looking the id up in the
/// diagram, so pinning does not need to know the element kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinSet {
    ids: BTreeSet<ElementId>,
}

impl PinSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(&mut self, id: impl Into<ElementId>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn pin_all<I, T>(&mut self, ids: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<ElementId>,
    {
        for id in ids {
            self.ids.insert(id.into());
        }
    }

    pub fn unpin(&mut self, id: &ElementId) -> bool {
        self.ids.remove(id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn is_pinned(&self, id: &ElementId) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElementId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Per-diagram engine state that lives across requests.
#[derive(Debug, Clone, Default)]
pub struct DiagramSession {
    pub pins: PinSet,
}

impl DiagramSession {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Hands out one shared session per diagram id. Callers lock the returned
/// session for the duration of a layout request, which serializes access
/// per diagram while leaving unrelated diagrams free to run in parallel.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<DiagramId, Arc<Mutex<DiagramSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, id: &DiagramId) -> Arc<Mutex<DiagramSession>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(DiagramSession::new())))
            .clone()
    }

    /// Drops the session when a diagram closes. Returns whether one existed.
    pub fn close(&self, id: &DiagramId) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(id).is_some()
    }

    pub fn open_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinning_is_idempotent() {
        let mut pins = PinSet::new();
        assert!(pins.pin("a"));
        assert!(!pins.pin("a"), "second pin of the same id is a no-op");
        assert!(pins.is_pinned(&"a".into()));
        assert_eq!(pins.len(), 1);
        assert!(pins.unpin(&"a".into()));
        assert!(pins.is_empty());
    }

    #[test]
    fn pin_iteration_is_sorted() {
        let mut pins = PinSet::new();
        pins.pin_all(["c", "a", "b"]);
        let order: Vec<&str> = pins.iter().map(|id| id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn registry_shares_one_session_per_diagram() {
        let registry = SessionRegistry::new();
        let first = registry.session(&"d1".into());
        let second = registry.session(&"d1".into());
        assert!(Arc::ptr_eq(&first, &second));
        let other = registry.session(&"d2".into());
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.open_count(), 2);
    }

    #[test]
    fn close_discards_session_state() {
        let registry = SessionRegistry::new();
        {
            let session = registry.session(&"d1".into());
            session.lock().unwrap().pins.pin("a");
        }
        assert!(registry.close(&"d1".into()));
        let fresh = registry.session(&"d1".into());
        assert!(fresh.lock().unwrap().pins.is_empty());
        assert!(!registry.close(&"missing".into()));
    }
}
