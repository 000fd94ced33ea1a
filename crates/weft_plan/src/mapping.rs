//! Memo of lowered entities.
//!
//! Lookup is keyed by entity identity. Entries are also kept in insertion
//! order, and since a spec is recorded only after everything it depends
//! on, that order is a valid registration order.

use std::collections::HashMap;
use std::sync::Arc;
use weft_core::EntityId;
use weft_model::ControlPlaneEntity;

/// One recorded lowering
#[derive(Debug, Clone)]
pub struct MappingEntry {
    /// Identity of the authored entity
    pub key: EntityId,
    /// Kind of the authored entity
    pub kind: &'static str,
    /// Name of the authored entity
    pub name: String,
    /// Lowered form
    pub spec: Arc<ControlPlaneEntity>,
}

/// Authored entity identity to lowered form, in insertion order
#[derive(Debug, Clone, Default)]
pub struct EntityMapping {
    lookup: HashMap<EntityId, Arc<ControlPlaneEntity>>,
    log: Vec<MappingEntry>,
}

impl EntityMapping {
    /// Empty mapping
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowered form of `key`, if recorded
    #[must_use]
    pub fn get(&self, key: EntityId) -> Option<Arc<ControlPlaneEntity>> {
        self.lookup.get(&key).cloned()
    }

    /// Whether `key` is recorded
    #[must_use]
    pub fn contains(&self, key: EntityId) -> bool {
        self.lookup.contains_key(&key)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether nothing is recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Insertion position of `key`
    #[must_use]
    pub fn position(&self, key: EntityId) -> Option<usize> {
        self.log.iter().position(|e| e.key == key)
    }

    /// Entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = &MappingEntry> {
        self.log.iter()
    }

    /// Registrable entries in dependency order
    ///
    /// Placeholders and node or branch IR are skipped.
    pub fn registration_plan(&self) -> impl Iterator<Item = &MappingEntry> {
        self.log.iter().filter(|e| e.spec.is_registrable())
    }

    /// Record `spec` for `key` unless already present
    ///
    /// Returns the recorded value, which is the earlier one if `key` was
    /// already present.
    pub(crate) fn insert(
        &mut self,
        key: EntityId,
        kind: &'static str,
        name: &str,
        spec: ControlPlaneEntity,
    ) -> Arc<ControlPlaneEntity> {
        if let Some(existing) = self.lookup.get(&key) {
            return Arc::clone(existing);
        }
        let spec = Arc::new(spec);
        self.lookup.insert(key, Arc::clone(&spec));
        self.log.push(MappingEntry {
            key,
            kind,
            name: name.to_string(),
            spec: Arc::clone(&spec),
        });
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_first() {
        let mut m = EntityMapping::new();
        let key = EntityId::new();
        m.insert(key, "reference", "r", ControlPlaneEntity::Placeholder);
        m.insert(key, "reference", "r", ControlPlaneEntity::Placeholder);
        assert_eq!(m.len(), 1);
        assert!(m.contains(key));
        assert_eq!(m.position(key), Some(0));
    }

    #[test]
    fn test_placeholders_not_in_plan() {
        let mut m = EntityMapping::new();
        m.insert(EntityId::new(), "reference", "r", ControlPlaneEntity::Placeholder);
        assert_eq!(m.entries().count(), 1);
        assert_eq!(m.registration_plan().count(), 0);
        assert!(m.get(EntityId::new()).is_none());
    }
}
