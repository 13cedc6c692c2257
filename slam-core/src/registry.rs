//! Static effect registry — name to recyclable id.
//!
//! Ids are dense (`0..count`) and never shrink. Unregistering a name parks
//! its id under a placeholder `UnusedN`, where the placeholders always form
//! an unbroken chain `Unused0..=UnusedH`. Registering takes the id back from
//! the top of that chain before growing, so register/unregister cycles never
//! grow the id space once a chain exists.

use std::collections::HashMap;

use crate::types::EffectId;

const PLACEHOLDER_PREFIX: &str = "Unused";

/// How [`EffectRegistry::register`] satisfied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The name was already bound.
    Existing(EffectId),
    /// A parked id was rebound to the name.
    Reused(EffectId),
    /// A brand-new id was allocated; every entity state must grow one slot.
    Allocated(EffectId),
}

impl Registration {
    /// The id now bound to the name.
    #[must_use]
    pub fn id(self) -> EffectId {
        match self {
            Self::Existing(id) | Self::Reused(id) | Self::Allocated(id) => id,
        }
    }
}

/// Global mapping from effect name to id.
#[derive(Debug, Clone, Default)]
pub struct EffectRegistry {
    ids: HashMap<String, EffectId>,
    count: u32,
}

/// Placeholder name parking a freed id at chain position `n`.
#[must_use]
pub fn placeholder_name(n: u32) -> String {
    format!("{PLACEHOLDER_PREFIX}{n}")
}

impl EffectRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated ids (live and parked).
    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Id bound to `name`, if any.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<EffectId> {
        self.ids.get(name).copied()
    }

    /// All `(name, id)` bindings, placeholders included.
    pub fn entries(&self) -> impl Iterator<Item = (&str, EffectId)> {
        self.ids.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Index of the last placeholder in the unbroken `Unused0..` chain.
    fn chain_top(&self) -> Option<u32> {
        let mut top = None;
        let mut next = 0_u32;
        while self.ids.contains_key(&placeholder_name(next)) {
            top = Some(next);
            next += 1;
        }
        top
    }

    /// Bind `name` to an id, reusing a parked id when one exists.
    pub fn register(&mut self, name: &str) -> Registration {
        if let Some(id) = self.id_of(name) {
            return Registration::Existing(id);
        }

        if let Some(top) = self.chain_top() {
            if let Some(id) = self.ids.remove(&placeholder_name(top)) {
                self.ids.insert(name.to_string(), id);
                return Registration::Reused(id);
            }
        }

        let id = EffectId(self.count);
        self.ids.insert(name.to_string(), id);
        self.count += 1;
        Registration::Allocated(id)
    }

    /// Unbind `name`, parking its id at the top of the placeholder chain.
    ///
    /// Returns the freed id, or `None` when the name was unknown.
    pub fn unregister(&mut self, name: &str) -> Option<EffectId> {
        let id = self.ids.remove(name)?;
        let next = self.chain_top().map_or(0, |top| top + 1);
        self.ids.insert(placeholder_name(next), id);
        Some(id)
    }

    /// Rebuild a registry from saved bindings.
    ///
    /// The caller validates that ids are below `count`.
    #[must_use]
    pub fn from_parts(ids: HashMap<String, EffectId>, count: u32) -> Self {
        Self { ids, count }
    }

    /// Forget every binding.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent() {
        let mut reg = EffectRegistry::new();
        assert_eq!(reg.register("Heat"), Registration::Allocated(EffectId(0)));
        assert_eq!(reg.register("Heat"), Registration::Existing(EffectId(0)));
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn unregister_then_register_reuses_id() {
        let mut reg = EffectRegistry::new();
        let a = reg.register("A").id();
        assert_eq!(reg.unregister("A"), Some(a));
        assert_eq!(reg.id_of("Unused0"), Some(a));

        assert_eq!(reg.register("B"), Registration::Reused(a));
        assert_eq!(reg.count(), 1);
        assert_eq!(reg.id_of("Unused0"), None);
    }

    #[test]
    fn freed_id_goes_to_next_registration() {
        let mut reg = EffectRegistry::new();
        let a = reg.register("A").id();
        let b = reg.register("B").id();
        reg.unregister("A");
        let c = reg.register("C").id();
        assert_eq!(c, a);
        assert_ne!(c, b);
        assert_eq!(reg.count(), 2);
    }

    #[test]
    fn chain_is_consumed_lifo() {
        let mut reg = EffectRegistry::new();
        let a = reg.register("A").id();
        let b = reg.register("B").id();
        let c = reg.register("C").id();
        reg.unregister("B");
        reg.unregister("A");
        reg.unregister("C");
        assert_eq!(reg.id_of("Unused0"), Some(b));
        assert_eq!(reg.id_of("Unused1"), Some(a));
        assert_eq!(reg.id_of("Unused2"), Some(c));

        assert_eq!(reg.register("X").id(), c);
        assert_eq!(reg.register("Y").id(), a);
        assert_eq!(reg.register("Z").id(), b);
        assert_eq!(reg.register("W"), Registration::Allocated(EffectId(3)));
    }

    #[test]
    fn unknown_unregister_is_noop() {
        let mut reg = EffectRegistry::new();
        reg.register("A");
        assert_eq!(reg.unregister("nope"), None);
        assert_eq!(reg.entries().count(), 1);
    }

    #[test]
    fn every_id_has_exactly_one_name() {
        let mut reg = EffectRegistry::new();
        for name in ["a", "b", "c", "d"] {
            reg.register(name);
        }
        reg.unregister("b");
        reg.unregister("d");
        reg.register("e");
        let mut ids: Vec<u32> = reg.entries().map(|(_, id)| id.0).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }
}
