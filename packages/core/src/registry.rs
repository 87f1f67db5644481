//! The polymorphic construction registry.
//!
//! Each domain (geometry, feature, filter, style, workspace) keeps an
//! ordered list of capability entries. Dispatch is a first-match scan in
//! registration order - deliberately not best-match scoring, so registration
//! order is the documented tie-break rule. Registries are append-only.

use crate::Error;

/// Predicate over a configuration object.
pub type HandlesFn<C> = Box<dyn Fn(&C) -> bool + Send + Sync>;

/// Constructor from a configuration object.
pub type ConstructFn<C, T> = Box<dyn Fn(&C) -> Result<T, Error> + Send + Sync>;

/// The optional wrapping half of an entry: lifts a foreign handle (for
/// example a live store connection) into the registered type.
pub struct WrapEntry<H, T> {
    pub matches: Box<dyn Fn(&H) -> bool + Send + Sync>,
    pub wrap: Box<dyn Fn(H) -> Result<T, Error> + Send + Sync>,
}

/// One registration: a capability predicate plus a constructor, and
/// optionally a wrap predicate for foreign handles.
pub struct Entry<C, H, T> {
    /// Name used in diagnostics only; never part of dispatch.
    pub name: &'static str,
    pub handles: HandlesFn<C>,
    pub construct: ConstructFn<C, T>,
    pub wraps: Option<WrapEntry<H, T>>,
}

impl<C, H, T> Entry<C, H, T> {
    pub fn new(
        name: &'static str,
        handles: impl Fn(&C) -> bool + Send + Sync + 'static,
        construct: impl Fn(&C) -> Result<T, Error> + Send + Sync + 'static,
    ) -> Self {
        Entry {
            name,
            handles: Box::new(handles),
            construct: Box::new(construct),
            wraps: None,
        }
    }

    /// Attach a wrap half. Entries exposing wrap predicates should be
    /// registered most-specific first.
    pub fn wrapping(
        mut self,
        matches: impl Fn(&H) -> bool + Send + Sync + 'static,
        wrap: impl Fn(H) -> Result<T, Error> + Send + Sync + 'static,
    ) -> Self {
        self.wraps = Some(WrapEntry {
            matches: Box::new(matches),
            wrap: Box::new(wrap),
        });
        self
    }
}

/// An ordered capability-dispatch table for one domain.
pub struct TypeRegistry<C, H, T> {
    entries: Vec<Entry<C, H, T>>,
}

impl<C, H, T> TypeRegistry<C, H, T> {
    pub fn new() -> Self {
        TypeRegistry {
            entries: Vec::new(),
        }
    }

    /// Append an entry. No validation of predicate correctness happens here.
    pub fn register(&mut self, entry: Entry<C, H, T>) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Construct an instance from a configuration object.
    ///
    /// Entries are scanned in registration order; the first predicate to
    /// return true selects the constructor. No match is a resolution
    /// failure - never a silent default.
    pub fn create(&self, config: &C) -> Result<T, Error>
    where
        C: std::fmt::Debug,
    {
        for entry in &self.entries {
            if (entry.handles)(config) {
                return (entry.construct)(config);
            }
        }
        Err(Error::resolution(format!("{:?}", config)))
    }

    /// Lift a foreign handle into the richest-available wrapping type.
    pub fn create_from_handle(&self, handle: H) -> Result<T, Error> {
        for entry in &self.entries {
            if let Some(wrap_entry) = &entry.wraps {
                if (wrap_entry.matches)(&handle) {
                    return (wrap_entry.wrap)(handle);
                }
            }
        }
        Err(Error::resolution("no registered type wraps this handle"))
    }
}

impl<C, H, T> Default for TypeRegistry<C, H, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value as Json};

    #[derive(Debug, PartialEq)]
    enum Animal {
        Cat,
        Dog,
        AnyPet,
    }

    fn registry() -> TypeRegistry<Json, String, Animal> {
        let mut reg = TypeRegistry::new();
        reg.register(Entry::new(
            "cat",
            |c: &Json| c.get("meows").and_then(Json::as_bool) == Some(true),
            |_| Ok(Animal::Cat),
        ));
        reg.register(
            Entry::new(
                "dog",
                |c: &Json| c.get("barks").and_then(Json::as_bool) == Some(true),
                |_| Ok(Animal::Dog),
            )
            .wrapping(|h: &String| h == "leash", |_| Ok(Animal::Dog)),
        );
        reg.register(
            Entry::new("pet", |c: &Json| c.get("pet").is_some(), |_| Ok(Animal::AnyPet))
                .wrapping(|_h| true, |_| Ok(Animal::AnyPet)),
        );
        reg
    }

    #[test]
    fn first_match_wins_in_registration_order() {
        let reg = registry();
        // Matches both "cat" (meows) and "pet" (pet key); cat is registered first.
        let config = json!({"meows": true, "pet": true});
        assert_eq!(reg.create(&config).unwrap(), Animal::Cat);
    }

    #[test]
    fn repeated_create_is_deterministic() {
        let reg = registry();
        let config = json!({"barks": true});
        for _ in 0..10 {
            assert_eq!(reg.create(&config).unwrap(), Animal::Dog);
        }
    }

    #[test]
    fn no_match_is_a_resolution_error() {
        let reg = registry();
        let err = reg.create(&json!({"hisses": true})).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn empty_registry_always_fails() {
        let reg: TypeRegistry<Json, String, Animal> = TypeRegistry::new();
        let err = reg.create(&json!({})).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn wrap_prefers_most_specific_registration() {
        let reg = registry();
        // "leash" matches both dog (specific) and pet (catch-all); dog first.
        assert_eq!(
            reg.create_from_handle("leash".to_string()).unwrap(),
            Animal::Dog
        );
        assert_eq!(
            reg.create_from_handle("anything".to_string()).unwrap(),
            Animal::AnyPet
        );
    }

    #[test]
    fn wrap_without_matching_entry_fails() {
        let mut reg: TypeRegistry<Json, String, Animal> = TypeRegistry::new();
        reg.register(Entry::new("cat", |_| true, |_| Ok(Animal::Cat)));
        // "cat" has no wrap half, so handle resolution fails.
        let err = reg.create_from_handle("leash".to_string()).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }
}
