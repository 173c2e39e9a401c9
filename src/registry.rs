//! Name-keyed container registry.
//!
//! The registry is the directory of shared state for one pipeline run: it
//! maps names to [`ContainerCell`]s and owns the run's
//! [`StreamState`]. Tasks resolve the containers they need by name (or by
//! capability) in `pre_process` and keep the returned handles; at most one
//! container of a given name is resolvable at a time.
//!
//! Insertion order is observable: [`find_by_capability`] returns the first
//! matching container in the order containers were added. The registry is
//! not thread-safe; the engine is single-threaded by contract.
//!
//! [`find_by_capability`]: Registry::find_by_capability
//!
//! # Example
//!
//! ```rust,ignore
//! use camshaft::container::Param;
//! use camshaft::registry::Registry;
//!
//! let mut registry = Registry::new();
//! registry.add(Param::new("EventCount", 0u64))?;
//!
//! let count = registry.get("EventCount")?;
//! count.borrow_mut_as::<Param<u64>>().unwrap().value += 1;
//! ```

use crate::container::{Capability, Container, ContainerCell, ContainerRef};
use crate::error::{Error, Result};
use crate::stream::StreamState;
use std::rc::Rc;

/// Name → container directory for one pipeline run.
pub struct Registry {
    slots: Vec<ContainerRef>,
    stream: Rc<StreamState>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            stream: StreamState::new(),
        }
    }

    /// Shared handle to the run's stream state.
    ///
    /// Task lists and reader tasks cache this in `pre_process`.
    pub fn stream_state(&self) -> Rc<StreamState> {
        Rc::clone(&self.stream)
    }

    /// Look up a container by exact name.
    pub fn find(&self, name: &str) -> Option<ContainerRef> {
        self.slots.iter().find(|c| c.name() == name).cloned()
    }

    /// Look up a container by exact name, failing if it is missing.
    ///
    /// The error-returning form suits `pre_process`, where a missing
    /// container is a fatal setup error.
    pub fn get(&self, name: &str) -> Result<ContainerRef> {
        self.find(name)
            .ok_or_else(|| Error::MissingContainer(name.to_string()))
    }

    /// Look up the first container (in insertion order) advertising a
    /// capability.
    pub fn find_by_capability(&self, cap: Capability) -> Option<ContainerRef> {
        self.slots.iter().find(|c| c.has_capability(cap)).cloned()
    }

    /// Capability lookup, failing if nothing advertises the capability.
    pub fn get_by_capability(&self, cap: Capability) -> Result<ContainerRef> {
        self.find_by_capability(cap)
            .ok_or(Error::MissingCapability(cap))
    }

    /// Register a container under its own name.
    ///
    /// Fails if the name is already bound; overwriting requires an explicit
    /// [`replace`](Registry::replace). Returns the shared cell so the
    /// caller can keep a handle.
    pub fn add(&mut self, container: impl Container) -> Result<ContainerRef> {
        self.add_boxed(Box::new(container))
    }

    fn add_boxed(&mut self, container: Box<dyn Container>) -> Result<ContainerRef> {
        if self.find(container.name()).is_some() {
            tracing::warn!(name = container.name(), "container already registered");
            return Err(Error::DuplicateContainer(container.name().to_string()));
        }
        let cell = ContainerCell::from_boxed(container);
        self.slots.push(Rc::clone(&cell));
        tracing::debug!(name = cell.name(), "container registered");
        Ok(cell)
    }

    /// Register an externally created cell.
    ///
    /// The caller keeps its handle; the registry only holds a reference,
    /// so the container outlives the registry if the caller retains one.
    pub fn add_shared(&mut self, cell: ContainerRef) -> Result<()> {
        if self.find(cell.name()).is_some() {
            tracing::warn!(name = cell.name(), "container already registered");
            return Err(Error::DuplicateContainer(cell.name().to_string()));
        }
        tracing::debug!(name = cell.name(), "container registered (shared)");
        self.slots.push(cell);
        Ok(())
    }

    /// Bind a container, atomically swapping out any existing binding of
    /// the same name.
    ///
    /// Existing handles to the binding keep pointing at the same cell and
    /// observe the new payload; this is how a calibration set or a
    /// sub-pipeline is hot-swapped between contexts. If the name was
    /// unbound the container is simply added.
    pub fn replace(&mut self, container: impl Container) -> ContainerRef {
        match self.find(container.name()) {
            Some(cell) => {
                tracing::debug!(name = cell.name(), "container replaced");
                cell.swap_payload(Box::new(container));
                cell
            }
            None => {
                let cell = ContainerCell::from_boxed(Box::new(container));
                tracing::debug!(name = cell.name(), "container registered");
                self.slots.push(Rc::clone(&cell));
                cell
            }
        }
    }

    /// Look up a container by name, creating it if absent.
    ///
    /// An existing binding must hold a `C`; anything else is a setup
    /// error. `init` runs only when the name is unbound and must produce a
    /// container registered under `name`.
    pub fn find_create<C, F>(&mut self, name: &str, init: F) -> Result<ContainerRef>
    where
        C: Container,
        F: FnOnce() -> C,
    {
        if let Some(cell) = self.find(name) {
            if !cell.is::<C>() {
                return Err(Error::WrongContainerType {
                    name: name.to_string(),
                    expected: std::any::type_name::<C>(),
                });
            }
            return Ok(cell);
        }
        let container = init();
        debug_assert_eq!(container.name(), name);
        self.add_boxed(Box::new(container))
    }

    /// Remove a binding, returning the cell if it existed.
    pub fn remove(&mut self, name: &str) -> Option<ContainerRef> {
        let idx = self.slots.iter().position(|c| c.name() == name)?;
        Some(self.slots.remove(idx))
    }

    /// Number of registered containers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate over the registered cells in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ContainerRef> {
        self.slots.iter()
    }

    /// Run every container's per-tick reset hook and clear the changed
    /// flags. Called by the event loop before each tick.
    pub(crate) fn reset_all(&self) {
        for cell in &self.slots {
            cell.reset();
        }
    }

    /// Clear all changed flags without resetting contents.
    pub(crate) fn clear_changed(&self) {
        for cell in &self.slots {
            cell.clear_changed();
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("containers", &self.slots.len())
            .field("epoch", &self.stream.epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Param;
    use std::any::Any;

    struct Geometry {
        name: String,
    }

    impl Container for Geometry {
        fn name(&self) -> &str {
            &self.name
        }
        fn capabilities(&self) -> &[Capability] {
            &["geometry"]
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_find_returns_same_cell() {
        let mut registry = Registry::new();
        let added = registry.add(Param::new("X", 7i32)).unwrap();

        let found = registry.find("X").unwrap();
        assert!(Rc::ptr_eq(&added, &found));

        // Identity is stable across any number of lookups.
        let again = registry.find("X").unwrap();
        assert!(Rc::ptr_eq(&found, &again));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = Registry::new();
        registry.add(Param::new("X", 1i32)).unwrap();

        let err = registry.add(Param::new("X", 2i32)).unwrap_err();
        assert!(matches!(err, Error::DuplicateContainer(_)));
    }

    #[test]
    fn test_replace_swaps_in_place() {
        let mut registry = Registry::new();
        let before = registry.add(Param::new("X", 1i32)).unwrap();

        let after = registry.replace(Param::new("X", 2i32));
        assert!(Rc::ptr_eq(&before, &after));
        assert_eq!(before.borrow_as::<Param<i32>>().unwrap().value, 2);
    }

    #[test]
    fn test_replace_unbound_adds() {
        let mut registry = Registry::new();
        registry.replace(Param::new("X", 1i32));
        assert_eq!(registry.get("X").unwrap().borrow_as::<Param<i32>>().unwrap().value, 1);
    }

    #[test]
    fn test_capability_lookup_is_insertion_ordered() {
        let mut registry = Registry::new();
        registry.add(Param::new("Plain", 0i32)).unwrap();
        registry
            .add(Geometry {
                name: "GeomA".into(),
            })
            .unwrap();
        registry
            .add(Geometry {
                name: "GeomB".into(),
            })
            .unwrap();

        let hit = registry.find_by_capability("geometry").unwrap();
        assert_eq!(hit.name(), "GeomA");
        assert!(matches!(
            registry.get_by_capability("pointing").unwrap_err(),
            Error::MissingCapability("pointing")
        ));
    }

    #[test]
    fn test_find_create() {
        let mut registry = Registry::new();

        let created = registry
            .find_create("Flagged", || Param::new("Flagged", false))
            .unwrap();
        let found = registry
            .find_create("Flagged", || Param::new("Flagged", true))
            .unwrap();
        assert!(Rc::ptr_eq(&created, &found));
        assert!(!found.borrow_as::<Param<bool>>().unwrap().value);

        let err = registry
            .find_create("Flagged", || Param::new("Flagged", 0i32))
            .unwrap_err();
        assert!(matches!(err, Error::WrongContainerType { .. }));
    }

    #[test]
    fn test_missing_container() {
        let registry = Registry::new();
        assert!(registry.find("Nope").is_none());
        assert!(matches!(
            registry.get("Nope").unwrap_err(),
            Error::MissingContainer(_)
        ));
    }

    #[test]
    fn test_remove() {
        let mut registry = Registry::new();
        registry.add(Param::new("X", 1i32)).unwrap();
        assert!(registry.remove("X").is_some());
        assert!(registry.find("X").is_none());
        assert!(registry.remove("X").is_none());
    }
}
