//! Shared parameter containers.
//!
//! Containers are the units of shared, mutable state that tasks exchange
//! across ticks: a pointing position, a set of calibration constants, an
//! event record. Each container has a name that is unique within a
//! [`Registry`](crate::registry::Registry) and an explicitly declared set of
//! [`Capability`] tags that polymorphic lookups match against.
//!
//! Containers live in [`ContainerCell`]s: shared, interior-mutable cells
//! handed out by the registry. Tasks resolve the cells they need once, in
//! `pre_process`, and keep the handles for the rest of the run; the cell
//! contents mutate every tick while the bindings stay stable.
//!
//! # Example
//!
//! ```rust,ignore
//! use camshaft::container::{Capability, Container, Param};
//!
//! struct Pointing {
//!     name: String,
//!     zenith: f64,
//!     azimuth: f64,
//! }
//!
//! impl Container for Pointing {
//!     fn name(&self) -> &str {
//!         &self.name
//!     }
//!     fn capabilities(&self) -> &[Capability] {
//!         &["pointing"]
//!     }
//!     fn as_any(&self) -> &dyn std::any::Any {
//!         self
//!     }
//!     fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
//!         self
//!     }
//! }
//! ```

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

/// Capability tag matched by polymorphic registry lookups.
///
/// Capabilities are declared explicitly by each container type via
/// [`Container::capabilities`]; there is no runtime type inspection beyond
/// the tags a container chooses to advertise.
pub type Capability = &'static str;

/// A unit of shared, mutable state identified by name.
///
/// Implementations declare their identity ([`name`](Container::name)), the
/// capability tags they answer to, and an optional per-tick
/// [`reset`](Container::reset) hook for state that must not leak from one
/// tick into the next. The `as_any` pair enables typed access through
/// [`ContainerCell::borrow_as`] and friends.
pub trait Container: Any {
    /// Name this container is registered under.
    fn name(&self) -> &str;

    /// Capability tags this container advertises.
    ///
    /// The default is the empty set: the container is only reachable by
    /// exact name.
    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    /// Clear per-tick state.
    ///
    /// Called by the event loop before every tick. The default does
    /// nothing, which is right for state that accumulates across ticks
    /// (counters, calibration constants).
    fn reset(&mut self) {}

    /// Upcast for typed read access.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for typed write access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared cell holding one registered container.
///
/// The cell owns the container behind a `RefCell` and carries the
/// changed/ready-to-save flag: producers mark the cell after writing fresh
/// data, consumers such as writer tasks test it. Flags are cleared by the
/// event loop at the start of every tick, so "changed" always describes the
/// current tick.
///
/// Cells are reference counted; the registry and any task that cached the
/// handle in `pre_process` share the same cell. Dropping the registry drops
/// its handles, and a container with no other holders is destroyed with it.
pub struct ContainerCell {
    name: String,
    payload: RefCell<Box<dyn Container>>,
    changed: Cell<bool>,
}

/// Shared handle to a [`ContainerCell`].
pub type ContainerRef = Rc<ContainerCell>;

impl ContainerCell {
    /// Wrap a container in a fresh shared cell.
    pub fn new(container: impl Container) -> ContainerRef {
        Self::from_boxed(Box::new(container))
    }

    pub(crate) fn from_boxed(container: Box<dyn Container>) -> ContainerRef {
        Rc::new(Self {
            name: container.name().to_string(),
            payload: RefCell::new(container),
            changed: Cell::new(false),
        })
    }

    /// Name of the contained container.
    ///
    /// The name is fixed when the cell is created and survives
    /// [`replace`](crate::registry::Registry::replace) swaps, which preserve
    /// the binding.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the container dynamically.
    ///
    /// # Panics
    ///
    /// Panics if the container is currently borrowed mutably, which cannot
    /// happen under the engine's single-task-at-a-time execution model
    /// unless a task holds a borrow across a `process` boundary.
    pub fn borrow(&self) -> Ref<'_, dyn Container> {
        Ref::map(self.payload.borrow(), |b| &**b)
    }

    /// Borrow the container dynamically for writing.
    pub fn borrow_mut(&self) -> RefMut<'_, dyn Container> {
        RefMut::map(self.payload.borrow_mut(), |b| &mut **b)
    }

    /// Borrow the container as a concrete type.
    ///
    /// Returns `None` if the payload is not a `T`.
    pub fn borrow_as<T: Container>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.payload.borrow(), |b| b.as_any().downcast_ref::<T>()).ok()
    }

    /// Borrow the container as a concrete type for writing.
    ///
    /// Returns `None` if the payload is not a `T`.
    pub fn borrow_mut_as<T: Container>(&self) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.payload.borrow_mut(), |b| {
            b.as_any_mut().downcast_mut::<T>()
        })
        .ok()
    }

    /// Check whether the payload is a `T`.
    pub fn is<T: Container>(&self) -> bool {
        self.payload.borrow().as_any().is::<T>()
    }

    /// Check whether the container advertises a capability.
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.payload.borrow().capabilities().contains(&cap)
    }

    /// Mark the contents as changed this tick.
    pub fn mark_changed(&self) {
        self.changed.set(true);
    }

    /// Whether the contents were marked changed this tick.
    pub fn is_changed(&self) -> bool {
        self.changed.get()
    }

    /// Clear the changed flag.
    pub fn clear_changed(&self) {
        self.changed.set(false);
    }

    /// Run the per-tick reset hook and clear the changed flag.
    pub(crate) fn reset(&self) {
        self.payload.borrow_mut().reset();
        self.changed.set(false);
    }

    /// Swap the payload, keeping the name binding. Used by `replace`.
    pub(crate) fn swap_payload(&self, container: Box<dyn Container>) {
        *self.payload.borrow_mut() = container;
        self.changed.set(false);
    }
}

impl std::fmt::Debug for ContainerCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerCell")
            .field("name", &self.name)
            .field("changed", &self.changed.get())
            .finish()
    }
}

/// Generic single-value container.
///
/// Covers the common case of sharing one plain value (a counter, a scale
/// factor, a record) between tasks without writing a dedicated container
/// type.
///
/// # Example
///
/// ```rust,ignore
/// use camshaft::container::Param;
///
/// let mut registry = Registry::new();
/// let count = registry.add(Param::new("EventCount", 0u64))?;
///
/// count.borrow_mut_as::<Param<u64>>().unwrap().value += 1;
/// ```
pub struct Param<T> {
    name: String,
    /// The shared value.
    pub value: T,
}

impl<T: 'static> Param<T> {
    /// Create a named parameter with an initial value.
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl<T: 'static> Container for Param<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Geometry {
        name: String,
        pixels: u32,
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
    fn test_typed_borrow() {
        let cell = ContainerCell::new(Geometry {
            name: "CamGeom".into(),
            pixels: 577,
        });

        assert_eq!(cell.name(), "CamGeom");
        assert_eq!(cell.borrow_as::<Geometry>().unwrap().pixels, 577);
        assert!(cell.borrow_as::<Param<u64>>().is_none());

        cell.borrow_mut_as::<Geometry>().unwrap().pixels = 1039;
        assert_eq!(cell.borrow_as::<Geometry>().unwrap().pixels, 1039);
    }

    #[test]
    fn test_capabilities() {
        let cell = ContainerCell::new(Geometry {
            name: "CamGeom".into(),
            pixels: 577,
        });
        assert!(cell.has_capability("geometry"));
        assert!(!cell.has_capability("pointing"));
    }

    #[test]
    fn test_changed_flag() {
        let cell = ContainerCell::new(Param::new("X", 1i32));
        assert!(!cell.is_changed());

        cell.mark_changed();
        assert!(cell.is_changed());

        cell.reset();
        assert!(!cell.is_changed());
    }

    #[test]
    fn test_swap_keeps_name() {
        let cell = ContainerCell::new(Param::new("X", 1i32));
        cell.swap_payload(Box::new(Param::new("X", 2i32)));
        assert_eq!(cell.name(), "X");
        assert_eq!(cell.borrow_as::<Param<i32>>().unwrap().value, 2);
    }
}
