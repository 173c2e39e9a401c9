//! Filter flags, conditions and the gate task.
//!
//! Conditional execution in a pipeline has exactly one mechanism: a task
//! returns [`Flow::SkipRest`] and the rest of its list is skipped for the
//! tick. The filter machinery packages that mechanism:
//!
//! - a *filter* is any task that computes a boolean per tick and publishes
//!   it as a [`Flag`] container ([`FnFilter`] covers the common
//!   closure-shaped case);
//! - a [`FilterCondition`] names one or more flags, each optionally
//!   inverted, combined by AND;
//! - a [`FilterGate`] is a task that returns `SkipRest` when its condition
//!   is false.
//!
//! The same [`FilterCondition`] can be attached to a single
//! [`TaskEntry`](crate::task::TaskEntry) instead, which suppresses just
//! that task without consuming the tick.
//!
//! Flags are resolved by name at `pre_process`, so the filter task has to
//! be registered ahead of its consumers in the list; that is the natural
//! order anyway, since the flag must be computed before it is consulted.
//!
//! # Example
//!
//! ```rust,ignore
//! use camshaft::prelude::*;
//!
//! let mut list = TaskList::new("main");
//! list.add(reader);
//! list.add(FnFilter::new("SizeCut", move || {
//!     hillas.borrow_as::<Param<f64>>().unwrap().value > 20.0
//! }));
//! list.add(FilterGate::new(FilterCondition::when("SizeCut")));
//! list.add(writer); // only runs on ticks passing the cut
//! ```

use crate::container::{Capability, Container, ContainerRef};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::task::{Flow, Setup, Task};
use smallvec::SmallVec;
use std::any::Any;

/// Capability advertised by every [`Flag`] container.
pub const FILTER_FLAG: Capability = "filter-flag";

// ============================================================================
// Flag Container
// ============================================================================

/// Boolean filter result published as a container.
///
/// Producers (filter tasks) write the value each tick; conditions read it.
/// The flag keeps its last computed value across ticks, so a filter that is
/// itself skipped (stream mismatch) leaves its previous verdict standing.
pub struct Flag {
    name: String,
    value: bool,
}

impl Flag {
    /// Create a named flag, initially false.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: false,
        }
    }

    /// Current value.
    pub fn get(&self) -> bool {
        self.value
    }

    /// Set the value for this tick.
    pub fn set(&mut self, value: bool) {
        self.value = value;
    }
}

impl Container for Flag {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &[FILTER_FLAG]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Conditions
// ============================================================================

#[derive(Debug)]
struct FlagRef {
    name: String,
    invert: bool,
    cell: Option<ContainerRef>,
}

impl FlagRef {
    fn is_true(&self) -> bool {
        let value = self
            .cell
            .as_ref()
            .and_then(|cell| cell.borrow_as::<Flag>().map(|flag| flag.get()))
            .unwrap_or(false);
        value != self.invert
    }
}

/// A conjunction of named flags, each optionally inverted.
///
/// Built with [`when`](FilterCondition::when)/[`unless`]
/// (FilterCondition::unless) and extended with [`and`](FilterCondition::and)
/// /[`and_not`](FilterCondition::and_not). Flag names are resolved against
/// the registry at `pre_process`; a missing flag is a fatal setup error.
pub struct FilterCondition {
    flags: SmallVec<[FlagRef; 2]>,
}

impl FilterCondition {
    /// Condition that is true when the named flag is true.
    pub fn when(flag: impl Into<String>) -> Self {
        Self {
            flags: SmallVec::from_iter([FlagRef {
                name: flag.into(),
                invert: false,
                cell: None,
            }]),
        }
    }

    /// Condition that is true when the named flag is false.
    pub fn unless(flag: impl Into<String>) -> Self {
        Self {
            flags: SmallVec::from_iter([FlagRef {
                name: flag.into(),
                invert: true,
                cell: None,
            }]),
        }
    }

    /// AND another flag into the condition.
    pub fn and(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(FlagRef {
            name: flag.into(),
            invert: false,
            cell: None,
        });
        self
    }

    /// AND the inverse of another flag into the condition.
    pub fn and_not(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(FlagRef {
            name: flag.into(),
            invert: true,
            cell: None,
        });
        self
    }

    /// Resolve the named flags against the registry.
    ///
    /// Every name must be bound to a [`Flag`]; anything else is a setup
    /// error.
    pub(crate) fn resolve(&mut self, registry: &mut Registry) -> Result<()> {
        for flag in &mut self.flags {
            let cell = registry.get(&flag.name)?;
            if !cell.is::<Flag>() {
                return Err(Error::WrongContainerType {
                    name: flag.name.clone(),
                    expected: std::any::type_name::<Flag>(),
                });
            }
            flag.cell = Some(cell);
        }
        Ok(())
    }

    /// Evaluate the condition against the flags' current values.
    ///
    /// Unresolved conditions evaluate as false.
    pub(crate) fn is_true(&self) -> bool {
        self.flags.iter().all(FlagRef::is_true)
    }
}

impl std::fmt::Debug for FilterCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for flag in &self.flags {
            if flag.invert {
                list.entry(&format_args!("!{}", flag.name));
            } else {
                list.entry(&format_args!("{}", flag.name));
            }
        }
        list.finish()
    }
}

// ============================================================================
// Gate Task
// ============================================================================

/// Task that skips the rest of its list when a condition is false.
///
/// This is the branching primitive: place a gate in front of the tasks it
/// guards. On a false condition the gate returns [`Flow::SkipRest`]; the
/// enclosing list ends the tick there and reports `Continue` upward, so the
/// skip never looks like an error.
pub struct FilterGate {
    name: String,
    condition: FilterCondition,
    skipped: u64,
}

impl FilterGate {
    /// Create a gate for a condition.
    pub fn new(condition: FilterCondition) -> Self {
        Self {
            name: "FilterGate".to_string(),
            condition,
            skipped: 0,
        }
    }

    /// Set a custom name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of ticks this gate has skipped.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Task for FilterGate {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_process(&mut self, registry: &mut Registry) -> Result<Setup> {
        self.skipped = 0;
        self.condition.resolve(registry)?;
        Ok(Setup::Ready)
    }

    fn process(&mut self) -> Result<Flow> {
        if self.condition.is_true() {
            Ok(Flow::Continue)
        } else {
            self.skipped += 1;
            Ok(Flow::SkipRest)
        }
    }

    fn post_process(&mut self) -> Result<()> {
        tracing::debug!(
            gate = %self.name,
            condition = ?self.condition,
            skipped = self.skipped,
            "gate summary"
        );
        Ok(())
    }
}

// ============================================================================
// Closure Filters
// ============================================================================

/// Closure-backed filter task.
///
/// Publishes a [`Flag`] under the given name (creating it if absent) and
/// writes the predicate's result into it every tick. The closure typically
/// captures container handles obtained when the pipeline was assembled.
pub struct FnFilter<F> {
    flag_name: String,
    flag: Option<ContainerRef>,
    predicate: F,
}

impl<F: FnMut() -> bool> FnFilter<F> {
    /// Create a filter publishing `flag_name`.
    pub fn new(flag_name: impl Into<String>, predicate: F) -> Self {
        Self {
            flag_name: flag_name.into(),
            flag: None,
            predicate,
        }
    }
}

impl<F: FnMut() -> bool> Task for FnFilter<F> {
    fn name(&self) -> &str {
        &self.flag_name
    }

    fn pre_process(&mut self, registry: &mut Registry) -> Result<Setup> {
        let name = self.flag_name.clone();
        self.flag = Some(registry.find_create(&name, || Flag::new(name.clone()))?);
        Ok(Setup::Ready)
    }

    fn process(&mut self) -> Result<Flow> {
        let value = (self.predicate)();
        let cell = match &self.flag {
            Some(cell) => cell,
            None => return Err(Error::NotPreProcessed(self.flag_name.clone())),
        };
        match cell.borrow_mut_as::<Flag>() {
            Some(mut flag) => flag.set(value),
            None => {
                return Err(Error::WrongContainerType {
                    name: self.flag_name.clone(),
                    expected: std::any::type_name::<Flag>(),
                })
            }
        }
        cell.mark_changed();
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_resolution_requires_flag() {
        let mut registry = Registry::new();
        let mut condition = FilterCondition::when("Missing");
        assert!(matches!(
            condition.resolve(&mut registry).unwrap_err(),
            Error::MissingContainer(_)
        ));

        registry.add(crate::container::Param::new("NotAFlag", 1i32)).unwrap();
        let mut condition = FilterCondition::when("NotAFlag");
        assert!(matches!(
            condition.resolve(&mut registry).unwrap_err(),
            Error::WrongContainerType { .. }
        ));
    }

    #[test]
    fn test_condition_combinators() {
        let mut registry = Registry::new();
        let a = registry.add(Flag::new("A")).unwrap();
        let b = registry.add(Flag::new("B")).unwrap();

        let mut condition = FilterCondition::when("A").and_not("B");
        condition.resolve(&mut registry).unwrap();

        // A=false, B=false -> false
        assert!(!condition.is_true());

        a.borrow_mut_as::<Flag>().unwrap().set(true);
        // A=true, B=false -> true
        assert!(condition.is_true());

        b.borrow_mut_as::<Flag>().unwrap().set(true);
        // A=true, B=true -> false (inverted term)
        assert!(!condition.is_true());
    }

    #[test]
    fn test_unless() {
        let mut registry = Registry::new();
        registry.add(Flag::new("A")).unwrap();

        let mut condition = FilterCondition::unless("A");
        condition.resolve(&mut registry).unwrap();
        assert!(condition.is_true());
    }

    #[test]
    fn test_gate_skips_on_false() {
        let mut registry = Registry::new();
        let flag = registry.add(Flag::new("Cut")).unwrap();

        let mut gate = FilterGate::new(FilterCondition::when("Cut"));
        gate.pre_process(&mut registry).unwrap();

        assert_eq!(gate.process().unwrap(), Flow::SkipRest);

        flag.borrow_mut_as::<Flag>().unwrap().set(true);
        assert_eq!(gate.process().unwrap(), Flow::Continue);
        assert_eq!(gate.skipped(), 1);
    }

    #[test]
    fn test_fn_filter_publishes_flag() {
        let mut registry = Registry::new();

        let mut value = true;
        let mut filter = FnFilter::new("Cut", move || {
            let v = value;
            value = !value;
            v
        });

        filter.pre_process(&mut registry).unwrap();
        let flag = registry.get("Cut").unwrap();

        filter.process().unwrap();
        assert!(flag.borrow_as::<Flag>().unwrap().get());
        assert!(flag.is_changed());

        filter.process().unwrap();
        assert!(!flag.borrow_as::<Flag>().unwrap().get());
    }

    #[test]
    fn test_flag_capability() {
        let mut registry = Registry::new();
        registry.add(Flag::new("Cut")).unwrap();
        assert!(registry.find_by_capability(FILTER_FLAG).is_some());
    }
}
