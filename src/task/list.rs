//! Ordered, composable task sequences.

use crate::error::{Error, Result};
use crate::filter::FilterCondition;
use crate::observability;
use crate::registry::Registry;
use crate::stream::{StreamId, StreamState};
use crate::task::{Flow, Setup, Task};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// One scheduled task inside a [`TaskList`].
///
/// The entry carries everything the list needs to dispatch the task
/// (stream affinity, an optional filter condition, lifecycle flags and
/// execution statistics), so the task itself stays a plain [`Task`]
/// implementation.
///
/// # Example
///
/// ```rust,ignore
/// use camshaft::prelude::*;
///
/// let mut list = TaskList::new("main");
/// list.push(TaskEntry::new(CalcPedestal::new()).on_stream("Camera"));
/// list.push(TaskEntry::new(WriteOutput::new()).when(FilterCondition::when("SizeCut")));
/// ```
pub struct TaskEntry {
    task: Box<dyn Task>,
    stream_tag: Option<StreamId>,
    condition: Option<FilterCondition>,
    preprocessed: bool,
    withdrawn: bool,
    stats: EntryStats,
}

#[derive(Debug, Clone, Copy, Default)]
struct EntryStats {
    executions: u64,
    elapsed: Duration,
}

impl TaskEntry {
    /// Schedule a task with no affinity and no condition: it runs on every
    /// tick.
    pub fn new(task: impl Task + 'static) -> Self {
        Self {
            task: Box::new(task),
            stream_tag: None,
            condition: None,
            preprocessed: false,
            withdrawn: false,
            stats: EntryStats::default(),
        }
    }

    /// Restrict the entry to ticks whose active stream matches `tag`.
    ///
    /// The empty tag is the default "run on every stream"; setting it is
    /// equivalent to not restricting the entry at all.
    pub fn on_stream(mut self, tag: impl Into<StreamId>) -> Self {
        self.stream_tag = Some(tag.into());
        self
    }

    /// Gate the entry with a filter condition.
    ///
    /// When the condition is false for a tick the task is not executed and
    /// the call is not counted; the rest of the list runs normally.
    pub fn when(mut self, condition: FilterCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    fn active(&self) -> bool {
        self.preprocessed && !self.withdrawn
    }
}

impl std::fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEntry")
            .field("task", &self.task.name())
            .field("stream", &self.stream_tag)
            .field("gated", &self.condition.is_some())
            .finish()
    }
}

/// Execution statistics for one entry of a [`TaskList`].
#[derive(Debug, Clone)]
pub struct TaskStats {
    /// Task name.
    pub name: String,
    /// Stream affinity, if restricted.
    pub stream: Option<StreamId>,
    /// Number of `process` calls. Stream- and filter-skipped ticks are not
    /// counted.
    pub executions: u64,
    /// Wall-clock time spent in `process`.
    pub elapsed: Duration,
}

/// An ordered sequence of tasks, itself a [`Task`].
///
/// The list delegates each lifecycle phase to its entries in registration
/// order. During `process` it applies the dispatch rules: stream-mismatched
/// and filter-gated entries are skipped silently, a child's
/// [`Flow::SkipRest`] ends the tick for this list only (the list reports
/// `Continue` upward), and [`Flow::StopLoop`] or an error propagates
/// immediately.
///
/// Because a list is a task, lists nest: a sub-pipeline is just an entry,
/// optionally with its own stream affinity or filter condition, checked
/// once at the level of the enclosing list.
pub struct TaskList {
    name: String,
    entries: Vec<TaskEntry>,
    passes: u32,
    stream: Option<Rc<StreamState>>,
}

impl TaskList {
    /// Create an empty list.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            passes: 0,
            stream: None,
        }
    }

    /// Append a task with no affinity and no condition.
    pub fn add(&mut self, task: impl Task + 'static) -> &mut Self {
        self.push(TaskEntry::new(task))
    }

    /// Append a configured entry.
    pub fn push(&mut self, entry: TaskEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Run the children `passes` times per tick instead of once.
    ///
    /// Zero (the default) means a single pass. A pass ending in a local
    /// skip does not end the tick; `StopLoop` and errors do.
    pub fn set_passes(&mut self, passes: u32) {
        self.passes = passes;
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Per-entry execution statistics, in registration order.
    pub fn statistics(&self) -> Vec<TaskStats> {
        self.entries
            .iter()
            .map(|e| TaskStats {
                name: e.task.name().to_string(),
                stream: e.stream_tag.clone(),
                executions: e.stats.executions,
                elapsed: e.stats.elapsed,
            })
            .collect()
    }

    /// Post-process every entry whose `pre_process` succeeded, in order,
    /// clearing the flags. Returns the first error after the full sweep.
    fn sweep_post_process(&mut self) -> Result<()> {
        let mut first_err = None;
        for entry in &mut self.entries {
            if !entry.preprocessed {
                continue;
            }
            entry.preprocessed = false;
            if let Err(e) = entry.task.post_process() {
                tracing::error!(task = entry.task.name(), error = %e, "post-process failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// One pass over the children.
    fn process_once(&mut self, stream: &StreamState) -> Result<Flow> {
        for entry in &mut self.entries {
            if !entry.active() {
                continue;
            }

            // Stream gate: a mismatch skips the entry silently, neither
            // executed nor counted.
            if let Some(tag) = &entry.stream_tag {
                if !stream.admits(tag) {
                    observability::record_task_skipped();
                    continue;
                }
            }

            // Filter gate: same skip semantics as a stream mismatch.
            if let Some(condition) = &entry.condition {
                if !condition.is_true() {
                    observability::record_task_skipped();
                    continue;
                }
            }

            let started = Instant::now();
            entry.stats.executions += 1;
            let rc = entry.task.process();
            entry.stats.elapsed += started.elapsed();
            observability::record_task_execution();

            match rc {
                Ok(Flow::Continue) => {}
                Ok(Flow::SkipRest) => return Ok(Flow::SkipRest),
                Ok(Flow::StopLoop) => {
                    tracing::debug!(task = entry.task.name(), "requested loop stop");
                    return Ok(Flow::StopLoop);
                }
                Err(e) => {
                    tracing::error!(task = entry.task.name(), error = %e, "process failed");
                    return Err(e);
                }
            }
        }
        Ok(Flow::Continue)
    }
}

impl Task for TaskList {
    fn name(&self) -> &str {
        &self.name
    }

    fn pre_process(&mut self, registry: &mut Registry) -> Result<Setup> {
        tracing::debug!(list = %self.name, entries = self.entries.len(), "pre-processing");
        self.stream = Some(registry.stream_state());

        let mut failed = None;
        for entry in &mut self.entries {
            entry.preprocessed = false;
            entry.withdrawn = false;
            entry.stats = EntryStats::default();

            match entry.task.pre_process(registry) {
                Ok(Setup::Ready) => entry.preprocessed = true,
                Ok(Setup::Withdraw) => {
                    tracing::debug!(task = entry.task.name(), "withdrew from the run");
                    entry.withdrawn = true;
                    continue;
                }
                Err(e) => {
                    tracing::error!(task = entry.task.name(), error = %e, "pre-process failed");
                    failed = Some(e);
                    break;
                }
            }

            // The entry's filter condition resolves against flags that
            // earlier entries (the filter tasks) have published by now.
            if let Some(condition) = &mut entry.condition {
                if let Err(e) = condition.resolve(registry) {
                    tracing::error!(task = entry.task.name(), error = %e, "filter resolution failed");
                    failed = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failed {
            // Release whatever was already started before reporting the
            // setup failure; the failing task itself is never swept.
            if let Err(cleanup) = self.sweep_post_process() {
                tracing::warn!(list = %self.name, error = %cleanup, "cleanup after failed pre-process");
            }
            return Err(e);
        }
        Ok(Setup::Ready)
    }

    fn re_init(&mut self, registry: &mut Registry) -> Result<()> {
        tracing::debug!(list = %self.name, "re-initializing");
        for entry in &mut self.entries {
            if !entry.active() {
                continue;
            }
            if let Err(e) = entry.task.re_init(registry) {
                tracing::error!(task = entry.task.name(), error = %e, "re-init failed");
                return Err(e);
            }
        }
        Ok(())
    }

    fn process(&mut self) -> Result<Flow> {
        let stream = match &self.stream {
            Some(stream) => Rc::clone(stream),
            None => return Err(Error::NotPreProcessed(self.name.clone())),
        };

        if !self.entries.iter().any(TaskEntry::active) {
            tracing::warn!(list = %self.name, "nothing to process");
            return Ok(Flow::StopLoop);
        }

        let passes = self.passes.max(1);
        let mut rc = Flow::Continue;
        for _ in 0..passes {
            rc = self.process_once(&stream)?;
            if rc == Flow::StopLoop {
                break;
            }
        }

        // A local skip ends the tick for this list only; upward it is a
        // normal Continue.
        Ok(match rc {
            Flow::SkipRest => Flow::Continue,
            other => other,
        })
    }

    fn post_process(&mut self) -> Result<()> {
        tracing::debug!(list = %self.name, "post-processing");
        self.sweep_post_process()
    }

    fn log_statistics(&self, indent: usize) {
        if indent == 0 {
            tracing::info!("execution statistics for '{}':", self.name);
        }
        let pad = "  ".repeat(indent + 1);
        for entry in &self.entries {
            let tag = match &entry.stream_tag {
                Some(tag) if !tag.is_all() => format!("{tag}:"),
                _ => String::new(),
            };
            tracing::info!(
                "{pad}{tag}{}: {} call(s) in {:?}",
                entry.task.name(),
                entry.stats.executions,
                entry.stats.elapsed,
            );
            entry.task.log_statistics(indent + 1);
        }
    }
}

impl std::fmt::Debug for TaskList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskList")
            .field("name", &self.name)
            .field("entries", &self.entries)
            .field("passes", &self.passes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records lifecycle calls into a shared journal and answers `process`
    /// from a canned script.
    struct Scripted {
        name: String,
        journal: Rc<RefCell<Vec<String>>>,
        script: Vec<Result<Flow>>,
        tick: usize,
        fail_pre: bool,
    }

    impl Scripted {
        fn new(name: &str, journal: &Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                journal: Rc::clone(journal),
                script: Vec::new(),
                tick: 0,
                fail_pre: false,
            }
        }

        fn with_script(mut self, script: Vec<Result<Flow>>) -> Self {
            self.script = script;
            self
        }

        fn failing_pre_process(mut self) -> Self {
            self.fail_pre = true;
            self
        }

        fn log(&self, phase: &str) {
            self.journal.borrow_mut().push(format!("{}:{phase}", self.name));
        }
    }

    impl Task for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        fn pre_process(&mut self, _registry: &mut Registry) -> Result<Setup> {
            if self.fail_pre {
                return Err(Error::task_failed(&self.name, "scripted failure"));
            }
            self.log("pre");
            Ok(Setup::Ready)
        }

        fn process(&mut self) -> Result<Flow> {
            self.log("proc");
            let rc = if self.tick < self.script.len() {
                match &self.script[self.tick] {
                    Ok(flow) => Ok(*flow),
                    Err(_) => Err(Error::task_failed(&self.name, "scripted failure")),
                }
            } else {
                Ok(Flow::Continue)
            };
            self.tick += 1;
            rc
        }

        fn post_process(&mut self) -> Result<()> {
            self.log("post");
            Ok(())
        }
    }

    fn journal() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_skip_rest_is_local() {
        let log = journal();
        let mut registry = Registry::new();

        let mut list = TaskList::new("main");
        list.add(Scripted::new("a", &log).with_script(vec![Ok(Flow::SkipRest)]));
        list.add(Scripted::new("b", &log));

        assert_eq!(list.pre_process(&mut registry).unwrap(), Setup::Ready);

        // Tick 1: "a" skips the rest, "b" never runs, but the list itself
        // reports Continue.
        assert_eq!(list.process().unwrap(), Flow::Continue);
        assert!(!log.borrow().contains(&"b:proc".to_string()));

        // Tick 2: back to normal.
        assert_eq!(list.process().unwrap(), Flow::Continue);
        assert!(log.borrow().contains(&"b:proc".to_string()));
    }

    #[test]
    fn test_stop_loop_propagates() {
        let log = journal();
        let mut registry = Registry::new();

        let mut inner = TaskList::new("inner");
        inner.add(Scripted::new("a", &log).with_script(vec![Ok(Flow::StopLoop)]));
        inner.add(Scripted::new("b", &log));

        let mut outer = TaskList::new("outer");
        outer.add(inner);
        outer.add(Scripted::new("c", &log));

        outer.pre_process(&mut registry).unwrap();
        assert_eq!(outer.process().unwrap(), Flow::StopLoop);

        let entries = log.borrow();
        assert!(entries.contains(&"a:proc".to_string()));
        assert!(!entries.contains(&"b:proc".to_string()));
        assert!(!entries.contains(&"c:proc".to_string()));
    }

    #[test]
    fn test_failed_pre_process_cleans_up_started_entries() {
        let log = journal();
        let mut registry = Registry::new();

        let mut list = TaskList::new("main");
        list.add(Scripted::new("a", &log));
        list.add(Scripted::new("bad", &log).failing_pre_process());
        list.add(Scripted::new("c", &log));

        assert!(list.pre_process(&mut registry).is_err());

        let entries = log.borrow();
        // "a" was started and released; "bad" and "c" were not.
        assert!(entries.contains(&"a:pre".to_string()));
        assert!(entries.contains(&"a:post".to_string()));
        assert!(!entries.contains(&"bad:post".to_string()));
        assert!(!entries.contains(&"c:pre".to_string()));
        assert!(!entries.contains(&"c:post".to_string()));
    }

    #[test]
    fn test_process_error_propagates_and_stops_tick() {
        let log = journal();
        let mut registry = Registry::new();

        let mut list = TaskList::new("main");
        list.add(Scripted::new("bad", &log).with_script(vec![Err(Error::task_failed("bad", "x"))]));
        list.add(Scripted::new("b", &log));

        list.pre_process(&mut registry).unwrap();
        assert!(list.process().is_err());
        assert!(!log.borrow().contains(&"b:proc".to_string()));
    }

    #[test]
    fn test_stream_affinity_gates_entries() {
        let log = journal();
        let mut registry = Registry::new();
        let stream = registry.stream_state();

        let mut list = TaskList::new("main");
        list.push(TaskEntry::new(Scripted::new("cam", &log)).on_stream("Camera"));
        list.push(TaskEntry::new(Scripted::new("drv", &log)).on_stream("Drive"));
        list.push(TaskEntry::new(Scripted::new("any", &log)).on_stream(StreamId::all()));
        list.add(Scripted::new("untagged", &log));

        list.pre_process(&mut registry).unwrap();

        stream.set_current("Camera");
        list.process().unwrap();
        assert_eq!(
            log.borrow().iter().filter(|e| e.ends_with(":proc")).cloned().collect::<Vec<_>>(),
            vec!["cam:proc", "any:proc", "untagged:proc"]
        );

        log.borrow_mut().clear();
        stream.set_current("Drive");
        list.process().unwrap();
        assert_eq!(
            log.borrow().iter().filter(|e| e.ends_with(":proc")).cloned().collect::<Vec<_>>(),
            vec!["drv:proc", "any:proc", "untagged:proc"]
        );
    }

    #[test]
    fn test_empty_list_stops() {
        let mut registry = Registry::new();
        let mut list = TaskList::new("main");
        list.pre_process(&mut registry).unwrap();
        assert_eq!(list.process().unwrap(), Flow::StopLoop);
    }

    #[test]
    fn test_process_before_pre_process_is_an_error() {
        let mut list = TaskList::new("main");
        assert!(matches!(
            list.process().unwrap_err(),
            Error::NotPreProcessed(_)
        ));
    }

    #[test]
    fn test_withdrawn_task_is_not_processed_or_swept() {
        struct Withdrawing;
        impl Task for Withdrawing {
            fn name(&self) -> &str {
                "withdrawing"
            }
            fn pre_process(&mut self, _registry: &mut Registry) -> Result<Setup> {
                Ok(Setup::Withdraw)
            }
            fn process(&mut self) -> Result<Flow> {
                panic!("withdrawn task must not be processed");
            }
            fn post_process(&mut self) -> Result<()> {
                panic!("withdrawn task must not be post-processed");
            }
        }

        let log = journal();
        let mut registry = Registry::new();

        let mut list = TaskList::new("main");
        list.add(Withdrawing);
        list.add(Scripted::new("a", &log));

        list.pre_process(&mut registry).unwrap();
        assert_eq!(list.process().unwrap(), Flow::Continue);
        list.post_process().unwrap();

        assert!(log.borrow().contains(&"a:proc".to_string()));
        assert!(log.borrow().contains(&"a:post".to_string()));
    }

    #[test]
    fn test_multi_pass() {
        let log = journal();
        let mut registry = Registry::new();

        let mut list = TaskList::new("main");
        list.add(Scripted::new("a", &log));
        list.set_passes(3);

        list.pre_process(&mut registry).unwrap();
        list.process().unwrap();

        let count = log.borrow().iter().filter(|e| *e == "a:proc").count();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_statistics_count_executions() {
        let log = journal();
        let mut registry = Registry::new();

        let mut list = TaskList::new("main");
        list.push(TaskEntry::new(Scripted::new("cam", &log)).on_stream("Camera"));
        list.add(Scripted::new("always", &log));

        let stream = registry.stream_state();
        list.pre_process(&mut registry).unwrap();

        stream.set_current("Drive");
        list.process().unwrap();
        stream.set_current("Camera");
        list.process().unwrap();

        let stats = list.statistics();
        assert_eq!(stats[0].name, "cam");
        assert_eq!(stats[0].executions, 1);
        assert_eq!(stats[1].executions, 2);
    }
}
