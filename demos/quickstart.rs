//! Minimal pipeline: a bounded source and a counting task.
//!
//! Run with logging enabled to watch the lifecycle:
//!
//! ```sh
//! RUST_LOG=camshaft=debug cargo run --example quickstart
//! ```

use camshaft::container::{ContainerRef, Param};
use camshaft::prelude::*;
use camshaft::tasks::TickSrc;

/// Increments a shared counter container every tick.
struct CountTicks {
    count: Option<ContainerRef>,
}

impl Task for CountTicks {
    fn name(&self) -> &str {
        "count-ticks"
    }

    fn pre_process(&mut self, registry: &mut Registry) -> Result<Setup> {
        self.count = Some(registry.get("EventCount")?);
        Ok(Setup::Ready)
    }

    fn process(&mut self) -> Result<Flow> {
        let cell = self.count.as_ref().unwrap();
        cell.borrow_mut_as::<Param<u64>>().unwrap().value += 1;
        cell.mark_changed();
        Ok(Flow::Continue)
    }
}

fn main() -> camshaft::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    camshaft::observability::init_metrics();

    let mut registry = Registry::new();
    registry.add(Param::new("EventCount", 0u64))?;

    let mut list = TaskList::new("main");
    list.add(TickSrc::new(1000));
    list.add(CountTicks { count: None });

    let mut event_loop = EventLoop::new(registry, list);
    event_loop.run()?;

    let count = event_loop
        .registry()
        .get("EventCount")?
        .borrow_as::<Param<u64>>()
        .map(|p| p.value)
        .unwrap_or(0);
    println!(
        "counted {count} ticks in {:?}",
        event_loop.stats().elapsed
    );
    Ok(())
}
