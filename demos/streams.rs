//! Stream dispatch, filter gating and context transitions.
//!
//! Two subsystem streams ("Camera" and "Drive") alternate tick by tick; a
//! calibration chain only runs on camera ticks, a size cut gates the
//! write-out, and every 25 ticks the source announces a new run.
//!
//! ```sh
//! RUST_LOG=camshaft=info cargo run --example streams
//! ```

use camshaft::container::{ContainerRef, Param};
use camshaft::prelude::*;
use camshaft::tasks::{NullTask, TickSrc};
use std::rc::Rc;

/// Fake image parameterization: publishes a "size" per camera tick.
struct Parameterize {
    size: Option<ContainerRef>,
    next: f64,
}

impl Task for Parameterize {
    fn name(&self) -> &str {
        "parameterize"
    }

    fn pre_process(&mut self, registry: &mut Registry) -> Result<Setup> {
        self.size = Some(registry.get("Size")?);
        Ok(Setup::Ready)
    }

    fn re_init(&mut self, _registry: &mut Registry) -> Result<()> {
        // A new run resets the fake signal ramp.
        self.next = 0.0;
        Ok(())
    }

    fn process(&mut self) -> Result<Flow> {
        self.next += 7.0;
        let cell = self.size.as_ref().unwrap();
        cell.borrow_mut_as::<Param<f64>>().unwrap().value = self.next;
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
    let size = registry.add(Param::new("Size", 0.0f64))?;

    // The calibration chain only sees camera ticks.
    let mut camera_chain = TaskList::new("camera-chain");
    camera_chain.add(Parameterize {
        size: None,
        next: 0.0,
    });
    camera_chain.add(FnFilter::new("SizeCut", {
        let size = Rc::clone(&size);
        move || size.borrow_as::<Param<f64>>().map(|p| p.value > 20.0).unwrap_or(false)
    }));
    camera_chain.add(FilterGate::new(FilterCondition::when("SizeCut")));
    camera_chain.add(NullTask::new().with_name("write-out"));

    let mut root = TaskList::new("root");
    root.add(
        TickSrc::new(100)
            .with_stream_cycle(["Camera", "Drive"])
            .with_context_every(25),
    );
    root.push(TaskEntry::new(camera_chain).on_stream("Camera"));
    root.push(TaskEntry::new(NullTask::new().with_name("track-drive")).on_stream("Drive"));

    let mut event_loop = EventLoop::new(registry, root);
    event_loop.run()?;

    println!(
        "{} ticks, {} run transitions",
        event_loop.stats().ticks,
        event_loop.stats().re_inits
    );
    for stats in event_loop.root().statistics() {
        println!(
            "  {:>12}: {:>4} call(s) in {:?}",
            stats.name, stats.executions, stats.elapsed
        );
    }
    Ok(())
}
