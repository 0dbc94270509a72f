//! Mark-sweep collection over the heap's object arena.
//!
//! The collector has 2 stages:
//!
//! - Marking. Every object reachable from the root set (the value stack,
//!   global slots, call frames, temporary roots and cached builtins) is
//!   marked, using a gray worklist instead of recursion.
//! - Sweeping. Unmarked objects are dropped; survivors get their mark reset.

pub mod alloc;
#[cfg(test)]
mod test;

use std::time::{Duration, Instant};

use tracing::debug;

use crate::value::{Object, ObjectRef, RefTarget};
use alloc::Heap;

/// Something that can report the objects it references.
pub trait Trace {
    fn trace(&self, tracer: &mut dyn GcTracer);
}

pub trait GcTracer {
    fn trace(&mut self, obj: ObjectRef);
}

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,
    /// Total objects freed
    pub objects_freed: usize,
    /// Objects marked in last collection
    pub last_marked_count: usize,
    /// Objects freed in last collection
    pub last_freed_count: usize,
    /// Live objects after last collection
    pub live_objects: usize,
    /// Total pause time across all collections
    pub total_pause_time: Duration,
    /// Last collection duration
    pub last_pause_time: Duration,
}

impl GcStats {
    fn update(&mut self, pause_time: Duration, marked: usize, freed: usize, live: usize) {
        self.collections += 1;
        self.objects_freed += freed;
        self.total_pause_time += pause_time;
        self.last_pause_time = pause_time;
        self.last_marked_count = marked;
        self.last_freed_count = freed;
        self.live_objects = live;
    }
}

/// Collects newly discovered objects into the gray worklist.
#[derive(Default)]
struct GcMarkAndSweepTracer {
    gray: Vec<ObjectRef>,
}

impl GcTracer for GcMarkAndSweepTracer {
    fn trace(&mut self, obj: ObjectRef) {
        self.gray.push(obj);
    }
}

impl Heap {
    /// Run a full collection. Returns the number of objects freed.
    pub fn collect(&mut self) -> usize {
        let start = Instant::now();

        let marked = self.mark();
        let freed = self.sweep();

        let live = self.objects.len();
        self.stats.update(start.elapsed(), marked, freed, live);
        self.max_count = self.initial_threshold.max(live * 2);

        debug!(
            marked,
            freed,
            live,
            next_threshold = self.max_count,
            "garbage collection finished"
        );
        freed
    }

    /// Mark phase: mark all reachable objects.
    /// Returns number of objects marked.
    fn mark(&mut self) -> usize {
        let mut tracer = GcMarkAndSweepTracer::default();

        for v in &self.stack {
            v.trace(&mut tracer);
        }
        for v in &self.globals {
            v.trace(&mut tracer);
        }
        for frame in &self.frames {
            tracer.trace(frame.function);
        }
        tracer.gray.extend(self.temp_roots.iter().copied());
        tracer.gray.extend(self.builtin_cache.iter().flatten().copied());

        let mut marked = 0;
        while let Some(obj) = tracer.gray.pop() {
            // A stale handle has nothing left to mark.
            let entry = match self.objects.get_mut(obj) {
                Some(entry) => entry,
                None => continue,
            };
            if entry.marked {
                continue;
            }
            entry.marked = true;
            marked += 1;

            match &entry.object {
                Object::Ref(RefTarget::Global(slot)) => {
                    if let Some(v) = self.globals.get(*slot) {
                        v.trace(&mut tracer)
                    }
                }
                Object::Ref(RefTarget::Stack(slot)) => {
                    if let Some(v) = self.stack.get(*slot) {
                        v.trace(&mut tracer)
                    }
                }
                object => object.trace(&mut tracer),
            }
        }
        marked
    }

    /// Sweep phase: drop unmarked objects and reset marks on survivors.
    /// Returns number of objects freed.
    fn sweep(&mut self) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, entry| std::mem::take(&mut entry.marked));
        before - self.objects.len()
    }

    /// Drop the root set and reclaim every object.
    pub fn shutdown(&mut self) -> usize {
        self.stack.clear();
        self.frames.clear();
        self.globals.iter_mut().for_each(|g| *g = Default::default());
        self.temp_roots.clear();
        self.builtin_cache.clear();

        let freed = self.sweep();
        debug!(freed, "heap shut down");
        freed
    }
}
