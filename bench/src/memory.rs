//! Heap tracking for the benchmarks, built on dhat.
//!
//! The storage questions worth answering are per-entity: what one spawn
//! costs in bytes and allocator calls, and whether steady-state iteration
//! allocates at all. dhat hooks the global allocator, which is expensive,
//! so everything here compiles to a no-op unless the `memory_profiling`
//! feature is enabled:
//!
//! ```bash
//! cargo bench -p quartz_bench --features memory_profiling
//! ```
//!
//! A profiled run also writes `dhat-heap.json`; load it at
//! <https://nnethercote.github.io/dh_view/dh_view.html> for the full
//! allocation tree.

use std::fmt;

/// Totals collected over one [`HeapSpan`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapReport {
    /// Bytes handed out by the allocator during the span.
    pub allocated_bytes: u64,
    /// Individual allocations during the span.
    pub blocks: u64,
    /// High-water mark of live heap bytes.
    pub peak_bytes: u64,
}

impl HeapReport {
    /// Amortize the totals over `count` entities, as (bytes, blocks).
    pub fn per_entity(&self, count: usize) -> (f64, f64) {
        if count == 0 {
            return (0.0, 0.0);
        }
        (
            self.allocated_bytes as f64 / count as f64,
            self.blocks as f64 / count as f64,
        )
    }
}

impl fmt::Display for HeapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} B in {} blocks (peak {} B)",
            self.allocated_bytes, self.blocks, self.peak_bytes
        )
    }
}

/// One heap measurement window.
///
/// dhat installs a process-global allocator hook, so at most one span may
/// be open at a time.
pub struct HeapSpan {
    #[cfg(feature = "memory_profiling")]
    _profiler: dhat::Profiler,
}

#[cfg(feature = "memory_profiling")]
impl HeapSpan {
    /// Open the measurement window.
    pub fn open() -> Self {
        Self {
            _profiler: dhat::Profiler::new_heap(),
        }
    }

    /// Close the window and collect totals. Also flushes the detailed
    /// profile to `dhat-heap.json`.
    pub fn close(self) -> HeapReport {
        let stats = dhat::HeapStats::get();
        HeapReport {
            allocated_bytes: stats.total_bytes as u64,
            blocks: stats.total_blocks as u64,
            peak_bytes: stats.max_bytes as u64,
        }
    }
}

#[cfg(not(feature = "memory_profiling"))]
impl HeapSpan {
    /// Open the measurement window. No-op without `memory_profiling`.
    pub fn open() -> Self {
        Self {}
    }

    /// Close the window. Reports zeros without `memory_profiling`.
    pub fn close(self) -> HeapReport {
        HeapReport::default()
    }
}

/// Run `f` inside a heap span and return its result with the totals.
pub fn profiled<F, R>(f: F) -> (R, HeapReport)
where
    F: FnOnce() -> R,
{
    let span = HeapSpan::open();
    let result = f();
    (result, span.close())
}
