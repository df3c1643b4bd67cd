//! Per-thread heap accounting.
//!
//! `TrackingAllocator` wraps the system allocator and keeps a live/peak byte
//! counter for the current thread. The sandbox runs every isolated context on
//! its own worker thread, so the peak growth seen on that thread is the heap
//! delta of the run. The binary (and each test binary) installs it with
//! `#[global_allocator]`; without it every measurement reads zero and the
//! interpreter's own data-size limits remain the only heap ceiling.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct TrackingAllocator;

static ACTIVE: AtomicBool = AtomicBool::new(false);

thread_local! {
    static LIVE: Cell<isize> = const { Cell::new(0) };
    static PEAK: Cell<isize> = const { Cell::new(0) };
}

// Must not allocate: runs inside the allocator.
fn record(delta: isize) {
    let _ = LIVE.try_with(|live| {
        let now = live.get().saturating_add(delta);
        live.set(now);
        let _ = PEAK.try_with(|peak| {
            if now > peak.get() {
                peak.set(now);
            }
        });
    });
}

fn mark_active() {
    if !ACTIVE.load(Ordering::Relaxed) {
        ACTIVE.store(true, Ordering::Relaxed);
    }
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            mark_active();
            record(layout.size() as isize);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            mark_active();
            record(layout.size() as isize);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        record(-(layout.size() as isize));
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            record(new_size as isize - layout.size() as isize);
        }
        new_ptr
    }
}

/// Whether a `TrackingAllocator` is installed and has seen traffic.
pub fn is_active() -> bool {
    ACTIVE.load(Ordering::Relaxed)
}

fn live() -> isize {
    LIVE.try_with(Cell::get).unwrap_or(0)
}

/// Heap growth probe for the current thread. Start it after the context is
/// built so that only the run itself is measured.
#[derive(Debug, Clone, Copy)]
pub struct HeapProbe {
    baseline: isize,
}

impl HeapProbe {
    pub fn start() -> Self {
        let baseline = live();
        let _ = PEAK.try_with(|peak| peak.set(baseline));
        Self { baseline }
    }

    /// Bytes currently held above the baseline.
    pub fn current_growth(&self) -> u64 {
        (live() - self.baseline).max(0) as u64
    }

    /// Largest growth above the baseline since `start`.
    pub fn peak_growth(&self) -> u64 {
        let peak = PEAK.try_with(Cell::get).unwrap_or(self.baseline);
        (peak - self.baseline).max(0) as u64
    }
}
