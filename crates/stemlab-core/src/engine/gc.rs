//! RT-safe garbage collection for stem buffers
//!
//! Decoded stem sets are large (minutes of four-stem stereo float audio).
//! Freeing one inside the audio callback means system calls (munmap,
//! madvise) that can stall the callback long enough to drop out. Wrapping
//! the buffers in `basedrop::Shared` makes a drop on the audio thread a
//! ~50ns pointer enqueue; the actual deallocation happens on a background
//! collector thread where latency is irrelevant.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Global handle for creating `Shared<T>` allocations
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Initialize the global collector and return a handle
fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    // The Collector is !Sync, so it lives on its own thread
    thread::Builder::new()
        .name("stemlab-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Audio GC thread started");
            loop {
                collector.collect();
                // 100ms is fast enough for memory reclamation
                thread::sleep(Duration::from_millis(100));
            }
        })
        .expect("Failed to spawn audio GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Get a handle for creating `Shared<T>` allocations
///
/// The handle is lightweight and can be cloned freely:
///
/// ```ignore
/// let stems = basedrop::Shared::new(&gc_handle(), stem_set);
/// ```
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
