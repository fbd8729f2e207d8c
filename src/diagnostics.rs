//! # Thread-local Diagnostics
//!
//! Last-error and last-timing slots for callers that only have a flat call
//! interface. Every top-level operation overwrites them on the calling thread, so a
//! read reflects the most recent call made from the same thread and nothing else.
//! Callers with access to the structured results (`PipelineReport`, `StageResult`,
//! `Result` errors) should prefer those.

use std::cell::RefCell;

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
    static LAST_TIMING: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Message of the last error recorded on this thread, empty if the last call succeeded.
pub fn last_error() -> String {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Timing line of the last stage or pipeline run on this thread.
pub fn last_timing() -> String {
    LAST_TIMING.with(|slot| slot.borrow().clone())
}

pub(crate) fn record_error(message: impl Into<String>) {
    let message = message.into();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = message);
}

pub(crate) fn clear_error() {
    LAST_ERROR.with(|slot| slot.borrow_mut().clear());
}

pub(crate) fn record_timing(line: impl Into<String>) {
    let line = line.into();
    LAST_TIMING.with(|slot| *slot.borrow_mut() = line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_writer_wins() {
        record_error("first");
        record_error("second");
        assert_eq!(last_error(), "second");
        clear_error();
        assert!(last_error().is_empty());
    }

    #[test]
    fn test_slots_are_per_thread() {
        record_timing("main: 1.000 ms");
        let other = std::thread::spawn(|| {
            record_timing("worker: 2.000 ms");
            last_timing()
        })
        .join()
        .expect("worker thread panicked");

        assert_eq!(other, "worker: 2.000 ms");
        assert_eq!(last_timing(), "main: 1.000 ms");
    }
}
