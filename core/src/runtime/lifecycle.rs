use std::sync::atomic::{AtomicUsize, Ordering};

const STOPPED: usize = 0;
const ACTIVE: usize = 1;
const HALTED: usize = 2;
const FAULTY: usize = 3;

pub(crate) fn initial_state() -> AtomicUsize {
    AtomicUsize::new(STOPPED)
}

pub(crate) fn set_active(state: &AtomicUsize) {
    state.store(ACTIVE, Ordering::SeqCst);
}

pub(crate) fn set_halted(state: &AtomicUsize) {
    state.store(HALTED, Ordering::SeqCst);
}

pub(crate) fn set_stopped(state: &AtomicUsize) {
    state.store(STOPPED, Ordering::SeqCst);
}

pub(crate) fn set_faulty(state: &AtomicUsize) {
    state.store(FAULTY, Ordering::SeqCst);
}

pub(crate) fn is_active(state: &AtomicUsize) -> bool {
    state.load(Ordering::SeqCst) == ACTIVE
}

pub(crate) fn is_halted(state: &AtomicUsize) -> bool {
    state.load(Ordering::SeqCst) == HALTED
}

pub(crate) fn is_faulty(state: &AtomicUsize) -> bool {
    state.load(Ordering::SeqCst) == FAULTY
}
