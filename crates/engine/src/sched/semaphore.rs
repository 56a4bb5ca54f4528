use parking_lot::{Condvar, Mutex};

/// Counting semaphore that can be closed to release every waiter.
pub(crate) struct Semaphore {
    state: Mutex<State>,
    cond: Condvar,
}

struct State {
    permits: usize,
    closed: bool,
}

impl Semaphore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State { permits: 0, closed: false }),
            cond: Condvar::new(),
        }
    }

    pub fn release(&self) {
        let mut state = self.state.lock();
        state.permits += 1;
        self.cond.notify_one();
    }

    /// Block until a permit is available. Returns `false` once closed.
    pub fn acquire(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return false;
            }
            if state.permits > 0 {
                state.permits -= 1;
                return true;
            }
            self.cond.wait(&mut state);
        }
    }

    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.permits == 0 {
            return false;
        }
        state.permits -= 1;
        true
    }

    pub fn close(&self) {
        self.state.lock().closed = true;
        self.cond.notify_all();
    }
}
