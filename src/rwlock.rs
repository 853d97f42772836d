//! Writer-preferring readers-writer lock.
//!
//! `parking_lot::RwLock` does not guarantee writer preference (its fairness
//! is "eventual", not strict). This lock guarantees it explicitly: while a
//! writer is waiting, new readers block, so a steady stream of readers
//! cannot starve the snapshot writer. It's a bespoke synchronization
//! primitive rather than a `parking_lot::RwLock` reuse, built from the same
//! `parking_lot::Mutex` + `parking_lot::Condvar` building blocks this crate
//! already depends on for other locking.
//!
//! Unlike `std`/`parking_lot`'s `RwLock<T>`, this lock does not wrap the
//! protected data — it is a pure synchronization token, acquired and
//! released independently of the data it guards, usable alongside plain
//! maps rather than as a data-owning wrapper. Callers pair `read()`/
//! `write()` with the returned guard's `Drop` to release on every exit
//! path, including a panic while the lock is held.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct State {
    readers: usize,
    writer: bool,
    writers_waiting: usize,
}

struct Inner {
    state: Mutex<State>,
    read_ready: Condvar,
}

/// A writer-preferring readers-writer lock. Cloneable handle over shared
/// state (the lock itself, not the data it protects).
#[derive(Clone)]
pub struct RwLock {
    inner: Arc<Inner>,
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RwLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    readers: 0,
                    writer: false,
                    writers_waiting: 0,
                }),
                read_ready: Condvar::new(),
            }),
        }
    }

    fn acquire_read(&self) {
        let mut state = self.inner.state.lock();
        while state.writer || state.writers_waiting > 0 {
            self.inner.read_ready.wait(&mut state);
        }
        state.readers += 1;
    }

    fn release_read(&self) {
        let mut state = self.inner.state.lock();
        state.readers -= 1;
        if state.readers == 0 {
            self.inner.read_ready.notify_all();
        }
    }

    fn acquire_write(&self) {
        let mut state = self.inner.state.lock();
        state.writers_waiting += 1;
        while state.readers > 0 || state.writer {
            self.inner.read_ready.wait(&mut state);
        }
        state.writers_waiting -= 1;
        state.writer = true;
    }

    fn release_write(&self) {
        let mut state = self.inner.state.lock();
        state.writer = false;
        // Wake everyone: readers and any other waiting writers all race
        // for the lock again under the same discipline.
        self.inner.read_ready.notify_all();
    }

    /// Acquire the read lock, returning a guard that releases it on drop.
    pub fn read(&self) -> ReadGuard<'_> {
        self.acquire_read();
        ReadGuard { lock: self }
    }

    /// Acquire the write lock, returning a guard that releases it on drop.
    pub fn write(&self) -> WriteGuard<'_> {
        self.acquire_write();
        WriteGuard { lock: self }
    }
}

pub struct ReadGuard<'a> {
    lock: &'a RwLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

pub struct WriteGuard<'a> {
    lock: &'a RwLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn multiple_readers_run_concurrently() {
        let lock = RwLock::new();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let concurrent = concurrent.clone();
            let max_concurrent = max_concurrent.clone();
            handles.push(thread::spawn(move || {
                let _guard = lock.read();
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(max_concurrent.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn writer_excludes_readers() {
        let lock = RwLock::new();
        let flag = Arc::new(AtomicUsize::new(0));

        let write_lock = lock.clone();
        let write_flag = flag.clone();
        let writer = thread::spawn(move || {
            let _guard = write_lock.write();
            write_flag.store(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            write_flag.store(0, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(10));

        let read_lock = lock.clone();
        let reader = thread::spawn(move || {
            let _guard = read_lock.read();
            flag.load(Ordering::SeqCst)
        });

        writer.join().unwrap();
        let seen = reader.join().unwrap();
        assert_eq!(seen, 0);
    }

    #[test]
    fn waiting_writer_blocks_new_readers() {
        let lock = RwLock::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Hold a read lock so a writer has to wait.
        let first_reader_guard = lock.read();

        let write_lock = lock.clone();
        let write_order = order.clone();
        let writer = thread::spawn(move || {
            let _guard = write_lock.write();
            write_order.lock().push("write");
        });
        // Give the writer time to register as waiting.
        thread::sleep(Duration::from_millis(30));

        let read_lock = lock.clone();
        let read_order = order.clone();
        let late_reader = thread::spawn(move || {
            let _guard = read_lock.read();
            read_order.lock().push("read");
        });

        thread::sleep(Duration::from_millis(20));
        drop(first_reader_guard);

        writer.join().unwrap();
        late_reader.join().unwrap();

        let seen = order.lock().clone();
        assert_eq!(seen, vec!["write", "read"]);
    }
}
