//! Lazily computed, invalidatable values
//!
//! Two population disciplines are offered. [`CacheCell::get_or_try_init`]
//! computes while holding the cell lock, so concurrent callers wait and
//! see a single computation. [`CacheCell::get_or_try_publish`] computes
//! without the lock and publishes the result only if the cell is still
//! empty; the first published value wins and every caller returns it.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub struct CacheCell<T> {
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> Default for CacheCell<T> {
    fn default() -> Self {
        CacheCell {
            slot: Mutex::new(None),
        }
    }
}

impl<T> CacheCell<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.lock().clone()
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn set(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        *self.slot.lock() = Some(value.clone());
        value
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }

    pub fn get_or_try_init<E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<Arc<T>, E> {
        let mut slot = self.slot.lock();
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }
        let value = Arc::new(f()?);
        *slot = Some(value.clone());
        Ok(value)
    }

    pub fn get_or_try_publish<E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<Arc<T>, E> {
        if let Some(value) = self.get() {
            return Ok(value);
        }
        let computed = Arc::new(f()?);
        let mut slot = self.slot.lock();
        match slot.as_ref() {
            Some(winner) => Ok(winner.clone()),
            None => {
                *slot = Some(computed.clone());
                Ok(computed)
            }
        }
    }
}

impl<T: Clone> Clone for CacheCell<T> {
    fn clone(&self) -> Self {
        CacheCell {
            slot: Mutex::new(self.get()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CacheCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("CacheCell").field(&value).finish(),
            None => f.write_str("CacheCell(<empty>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_init_runs_once() {
        let cell = CacheCell::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = cell
                .get_or_try_init(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(7)
                })
                .unwrap();
            assert_eq!(*v, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_errors_leave_cell_empty() {
        let cell: CacheCell<u32> = CacheCell::new();
        assert_eq!(cell.get_or_try_init(|| Err("no")).unwrap_err(), "no");
        assert!(!cell.is_set());
        assert_eq!(cell.get_or_try_publish(|| Err("no")).unwrap_err(), "no");
        assert!(!cell.is_set());
    }

    #[test]
    fn test_clear_forces_recompute() {
        let cell = CacheCell::new();
        cell.set(1u32);
        cell.clear();
        assert_eq!(*cell.get_or_try_publish(|| Ok::<_, ()>(2)).unwrap(), 2);
    }

    #[test]
    fn test_first_publisher_wins() {
        let cell = Arc::new(CacheCell::new());
        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let cell = cell.clone();
                thread::spawn(move || *cell.get_or_try_publish(|| Ok::<_, ()>(i)).unwrap())
            })
            .collect();
        let seen: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let published = *cell.get().unwrap();
        assert!(seen.iter().all(|v| *v == published));
    }
}
