use core::{
    cell::UnsafeCell,
    sync::atomic::AtomicBool,
    sync::atomic::Ordering::*,
    future::poll_fn,
    task::Poll,
    ops::{Deref, DerefMut},
    };

/**
    spin lock usable from async tasks and plain threads

    critical sections guarded by it are expected to be short and never to run user code
*/
pub struct BusyMutex<T> {
    value: UnsafeCell<T>,
    locked: AtomicBool,
}
// SAFETY: access to the value is serialized by the `locked` flag
unsafe impl<T: Send> Sync for BusyMutex<T> {}

impl<T> BusyMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            locked: AtomicBool::new(false),
        }
    }
    pub fn try_lock(&self) -> Option<BusyMutexGuard<'_, T>> {
        BusyMutexGuard::try_new(self)
    }
    /// busy polling future until lock is acquired
    pub async fn lock(&self) -> BusyMutexGuard<'_, T> {
        poll_fn(|context| match BusyMutexGuard::try_new(self) {
            Some(guard) => Poll::Ready(guard),
            None => {
                // poll again as soon as the runtime allows
                context.waker().wake_by_ref();
                Poll::Pending
            },
            }).await
    }
    /// busy wait until lock is acquired
    #[cfg(feature = "std")]
    pub fn blocking_lock(&self) -> BusyMutexGuard<'_, T> {
        loop {
            if let Some(guard) = BusyMutexGuard::try_new(self)
                {break guard}
            // nothing else to do, leave resources to the kernel
            std::thread::yield_now();
        }
    }
}
impl<T: Default> BusyMutex<T> {
    /// take the current value out, leaving the default in place, in one critical section
    #[cfg(feature = "std")]
    pub fn drain(&self) -> T {
        core::mem::take(&mut *self.blocking_lock())
    }
}
impl<T> From<T> for BusyMutex<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

pub struct BusyMutexGuard<'m, T> {
    mutex: &'m BusyMutex<T>,
}
impl<'m, T> BusyMutexGuard<'m, T> {
    fn try_new(mutex: &'m BusyMutex<T>) -> Option<Self> {
        if mutex.locked.swap(true, Acquire)
            {None}
        else
            {Some(Self {mutex})}
    }
}
impl<T> Deref for BusyMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe {& *self.mutex.value.get()}
    }
}
impl<T> DerefMut for BusyMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe {&mut *self.mutex.value.get()}
    }
}
impl<T> Drop for BusyMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Release);
    }
}


#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, vec::Vec};

    #[test]
    fn exclusive() {
        let mutex = BusyMutex::new(0u32);
        let guard = mutex.try_lock().unwrap();
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn concurrent_increments() {
        let counter = Arc::new(BusyMutex::new(0u32));
        let workers: Vec<_> = (0 .. 4).map(|_| {
            let counter = counter.clone();
            thread::spawn(move || for _ in 0 .. 1000 {
                *counter.blocking_lock() += 1;
            })
        }).collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(*counter.blocking_lock(), 4000);
    }

    #[test]
    fn drain_leaves_default() {
        let queue = BusyMutex::new(Vec::from([1, 2, 3]));
        assert_eq!(queue.drain(), [1, 2, 3]);
        assert!(queue.drain().is_empty());
    }
}
