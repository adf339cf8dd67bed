//! Double-buffered snapshot: a writer publishes a new generation, readers copy
//! out the latest (and the one before it, for delta computations).
//!
//! Publication and reads take an async mutex. Periodic writers use a bounded
//! wait and skip the cycle on timeout; readers on hot paths use the `try_`
//! variants and never wait at all.
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use futures_util::future::{select, Either};
use futures_util::pin_mut;

use crate::protocol::traits::timer::GatewayTimer;

/// The two most recent published values.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Generations<T> {
    pub previous: Option<T>,
    pub current: Option<T>,
    /// Bumped on every publication; wraps.
    pub sequence: u32,
}

impl<T> Generations<T> {
    const fn empty() -> Self {
        Self {
            previous: None,
            current: None,
            sequence: 0,
        }
    }

    fn rotate(&mut self, value: T) {
        self.previous = self.current.take();
        self.current = Some(value);
        self.sequence = self.sequence.wrapping_add(1);
    }
}

pub struct Snapshot<M: RawMutex, T> {
    inner: Mutex<M, Generations<T>>,
}

impl<M: RawMutex, T: Clone> Default for Snapshot<M, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, T: Clone> Snapshot<M, T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Generations::empty()),
        }
    }

    /// Publish without waiting. Returns `false` when a reader holds the lock;
    /// the value is discarded in that case.
    pub fn try_publish(&self, value: T) -> bool {
        match self.inner.try_lock() {
            Ok(mut generations) => {
                generations.rotate(value);
                true
            }
            Err(_) => false,
        }
    }

    /// Publish, waiting at most `timeout_ms` for the lock.
    pub async fn publish_within<Tm: GatewayTimer>(
        &self,
        value: T,
        timer: &mut Tm,
        timeout_ms: u32,
    ) -> bool {
        let lock = self.inner.lock();
        let deadline = timer.delay_ms(timeout_ms);
        pin_mut!(lock, deadline);

        match select(lock, deadline).await {
            Either::Left((mut generations, _)) => {
                generations.rotate(value);
                true
            }
            Either::Right(_) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("snapshot publish skipped: lock busy for {} ms", timeout_ms);
                false
            }
        }
    }

    /// Copy of both generations, or `None` if the writer holds the lock.
    pub fn try_read(&self) -> Option<Generations<T>> {
        self.inner.try_lock().ok().map(|g| g.clone())
    }

    /// Latest published value, or `None` if nothing was published yet or the
    /// writer holds the lock.
    pub fn try_latest(&self) -> Option<T> {
        self.inner.try_lock().ok()?.current.clone()
    }

    /// Copy of both generations, waiting at most `timeout_ms` for the lock.
    pub async fn read_within<Tm: GatewayTimer>(
        &self,
        timer: &mut Tm,
        timeout_ms: u32,
    ) -> Option<Generations<T>> {
        let lock = self.inner.lock();
        let deadline = timer.delay_ms(timeout_ms);
        pin_mut!(lock, deadline);

        match select(lock, deadline).await {
            Either::Left((generations, _)) => Some(generations.clone()),
            Either::Right(_) => None,
        }
    }

    /// Forget every generation. Returns `false` if the lock was busy.
    pub fn try_clear(&self) -> bool {
        match self.inner.try_lock() {
            Ok(mut generations) => {
                *generations = Generations::empty();
                true
            }
            Err(_) => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn hold(&self) -> Option<embassy_sync::mutex::MutexGuard<'_, M, Generations<T>>> {
        self.inner.try_lock().ok()
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
