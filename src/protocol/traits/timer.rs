//! Timing abstractions: an asynchronous delay used by polling loops and
//! bounded lock waits, and a free-running clock used for frame
//! timestamps and GVRET time sync.
use core::future::Future;

/// Asynchronous delay provider.
pub trait GatewayTimer {
    /// Wait for `millis` milliseconds. `0` yields once to the executor.
    fn delay_ms<'a>(&'a mut self, millis: u32) -> impl Future<Output = ()> + 'a;
}

/// Free-running clock.
pub trait Clock {
    /// Microseconds; wraps at `u32::MAX` (about 71.6 minutes).
    fn now_micros(&self) -> u32;

    /// Milliseconds since boot. Sources with a wider counter override this
    /// to avoid the wrap of [`now_micros`](Self::now_micros).
    fn now_millis(&self) -> u64 {
        (self.now_micros() / 1000) as u64
    }
}

/// Timer and clock backed by `embassy-time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyTimer;

impl GatewayTimer for EmbassyTimer {
    async fn delay_ms(&mut self, millis: u32) {
        if millis == 0 {
            embassy_futures::yield_now().await;
        } else {
            embassy_time::Timer::after_millis(millis as u64).await;
        }
    }
}

impl Clock for EmbassyTimer {
    fn now_micros(&self) -> u32 {
        embassy_time::Instant::now().as_micros() as u32
    }

    fn now_millis(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}

impl<C: Clock> Clock for &C {
    fn now_micros(&self) -> u32 {
        (**self).now_micros()
    }

    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::pin::pin;
    use core::task::{Context, Poll};
    use futures_util::task::noop_waker_ref;

    #[test]
    fn test_zero_delay_yields_exactly_once() {
        let mut timer = EmbassyTimer;
        let mut delay = pin!(timer.delay_ms(0));
        let mut cx = Context::from_waker(noop_waker_ref());
        assert_eq!(delay.as_mut().poll(&mut cx), Poll::Pending);
        assert_eq!(delay.as_mut().poll(&mut cx), Poll::Ready(()));
    }

    #[test]
    fn test_default_millis_follow_micros() {
        struct Micros(u32);
        impl Clock for Micros {
            fn now_micros(&self) -> u32 {
                self.0
            }
        }
        assert_eq!(Micros(2_500_999).now_millis(), 2_500);
        assert_eq!((&Micros(999)).now_millis(), 0);
    }
}
