//! Render-side contracts: the image sink the viewer implements and a
//! rate limit for interactive repaints.
//!
//! The chain owns buffer contents; whoever draws them implements
//! [`ImageSink`]. Interactive edits such as mask painting can fire many
//! times per second, so [`RepaintThrottle`] lets a caller drop repaint
//! requests that arrive within a minimum interval of the last accepted
//! one. Recompute correctness never depends on the throttle.
//!
//! Time is read through [`Clock`] so tests can drive it by hand;
//! [`WebClock`] uses `web-time`, which maps to `performance.now()` on
//! WASM and `std::time::Instant` elsewhere.

use std::time::Duration;

use crate::types::ImageBuffer;

/// Receives a freshly recomputed buffer with its display levels.
pub trait ImageSink {
    /// Show `image`, mapping `levels.0` to black and `levels.1` to white.
    fn show(&mut self, image: &ImageBuffer, levels: (u8, u8));
}

impl<F: FnMut(&ImageBuffer, (u8, u8))> ImageSink for F {
    fn show(&mut self, image: &ImageBuffer, levels: (u8, u8)) {
        self(image, levels);
    }
}

/// Monotonic time source.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// Current instant.
    fn now(&self) -> Self::Instant;

    /// Time since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> Self::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Accepts at most one repaint per interval.
pub struct RepaintThrottle<C: Clock = WebClock> {
    clock: C,
    interval: Duration,
    last: Option<C::Instant>,
}

impl RepaintThrottle<WebClock> {
    /// Minimum spacing between accepted repaints.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(300);
}

impl Default for RepaintThrottle<WebClock> {
    fn default() -> Self {
        Self::new(WebClock, Self::DEFAULT_INTERVAL)
    }
}

impl<C: Clock> RepaintThrottle<C> {
    /// Throttle with an explicit clock and interval.
    pub const fn new(clock: C, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            last: None,
        }
    }

    /// Configured interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` and starts a new interval if the previous accepted
    /// repaint is at least one interval old (or there was none).
    pub fn ready(&mut self) -> bool {
        let due = self
            .last
            .as_ref()
            .is_none_or(|last| self.clock.elapsed(last) >= self.interval);
        if due {
            self.last = Some(self.clock.now());
        }
        due
    }

    /// Forget the last accepted repaint so the next request goes through.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::types::GrayImage;

    /// Clock whose time only moves when the test says so.
    #[derive(Clone, Default)]
    struct ManualClock(Rc<Cell<Duration>>);

    impl ManualClock {
        fn advance(&self, by: Duration) {
            self.0.set(self.0.get() + by);
        }
    }

    impl Clock for ManualClock {
        type Instant = Duration;

        fn now(&self) -> Duration {
            self.0.get()
        }

        fn elapsed(&self, since: &Duration) -> Duration {
            self.0.get().saturating_sub(*since)
        }
    }

    #[test]
    fn first_request_passes_then_throttles() {
        let clock = ManualClock::default();
        let mut throttle = RepaintThrottle::new(clock.clone(), Duration::from_millis(300));
        assert!(throttle.ready());
        assert!(!throttle.ready());
        clock.advance(Duration::from_millis(299));
        assert!(!throttle.ready());
        clock.advance(Duration::from_millis(1));
        assert!(throttle.ready());
    }

    #[test]
    fn reset_reopens_the_gate() {
        let clock = ManualClock::default();
        let mut throttle = RepaintThrottle::new(clock, Duration::from_secs(10));
        assert!(throttle.ready());
        throttle.reset();
        assert!(throttle.ready());
    }

    #[test]
    fn default_interval_is_300ms() {
        let throttle = RepaintThrottle::<WebClock>::default();
        assert_eq!(throttle.interval(), Duration::from_millis(300));
    }

    #[test]
    fn closures_are_sinks() {
        let mut seen = Vec::new();
        let mut sink = |img: &ImageBuffer, levels: (u8, u8)| seen.push((img.dimensions(), levels));
        let img = ImageBuffer::Gray(GrayImage::new(3, 2));
        sink.show(&img, (0, 255));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, (0, 255));
    }
}
