#![forbid(unsafe_code)]

//! Bounded readiness watches for newly created surfaces.
//!
//! Each watch belongs to one container and lives until the surface becomes
//! ready, the timeout elapses, or the owning card is evicted (cancellation).
//! Polled watches check at a fixed interval; signalled watches only enforce
//! the timeout, since the host resolves them through an event.
//!
//! # Invariants
//!
//! 1. A watch resolves at most once; it is removed from the set when it does.
//! 2. A cancelled watch never resolves; it is pruned on the next poll.
//! 3. A watch never outlives its deadline by more than one poll. The
//!    deadline is fixed when the watch starts; later timeout changes only
//!    affect watches started after them.
//! 4. Timestamps saturate, so a clock near `Duration::MAX` cannot overflow.

use web_time::Duration;

use crate::cancellation::CancellationToken;
use crate::clock::Timestamp;
use crate::surface::ContainerId;

/// How a watch resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The surface reported a viewport.
    Ready,
    /// The timeout elapsed first; treated as ready anyway.
    TimedOut,
}

#[derive(Debug)]
struct ReadinessWatch {
    container: ContainerId,
    deadline: Timestamp,
    next_poll: Timestamp,
    signalled: bool,
    token: CancellationToken,
}

/// All in-flight watches of one pool.
#[derive(Debug)]
pub(crate) struct ReadinessWatches {
    watches: Vec<ReadinessWatch>,
    poll_interval: Duration,
    timeout: Duration,
}

impl ReadinessWatches {
    pub(crate) fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            watches: Vec::new(),
            poll_interval,
            timeout,
        }
    }

    /// Timeout for watches started from now on.
    pub(crate) fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub(crate) fn start(
        &mut self,
        container: ContainerId,
        now: Timestamp,
        signalled: bool,
        token: CancellationToken,
    ) {
        self.watches.push(ReadinessWatch {
            container,
            deadline: now.saturating_add(self.timeout),
            next_poll: now,
            signalled,
            token,
        });
    }

    /// Stop watching `container` because it resolved through another path.
    pub(crate) fn resolve(&mut self, container: ContainerId) -> bool {
        let before = self.watches.len();
        self.watches.retain(|w| w.container != container);
        before != self.watches.len()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.watches.len()
    }

    #[inline]
    pub(crate) fn is_watching(&self, container: ContainerId) -> bool {
        self.watches.iter().any(|w| w.container == container)
    }

    /// Run due polls. `is_ready` inspects the surface behind a container.
    ///
    /// Returns resolved containers in start order.
    pub(crate) fn poll(
        &mut self,
        now: Timestamp,
        mut is_ready: impl FnMut(ContainerId) -> bool,
    ) -> Vec<(ContainerId, Readiness)> {
        let mut resolved = Vec::new();
        let interval = self.poll_interval;
        self.watches.retain_mut(|watch| {
            if watch.token.is_cancelled() {
                tracing::debug!(container = %watch.container, "readiness watch cancelled");
                return false;
            }
            if !watch.signalled && now >= watch.next_poll {
                if is_ready(watch.container) {
                    resolved.push((watch.container, Readiness::Ready));
                    return false;
                }
                watch.next_poll = now.saturating_add(interval);
            }
            if now >= watch.deadline {
                resolved.push((watch.container, Readiness::TimedOut));
                return false;
            }
            true
        });
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationSource;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn watches() -> ReadinessWatches {
        ReadinessWatches::new(ms(100), ms(5_000))
    }

    #[test]
    fn polled_watch_resolves_when_surface_ready() {
        let mut w = watches();
        let source = CancellationSource::new();
        w.start(ContainerId::new(1), ms(0), false, source.token());

        assert!(w.poll(ms(0), |_| false).is_empty());
        assert!(w.poll(ms(50), |_| panic!("not due yet")).is_empty());
        assert_eq!(
            w.poll(ms(100), |_| true),
            vec![(ContainerId::new(1), Readiness::Ready)]
        );
        assert_eq!(w.len(), 0);
    }

    #[test]
    fn watch_times_out() {
        let mut w = watches();
        let source = CancellationSource::new();
        w.start(ContainerId::new(1), ms(0), false, source.token());
        assert!(w.poll(ms(4_999), |_| false).is_empty());
        assert_eq!(
            w.poll(ms(5_000), |_| false),
            vec![(ContainerId::new(1), Readiness::TimedOut)]
        );
    }

    #[test]
    fn timeout_change_applies_to_new_watches_only() {
        let mut w = watches();
        let source = CancellationSource::new();
        w.start(ContainerId::new(1), ms(0), false, source.token());
        w.set_timeout(ms(1_000));
        w.start(ContainerId::new(2), ms(0), false, source.token());

        assert_eq!(
            w.poll(ms(1_000), |_| false),
            vec![(ContainerId::new(2), Readiness::TimedOut)]
        );
        assert!(w.poll(ms(4_999), |_| false).is_empty());
        assert_eq!(
            w.poll(ms(5_000), |_| false),
            vec![(ContainerId::new(1), Readiness::TimedOut)]
        );
    }

    #[test]
    fn clock_near_max_saturates() {
        let mut w = watches();
        let source = CancellationSource::new();
        w.start(ContainerId::new(1), ms(0), false, source.token());
        let late = Duration::MAX - ms(10);
        w.start(ContainerId::new(2), late, false, source.token());

        assert_eq!(
            w.poll(late, |c| c == ContainerId::new(2)),
            vec![
                (ContainerId::new(1), Readiness::TimedOut),
                (ContainerId::new(2), Readiness::Ready),
            ]
        );
        w.start(ContainerId::new(3), Duration::MAX, false, source.token());
        assert_eq!(w.poll(Duration::MAX, |_| false).len(), 1);
        assert_eq!(w.len(), 0);
    }

    #[test]
    fn signalled_watch_is_never_polled() {
        let mut w = watches();
        let source = CancellationSource::new();
        w.start(ContainerId::new(3), ms(0), true, source.token());
        assert!(w.poll(ms(1_000), |_| panic!("signalled watches are not polled")).is_empty());
        assert!(w.resolve(ContainerId::new(3)));
        assert!(!w.is_watching(ContainerId::new(3)));
    }

    #[test]
    fn cancelled_watch_is_pruned_without_resolving() {
        let mut w = watches();
        let source = CancellationSource::new();
        w.start(ContainerId::new(2), ms(0), false, source.token());
        source.cancel();
        assert!(w.poll(ms(10_000), |_| true).is_empty());
        assert_eq!(w.len(), 0);
    }
}
