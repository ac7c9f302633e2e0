//! Shared race clock.
//!
//! The clock separates two things that usually get conflated:
//!
//! - *"the timer is started"*: a wall-clock start instant persisted
//!   through the store, which makes elapsed time mathematically
//!   continuous across process restarts;
//! - *"the clock is being broadcast"*: a transient repeating task
//!   that is cheap to cancel and restart.
//!
//! `stop` only halts the broadcast; elapsed time keeps ticking until
//! `reset` clears the start instant. Completion times are therefore
//! frozen with [`RaceClock::elapsed_at_ms`], never by stopping the
//! clock.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::notify::format_hms;
use crate::store::SharedStore;

use super::runtime::EngineEvent;

/// A repeating timer task feeding events into the serialized engine
/// loop.
///
/// The first tick fires one full period after spawn. Cancellation is
/// idempotent; the task also stops on its own if the receiving side
/// goes away.
#[derive(Debug)]
pub struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Spawns a ticker sending `event` every `period`.
    #[must_use]
    pub fn spawn(
        period: Duration,
        tx: mpsc::UnboundedSender<EngineEvent>,
        event: EngineEvent,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let first = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(first, period);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(event.clone()).is_err() {
                            debug!("ticker receiver gone, stopping");
                            break;
                        }
                    }
                }
            }
        });
        Self { cancel, handle }
    }

    /// Cancels the ticker. Cancelling an already-cancelled ticker is a
    /// no-op.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the ticker task to finish.
    pub async fn join(mut self) {
        let _ = (&mut self.handle).await;
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Wall-clock race timer shared by all teams.
pub struct RaceClock {
    store: SharedStore,
    events: mpsc::UnboundedSender<EngineEvent>,
    update_period: Duration,
    broadcast_enabled: bool,
    ticker: Option<Ticker>,
}

impl RaceClock {
    /// Creates a stopped clock over the given store.
    #[must_use]
    pub fn new(
        store: SharedStore,
        events: mpsc::UnboundedSender<EngineEvent>,
        update_period: Duration,
        broadcast_enabled: bool,
    ) -> Self {
        Self {
            store,
            events,
            update_period,
            broadcast_enabled,
            ticker: None,
        }
    }

    /// Current wall-clock time in UTC epoch milliseconds.
    #[must_use]
    pub fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Starts the timer: persists the current instant (overwriting any
    /// prior one) and starts the live-update broadcast schedule.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the start instant cannot be
    /// persisted; the broadcast is not started in that case.
    pub fn start(&mut self) -> Result<(), StoreError> {
        let now = Self::now_ms();
        self.store.set_start_ms(Some(now))?;
        info!(start_ms = now, "race clock started");
        self.start_update_ticker();
        Ok(())
    }

    /// Halts only the live-update broadcast. The start instant, and
    /// therefore elapsed time, is untouched.
    pub fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
            info!("race clock broadcast stopped");
        }
    }

    /// Stops the broadcast and clears the persisted start instant;
    /// elapsed time becomes 0.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the cleared instant cannot be
    /// persisted.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.stop();
        self.store.set_start_ms(None)?;
        info!("race clock reset");
        Ok(())
    }

    /// Elapsed milliseconds since the start instant, or 0 if the timer
    /// was never started.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_at_ms(Self::now_ms())
    }

    /// Elapsed milliseconds at the given instant, used to freeze a
    /// completion time at the exact moment of completion rather than
    /// re-sampling "now" later.
    #[must_use]
    pub fn elapsed_at_ms(&self, at_ms: i64) -> u64 {
        self.store
            .start_ms()
            .map_or(0, |start| u64::try_from(at_ms.saturating_sub(start)).unwrap_or(0))
    }

    /// Returns whether a start instant is recorded.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.store.start_ms().is_some()
    }

    /// Resumes the live-update broadcast after a process restart if a
    /// start instant is persisted. The instant itself is not touched,
    /// so the timer appears continuous.
    pub fn resume_if_running(&mut self) {
        if let Some(start) = self.store.start_ms() {
            info!(
                start_ms = start,
                elapsed = %format_hms(self.elapsed_ms()),
                "resuming race clock"
            );
            self.start_update_ticker();
        }
    }

    fn start_update_ticker(&mut self) {
        if let Some(previous) = self.ticker.take() {
            previous.cancel();
        }
        if !self.broadcast_enabled {
            return;
        }
        self.ticker = Some(Ticker::spawn(
            self.update_period,
            self.events.clone(),
            EngineEvent::ClockTick,
        ));
    }
}

impl Drop for RaceClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::{MemoryStore, StateStore};

    fn clock_over(
        store: Arc<MemoryStore>,
        broadcast: bool,
    ) -> (RaceClock, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = RaceClock::new(store, tx, Duration::from_secs(1), broadcast);
        (clock, rx)
    }

    #[tokio::test]
    async fn test_start_persists_instant() {
        let store = Arc::new(MemoryStore::new());
        let (mut clock, _rx) = clock_over(Arc::clone(&store), false);

        assert!(!clock.is_started());
        assert_eq!(clock.elapsed_ms(), 0);

        clock.start().unwrap();
        assert!(clock.is_started());
        assert!(store.start_ms().is_some());
    }

    #[tokio::test]
    async fn test_elapsed_at_freezes_completion_time() {
        let store = Arc::new(MemoryStore::new());
        store.set_start_ms(Some(10_000)).unwrap();
        let (clock, _rx) = clock_over(store, false);

        assert_eq!(clock.elapsed_at_ms(15_250), 5_250);
        // An instant before the start clamps to zero.
        assert_eq!(clock.elapsed_at_ms(9_000), 0);
    }

    #[tokio::test]
    async fn test_stop_does_not_freeze_elapsed() {
        let store = Arc::new(MemoryStore::new());
        let start = RaceClock::now_ms() - 5_000;
        store.set_start_ms(Some(start)).unwrap();
        let (mut clock, _rx) = clock_over(store, false);

        clock.stop();
        let elapsed = clock.elapsed_ms();
        assert!(elapsed >= 5_000, "stop must not freeze elapsed, got {elapsed}");
    }

    #[tokio::test]
    async fn test_reset_clears_instant() {
        let store = Arc::new(MemoryStore::new());
        let (mut clock, _rx) = clock_over(Arc::clone(&store), false);

        clock.start().unwrap();
        clock.reset().unwrap();

        assert!(!clock.is_started());
        assert_eq!(clock.elapsed_ms(), 0);
        assert!(store.start_ms().is_none());
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_broadcast_off() {
        let store = Arc::new(MemoryStore::new());
        let (mut clock, mut rx) = clock_over(Arc::clone(&store), true);

        store.set_fail_writes(true);
        assert!(clock.start().is_err());

        // No ticker was spawned for a start that never became durable.
        assert!(rx.try_recv().is_err());
        assert!(!clock.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_ticks_arrive() {
        let store = Arc::new(MemoryStore::new());
        let (mut clock, mut rx) = clock_over(store, true);

        clock.start().unwrap();
        tokio::time::advance(Duration::from_millis(3_100)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let mut ticks = 0;
        while rx.try_recv().is_ok() {
            ticks += 1;
        }
        assert!(ticks >= 3, "expected at least 3 ticks, got {ticks}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_before_first_period() {
        let store = Arc::new(MemoryStore::new());
        let (mut clock, mut rx) = clock_over(store, true);

        clock.start().unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(rx.try_recv().is_err(), "first tick must wait a full period");
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let ticker = Ticker::spawn(Duration::from_secs(60), tx, EngineEvent::ClockTick);

        ticker.cancel();
        ticker.cancel();
        ticker.join().await;
    }

    #[tokio::test]
    async fn test_resume_without_instant_spawns_nothing() {
        let store = Arc::new(MemoryStore::new());
        let (mut clock, mut rx) = clock_over(store, true);

        clock.resume_if_running();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
