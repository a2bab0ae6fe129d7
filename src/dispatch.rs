//! Trigger dispatch with an at-most-one-recording gate
//!
//! One atomic test-and-set guards the whole recording pipeline: a trigger
//! either claims the gate and becomes a session, or is rejected with
//! [`Error::Busy`]. The dispatcher polls its event sources on a fixed tick;
//! triggers offered while a session is running are dropped, never queued,
//! so a still-held button re-offers on the next idle tick instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::sources::{EventSource, Trigger};
use crate::{Error, Result};

/// Drain poll cadence while waiting for a session to finish
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// The recording pipeline behind the gate
///
/// The daemon's production runner records, encodes, and delivers; tests
/// substitute a counter.
#[async_trait]
pub trait SessionRunner: Send + Sync {
    /// Run one full recording session for `trigger`.
    async fn run(&self, trigger: Trigger) -> Result<()>;
}

/// Shared entry point into the recording pipeline
///
/// Cloned into every place that can start a recording (the pin dispatcher
/// and the remote `record` command) so they all contend on the same gate.
#[derive(Clone)]
pub struct DispatchHandle {
    busy: Arc<AtomicBool>,
    accepting: Arc<AtomicBool>,
    runner: Arc<dyn SessionRunner>,
}

impl DispatchHandle {
    /// Create a handle around `runner` with the gate open.
    #[must_use]
    pub fn new(runner: Arc<dyn SessionRunner>) -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            accepting: Arc::new(AtomicBool::new(true)),
            runner,
        }
    }

    /// Whether a session currently holds the gate
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Try to start a session for `trigger`.
    ///
    /// The busy check and the claim are a single compare-exchange, so two
    /// concurrent triggers can never both start. The session runs as a
    /// spawned task; its failure is logged, not propagated, because the
    /// trigger origin (a button) has no one to report to.
    ///
    /// # Errors
    ///
    /// Returns `Error::Busy` if a session is already running or the
    /// dispatcher is shutting down.
    pub fn try_dispatch(&self, trigger: Trigger) -> Result<()> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(Error::Busy);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Busy);
        }

        let alias = trigger.alias.clone();
        tracing::info!(%alias, target = %trigger.target, "starting recording session");

        let guard = GateGuard(Arc::clone(&self.busy));
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = runner.run(trigger).await {
                tracing::error!(%alias, error = %e, "recording session failed");
            } else {
                tracing::info!(%alias, "recording session finished");
            }
        });
        Ok(())
    }

    /// Stop accepting new triggers.
    pub fn close(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    /// Wait for the in-flight session, if any, to finish.
    pub async fn drain(&self) {
        if self.is_busy() {
            tracing::info!("waiting for the in-flight recording session");
        }
        while self.is_busy() {
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
}

/// Releases the gate when the session task ends, unwind included
struct GateGuard(Arc<AtomicBool>);

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Tick-driven poller over the configured event sources
pub struct Dispatcher {
    sources: Vec<Box<dyn EventSource>>,
    handle: DispatchHandle,
    tick: Duration,
}

impl Dispatcher {
    /// Build a dispatcher polling `sources` every `tick_ms` milliseconds.
    #[must_use]
    pub fn new(sources: Vec<Box<dyn EventSource>>, handle: DispatchHandle, tick_ms: u64) -> Self {
        Self {
            sources,
            handle,
            tick: Duration::from_millis(tick_ms.max(1)),
        }
    }

    /// Poll every source once and dispatch at most one trigger.
    ///
    /// Sources are visited in configuration order; the first trigger wins
    /// the tick. Triggers offered while the gate is held are dropped — a
    /// still-held button re-offers its trigger on the next idle tick.
    fn tick_once(&mut self) {
        let busy = self.handle.is_busy();
        let mut claimed = busy;
        for source in &mut self.sources {
            let Some(trigger) = source.poll() else {
                continue;
            };
            if claimed {
                tracing::debug!(source = %source.name(), "trigger ignored, session in progress");
                continue;
            }
            match self.handle.try_dispatch(trigger) {
                Ok(()) => claimed = true,
                Err(Error::Busy) => claimed = true,
                Err(e) => tracing::error!(source = %source.name(), error = %e, "dispatch failed"),
            }
        }
    }

    /// Run until `shutdown` fires, then stop accepting and drain.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            sources = self.sources.len(),
            tick_ms = self.tick.as_millis() as u64,
            "dispatcher running"
        );
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                () = tokio::time::sleep(self.tick) => self.tick_once(),
            }
        }
        self.handle.close();
        self.handle.drain().await;
        tracing::info!("dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Target;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct CountingRunner {
        started: AtomicUsize,
        aliases: Mutex<Vec<String>>,
        hold_ms: u64,
    }

    impl CountingRunner {
        fn new(hold_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                started: AtomicUsize::new(0),
                aliases: Mutex::new(Vec::new()),
                hold_ms,
            })
        }
    }

    #[async_trait]
    impl SessionRunner for CountingRunner {
        async fn run(&self, trigger: Trigger) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.aliases.lock().unwrap().push(trigger.alias);
            tokio::time::sleep(Duration::from_millis(self.hold_ms)).await;
            Ok(())
        }
    }

    fn trigger(alias: &str) -> Trigger {
        Trigger {
            target: Target::new("42"),
            alias: alias.into(),
            hold: None,
            remote: false,
        }
    }

    struct OneShotSource {
        alias: &'static str,
        fired: bool,
    }

    impl EventSource for OneShotSource {
        fn name(&self) -> String {
            self.alias.to_string()
        }

        fn poll(&mut self) -> Option<Trigger> {
            if self.fired {
                return None;
            }
            self.fired = true;
            Some(trigger(self.alias))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_trigger_is_rejected_while_busy() {
        let runner = CountingRunner::new(200);
        let handle = DispatchHandle::new(runner.clone());

        handle.try_dispatch(trigger("first")).unwrap();
        let err = handle.try_dispatch(trigger("second")).unwrap_err();
        assert!(matches!(err, Error::Busy));

        handle.drain().await;
        assert_eq!(runner.started.load(Ordering::SeqCst), 1);
        assert_eq!(*runner.aliases.lock().unwrap(), vec!["first".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gate_reopens_after_session_finishes() {
        let runner = CountingRunner::new(10);
        let handle = DispatchHandle::new(runner.clone());

        handle.try_dispatch(trigger("a")).unwrap();
        handle.drain().await;
        handle.try_dispatch(trigger("b")).unwrap();
        handle.drain().await;

        assert_eq!(runner.started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gate_reopens_after_a_panicking_session() {
        struct PanickyRunner;

        #[async_trait]
        impl SessionRunner for PanickyRunner {
            async fn run(&self, _trigger: Trigger) -> Result<()> {
                panic!("session blew up");
            }
        }

        let handle = DispatchHandle::new(Arc::new(PanickyRunner));
        handle.try_dispatch(trigger("doomed")).unwrap();
        handle.drain().await;

        // The unwind must have released the gate.
        assert!(!handle.is_busy());
        handle.try_dispatch(trigger("next")).unwrap();
        handle.drain().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn held_button_records_on_the_first_idle_tick() {
        use crate::config::PinBinding;
        use crate::sources::{DigitalInput, PinLevelSource};

        struct HeldLine;

        impl DigitalInput for HeldLine {
            fn is_active(&self) -> bool {
                true
            }
        }

        let runner = CountingRunner::new(20);
        let handle = DispatchHandle::new(runner.clone());
        let binding = PinBinding {
            pin: 11,
            target: Target::new("1001"),
            alias: "porch".into(),
        };
        let sources: Vec<Box<dyn EventSource>> =
            vec![Box::new(PinLevelSource::new(Arc::new(HeldLine), binding))];
        let mut dispatcher = Dispatcher::new(sources, handle.clone(), 5);

        // The button goes down while another session holds the gate; that
        // tick drops the trigger.
        handle.try_dispatch(trigger("remote")).unwrap();
        dispatcher.tick_once();
        handle.drain().await;
        assert_eq!(runner.started.load(Ordering::SeqCst), 1);

        // Still held on the first idle tick: the press must record now,
        // not wait for a release and re-press.
        dispatcher.tick_once();
        handle.drain().await;
        assert_eq!(runner.started.load(Ordering::SeqCst), 2);
        assert_eq!(
            *runner.aliases.lock().unwrap(),
            vec!["remote".to_string(), "porch".to_string()]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn closed_handle_rejects_triggers() {
        let runner = CountingRunner::new(0);
        let handle = DispatchHandle::new(runner.clone());

        handle.close();
        assert!(matches!(
            handle.try_dispatch(trigger("late")),
            Err(Error::Busy)
        ));
        assert_eq!(runner.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn earlier_source_wins_the_tick() {
        let runner = CountingRunner::new(100);
        let handle = DispatchHandle::new(runner.clone());
        let sources: Vec<Box<dyn EventSource>> = vec![
            Box::new(OneShotSource {
                alias: "porch",
                fired: false,
            }),
            Box::new(OneShotSource {
                alias: "workshop",
                fired: false,
            }),
        ];
        let mut dispatcher = Dispatcher::new(sources, handle.clone(), 10);

        dispatcher.tick_once();
        handle.drain().await;

        // Both sources were polled in the same tick; only the first ran.
        // The losing one-shot trigger was dropped, not queued.
        dispatcher.tick_once();
        handle.drain().await;
        assert_eq!(runner.started.load(Ordering::SeqCst), 1);
        assert_eq!(*runner.aliases.lock().unwrap(), vec!["porch".to_string()]);
    }
}
