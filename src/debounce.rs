use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::clock::Clock;

/// Value that only settles once its input has been quiet for `delay`.
///
/// Driven from an event loop: feed input to [`Debouncer::set`] and call
/// [`Debouncer::poll`] on each tick. A `set` that changes the input cancels
/// the update scheduled by the previous one. Dropping the debouncer drops
/// the pending update with it.
pub struct Debouncer<T> {
    delay: Duration,
    clock: Arc<dyn Clock>,
    value: T,
    pending: Option<Pending<T>>,
}

struct Pending<T> {
    value: T,
    due: Instant,
}

impl<T> Debouncer<T> {
    pub fn new(initial: T, delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            delay,
            clock,
            value: initial,
            pending: None,
        }
    }

    /// Applies the pending value if its delay has elapsed. Returns `true`
    /// when the settled value was replaced.
    pub fn poll(&mut self) -> bool {
        let now = self.clock.now();
        match self.pending.take() {
            Some(pending) if now >= pending.due => {
                self.value = pending.value;
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// When the next update is due, so an event loop can size its wait.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.due)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<T: PartialEq> Debouncer<T> {
    /// Schedules `value` to settle after the delay. Input equal to the latest
    /// one keeps the current schedule.
    pub fn set(&mut self, value: T) {
        let latest = match &self.pending {
            Some(pending) => &pending.value,
            None => &self.value,
        };
        if *latest == value {
            return;
        }
        let due = self.clock.now() + self.delay;
        self.pending = Some(Pending { value, due });
    }
}

enum Command<T> {
    Set(T),
    Stop,
}

/// Thread-backed debouncer emitting settled values on a channel.
///
/// Dropping the worker stops its timer thread and joins it, so no value is
/// emitted after teardown.
pub struct DebounceWorker<T: Send + 'static> {
    commands: Sender<Command<T>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl<T: PartialEq + Clone + Send + 'static> DebounceWorker<T> {
    pub fn spawn(delay: Duration) -> (Self, Receiver<T>) {
        let (command_tx, command_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let handle = thread::spawn(move || run_worker(delay, command_rx, output_tx));
        (
            Self {
                commands: command_tx,
                handle: Some(handle),
            },
            output_rx,
        )
    }

    pub fn set(&self, value: T) {
        let _ = self.commands.send(Command::Set(value));
    }
}

impl<T: Send + 'static> Drop for DebounceWorker<T> {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker<T: PartialEq + Clone>(delay: Duration, commands: Receiver<Command<T>>, output: Sender<T>) {
    let mut pending: Option<(T, Instant)> = None;
    let mut settled: Option<T> = None;
    loop {
        let received = match &pending {
            Some((_, due)) => {
                let wait = due.saturating_duration_since(Instant::now());
                match commands.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            None => match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => return,
            },
        };

        match received {
            Some(Command::Set(value)) => {
                let latest = pending.as_ref().map(|(queued, _)| queued).or(settled.as_ref());
                if latest != Some(&value) {
                    pending = Some((value, Instant::now() + delay));
                }
            }
            Some(Command::Stop) => return,
            None => {
                if let Some((value, _)) = pending.take() {
                    settled = Some(value.clone());
                    if output.send(value).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn debouncer(clock: &ManualClock) -> Debouncer<String> {
        Debouncer::new(String::new(), Duration::from_millis(500), Arc::new(clock.clone()))
    }

    #[test]
    fn burst_settles_once_on_last_value() {
        let clock = ManualClock::new();
        let mut search = debouncer(&clock);
        let mut updates = 0;

        for input in ["r", "re", "rea"] {
            search.set(input.to_string());
            clock.advance(Duration::from_millis(100));
            if search.poll() {
                updates += 1;
            }
        }
        assert_eq!(search.value(), "");

        clock.advance(Duration::from_millis(399));
        assert!(!search.poll());
        assert_eq!(search.value(), "");

        clock.advance(Duration::from_millis(1));
        assert!(search.poll());
        updates += 1;
        assert_eq!(search.value(), "rea");

        clock.advance(Duration::from_secs(5));
        assert!(!search.poll());
        assert_eq!(updates, 1);
    }

    #[test]
    fn new_input_reschedules_pending_update() {
        let clock = ManualClock::new();
        let mut search = debouncer(&clock);
        search.set("rust".into());
        clock.advance(Duration::from_millis(450));
        search.set("rustl".into());
        clock.advance(Duration::from_millis(450));
        assert!(!search.poll());
        clock.advance(Duration::from_millis(50));
        assert!(search.poll());
        assert_eq!(search.value(), "rustl");
    }

    #[test]
    fn unchanged_input_keeps_schedule() {
        let clock = ManualClock::new();
        let mut search = debouncer(&clock);
        search.set("rust".into());
        let due = search.deadline();
        clock.advance(Duration::from_millis(300));
        search.set("rust".into());
        assert_eq!(search.deadline(), due);
        clock.advance(Duration::from_millis(200));
        assert!(search.poll());

        search.set("rust".into());
        assert!(search.deadline().is_none());

        search.set("rusty".into());
        clock.advance(Duration::from_millis(100));
        search.set("rust".into());
        clock.advance(Duration::from_millis(500));
        assert!(search.poll());
        assert_eq!(search.value(), "rust");
    }

    #[test]
    fn cancel_drops_pending_update() {
        let clock = ManualClock::new();
        let mut search = debouncer(&clock);
        search.set("tokio".into());
        search.cancel();
        clock.advance(Duration::from_secs(1));
        assert!(!search.poll());
        assert_eq!(search.value(), "");
        assert!(search.deadline().is_none());
    }

    #[test]
    fn structural_values_are_replaced_wholesale() {
        #[derive(Debug, Clone, PartialEq)]
        struct Filters {
            subreddit: String,
            limit: u32,
        }

        let clock = ManualClock::new();
        let initial = Filters {
            subreddit: "popular".into(),
            limit: 25,
        };
        let mut filters = Debouncer::new(initial, Duration::from_millis(200), Arc::new(clock.clone()));
        filters.set(Filters {
            subreddit: "rust".into(),
            limit: 10,
        });
        clock.advance(Duration::from_millis(200));
        assert!(filters.poll());
        assert_eq!(
            filters.value(),
            &Filters {
                subreddit: "rust".into(),
                limit: 10
            }
        );
    }

    #[test]
    fn worker_emits_last_value_of_burst() {
        let (worker, settled) = DebounceWorker::spawn(Duration::from_millis(40));
        worker.set("r");
        worker.set("re");
        worker.set("rea");
        let value = settled.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(value, "rea");
        assert!(settled.recv_timeout(Duration::from_millis(120)).is_err());
    }

    #[test]
    fn worker_skips_repeat_of_settled_value() {
        let (worker, settled) = DebounceWorker::spawn(Duration::from_millis(40));
        worker.set("rust");
        assert_eq!(settled.recv_timeout(Duration::from_secs(2)).unwrap(), "rust");
        worker.set("rust");
        assert!(settled.recv_timeout(Duration::from_millis(120)).is_err());
    }

    #[test]
    fn dropping_worker_cancels_pending_value() {
        let (worker, settled) = DebounceWorker::spawn(Duration::from_millis(40));
        worker.set("rust");
        drop(worker);
        assert!(settled.recv_timeout(Duration::from_millis(120)).is_err());
        assert!(settled.try_recv().is_err());
    }
}
