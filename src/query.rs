//! Query engine: one cache entry per [`CacheKey`], shared by every
//! subscription with equal arguments.
//!
//! Fetches run on worker threads. Their results are queued and only applied
//! when the owner calls [`QueryClient::poll`] (or [`QueryClient::pump`]), so
//! cache state changes on the event-loop thread. Each dispatched request gets
//! a sequence number; a response older than the last one applied to its key
//! is dropped.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::data::{Fetcher, Request};
use crate::endpoints::{CacheKey, Endpoint, Tag};
use crate::error::FetchError;

type Payload = Arc<dyn Any + Send + Sync>;
type Decoder = fn(&str) -> Result<Payload, FetchError>;

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub workers: usize,
    pub keep_unused_for: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            keep_unused_for: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    pub skip: bool,
}

impl QueryOptions {
    pub fn skip(skip: bool) -> Self {
        Self { skip }
    }
}

/// Snapshot of one query as seen by its subscriber.
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<FetchError>,
    /// First fetch of the key, nothing cached yet.
    pub is_loading: bool,
    /// Any fetch in flight, including refetches.
    pub is_fetching: bool,
    pub is_skipped: bool,
}

impl<T> QueryState<T> {
    fn empty(is_skipped: bool) -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            is_fetching: false,
            is_skipped,
        }
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.error.is_none()
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            is_loading: self.is_loading,
            is_fetching: self.is_fetching,
            is_skipped: self.is_skipped,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for QueryState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryState")
            .field("data", &self.data)
            .field("error", &self.error)
            .field("is_loading", &self.is_loading)
            .field("is_fetching", &self.is_fetching)
            .field("is_skipped", &self.is_skipped)
            .finish()
    }
}

struct Job {
    key: CacheKey,
    seq: u64,
    request: Request,
    decode: Decoder,
}

struct Completion {
    key: CacheKey,
    seq: u64,
    result: Result<Payload, FetchError>,
}

struct Entry {
    request: Request,
    decode: Decoder,
    tags: &'static [Tag],
    data: Option<Payload>,
    error: Option<FetchError>,
    in_flight: Option<u64>,
    applied: u64,
    stale: bool,
    active: usize,
    retained: usize,
    unused_since: Option<Instant>,
}

impl Entry {
    fn new(request: Request, decode: Decoder, tags: &'static [Tag]) -> Self {
        Self {
            request,
            decode,
            tags,
            data: None,
            error: None,
            in_flight: None,
            applied: 0,
            stale: false,
            active: 0,
            retained: 0,
            unused_since: None,
        }
    }

    fn needs_fetch(&self) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        // Failures wait for an explicit refetch.
        self.stale || (self.data.is_none() && self.error.is_none())
    }

    fn snapshot<T: Send + Sync + 'static>(&self) -> QueryState<T> {
        let data = self
            .data
            .clone()
            .and_then(|payload| payload.downcast::<T>().ok());
        let is_fetching = self.in_flight.is_some();
        QueryState {
            is_loading: is_fetching && data.is_none(),
            is_fetching,
            data,
            error: self.error.clone(),
            is_skipped: false,
        }
    }
}

struct Inner {
    clock: Arc<dyn Clock>,
    keep_unused_for: Duration,
    entries: Mutex<HashMap<CacheKey, Entry>>,
    jobs: Sender<Job>,
    completions: Receiver<Completion>,
    next_seq: AtomicU64,
}

impl Inner {
    fn register(&self, key: &CacheKey, request: Request, decode: Decoder, tags: &'static [Tag]) {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(request, decode, tags));
        entry.retained += 1;
        entry.active += 1;
        entry.unused_since = None;
        if entry.needs_fetch() {
            self.dispatch(key, entry);
        } else if entry.in_flight.is_some() {
            debug!("query {key}: joining in-flight request");
        } else {
            debug!("query {key}: served from cache");
        }
    }

    fn deactivate(&self, key: &CacheKey) {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.active = entry.active.saturating_sub(1);
        }
    }

    fn reactivate(&self, key: &CacheKey) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.active += 1;
            if entry.needs_fetch() {
                self.dispatch(key, entry);
            }
        }
    }

    fn release(&self, key: &CacheKey, active: bool) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            if active {
                entry.active = entry.active.saturating_sub(1);
            }
            entry.retained = entry.retained.saturating_sub(1);
            if entry.retained == 0 {
                entry.unused_since = Some(self.clock.now());
            }
        }
    }

    fn refetch(&self, key: &CacheKey) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) => {
                self.dispatch(key, entry);
                true
            }
            None => false,
        }
    }

    fn dispatch(&self, key: &CacheKey, entry: &mut Entry) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("query {key}: dispatch #{seq}");
        let job = Job {
            key: key.clone(),
            seq,
            request: entry.request.clone(),
            decode: entry.decode,
        };
        if self.jobs.send(job).is_err() {
            warn!("query {key}: no workers left to run request");
            entry.error = Some(FetchError::Transport("query client shut down".into()));
            return;
        }
        entry.in_flight = Some(seq);
    }

    fn apply(&self, completion: Completion) -> bool {
        let Completion { key, seq, result } = completion;
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&key) else {
            debug!("query {key}: dropping response #{seq} for evicted entry");
            return false;
        };
        if seq <= entry.applied {
            debug!("query {key}: dropping superseded response #{seq}");
            return false;
        }
        entry.applied = seq;
        if entry.in_flight == Some(seq) {
            entry.in_flight = None;
        }
        match result {
            Ok(payload) => {
                entry.data = Some(payload);
                entry.error = None;
                entry.stale = false;
            }
            Err(err) => {
                warn!("query {key}: request #{seq} failed: {err}");
                entry.error = Some(err);
                entry.stale = false;
            }
        }
        true
    }

    fn poll(&self) -> Vec<CacheKey> {
        let mut changed = Vec::new();
        while let Ok(completion) = self.completions.try_recv() {
            let key = completion.key.clone();
            if self.apply(completion) && !changed.contains(&key) {
                changed.push(key);
            }
        }
        self.collect_garbage();
        changed
    }

    fn pump(&self, timeout: Duration) -> Vec<CacheKey> {
        let mut changed = Vec::new();
        if let Ok(completion) = self.completions.recv_timeout(timeout) {
            let key = completion.key.clone();
            if self.apply(completion) {
                changed.push(key);
            }
        }
        for key in self.poll() {
            if !changed.contains(&key) {
                changed.push(key);
            }
        }
        changed
    }

    fn collect_garbage(&self) {
        let now = self.clock.now();
        let keep = self.keep_unused_for;
        self.entries.lock().retain(|key, entry| {
            let expired = entry.retained == 0
                && entry
                    .unused_since
                    .map(|since| now.duration_since(since) >= keep)
                    .unwrap_or(false);
            if expired {
                debug!("query {key}: evicted after {keep:?} unused");
            }
            !expired
        });
    }

    fn invalidate(&self, tags: &[Tag]) -> usize {
        let mut entries = self.entries.lock();
        let mut count = 0;
        for (key, entry) in entries.iter_mut() {
            if !entry.tags.iter().any(|tag| tags.contains(tag)) {
                continue;
            }
            count += 1;
            entry.stale = true;
            if entry.active > 0 {
                self.dispatch(key, entry);
            }
        }
        info!("invalidated {count} cached queries for {tags:?}");
        count
    }
}

/// Owns the fetch workers and the shared cache.
pub struct QueryClient {
    inner: Arc<Inner>,
    stop: Sender<()>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl QueryClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>, config: QueryConfig) -> Self {
        let workers = config.workers.max(1);
        let (job_tx, job_rx) = unbounded::<Job>();
        let (done_tx, done_rx) = unbounded::<Completion>();
        let (stop_tx, stop_rx) = unbounded::<()>();

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let jobs = job_rx.clone();
            let stop = stop_rx.clone();
            let done = done_tx.clone();
            let fetcher = fetcher.clone();
            handles.push(thread::spawn(move || worker(fetcher, jobs, stop, done)));
        }

        let inner = Arc::new(Inner {
            clock,
            keep_unused_for: config.keep_unused_for,
            entries: Mutex::new(HashMap::new()),
            jobs: job_tx,
            completions: done_rx,
            next_seq: AtomicU64::new(0),
        });

        Self {
            inner,
            stop: stop_tx,
            handles,
        }
    }

    pub fn subscribe<E: Endpoint>(&self, args: E, options: QueryOptions) -> Subscription<E> {
        let mut subscription = Subscription {
            inner: self.inner.clone(),
            args: args.clone(),
            skip: true,
            registered: None,
            _output: PhantomData,
        };
        subscription.update(args, options);
        subscription
    }

    /// Applies every response that has arrived. Returns the keys whose
    /// state changed.
    pub fn poll(&self) -> Vec<CacheKey> {
        self.inner.poll()
    }

    /// Like [`QueryClient::poll`], but first waits up to `timeout` for a
    /// response to arrive.
    pub fn pump(&self, timeout: Duration) -> Vec<CacheKey> {
        self.inner.pump(timeout)
    }

    /// Marks every entry carrying one of `tags` stale and refetches those
    /// with active subscribers. Writes call this with the tags they touch.
    pub fn invalidate_tags(&self, tags: &[Tag]) -> usize {
        self.inner.invalidate(tags)
    }

    pub fn cached<E: Endpoint>(&self, args: &E) -> Option<Arc<E::Output>> {
        self.inner
            .entries
            .lock()
            .get(&args.cache_key())
            .and_then(|entry| entry.data.clone())
            .and_then(|payload| payload.downcast::<E::Output>().ok())
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shutdown(&mut self) {
        for _ in &self.handles {
            let _ = self.stop.send(());
        }
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

impl Drop for QueryClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker(
    fetcher: Arc<dyn Fetcher>,
    jobs: Receiver<Job>,
    stop: Receiver<()>,
    done: Sender<Completion>,
) {
    loop {
        crossbeam_channel::select! {
            recv(stop) -> _ => break,
            recv(jobs) -> msg => {
                let Ok(job) = msg else { break };
                let result = fetcher
                    .fetch(&job.request)
                    .and_then(|body| (job.decode)(&body));
                let completion = Completion {
                    key: job.key,
                    seq: job.seq,
                    result,
                };
                if done.send(completion).is_err() {
                    break;
                }
            }
        }
    }
}

fn decode_erased<E: Endpoint>(body: &str) -> Result<Payload, FetchError> {
    E::decode(body).map(|output| Arc::new(output) as Payload)
}

/// A live interest in one endpoint. Holding it keeps the entry cached;
/// dropping it starts the entry's unused timer.
pub struct Subscription<E: Endpoint> {
    inner: Arc<Inner>,
    args: E,
    skip: bool,
    registered: Option<(CacheKey, bool)>,
    _output: PhantomData<fn() -> E::Output>,
}

impl<E: Endpoint> Subscription<E> {
    /// Points the subscription at new arguments and skip flag. While skipped
    /// no request is made, and the last non-skipped result stays visible.
    pub fn update(&mut self, args: E, options: QueryOptions) {
        self.args = args;
        self.skip = options.skip;

        if options.skip {
            if let Some((key, active)) = self.registered.as_mut() {
                if *active {
                    self.inner.deactivate(key);
                    *active = false;
                }
            }
            return;
        }

        let key = self.args.cache_key();
        match self.registered.take() {
            Some((current, active)) if current == key => {
                if !active {
                    self.inner.reactivate(&key);
                }
            }
            previous => {
                if let Some((old, active)) = previous {
                    self.inner.release(&old, active);
                }
                self.inner.register(
                    &key,
                    self.args.request(),
                    decode_erased::<E>,
                    self.args.tags(),
                );
            }
        }
        self.registered = Some((key, true));
    }

    pub fn set_args(&mut self, args: E) {
        let skip = self.skip;
        self.update(args, QueryOptions { skip });
    }

    pub fn set_skip(&mut self, skip: bool) {
        let args = self.args.clone();
        self.update(args, QueryOptions { skip });
    }

    pub fn args(&self) -> &E {
        &self.args
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    pub fn key(&self) -> Option<&CacheKey> {
        self.registered.as_ref().map(|(key, _)| key)
    }

    pub fn state(&self) -> QueryState<E::Output> {
        let Some((key, _)) = &self.registered else {
            return QueryState::empty(self.skip);
        };
        let entries = self.inner.entries.lock();
        let Some(entry) = entries.get(key) else {
            return QueryState::empty(self.skip);
        };
        let mut state = entry.snapshot::<E::Output>();
        if self.skip {
            state.is_loading = false;
            state.is_fetching = false;
            state.is_skipped = true;
        }
        state
    }

    /// Forces a new request for the current key. Skipped subscriptions
    /// cannot refetch.
    pub fn refetch(&self) -> bool {
        match &self.registered {
            Some((key, true)) if !self.skip => self.inner.refetch(key),
            _ => false,
        }
    }

    /// Pumps responses until this query is no longer fetching or `timeout`
    /// passes, then returns its state.
    pub fn settle(&self, timeout: Duration) -> QueryState<E::Output> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.state();
            let now = Instant::now();
            if !state.is_fetching || now >= deadline {
                return state;
            }
            self.inner.pump(deadline - now);
        }
    }
}

impl<E: Endpoint> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some((key, active)) = self.registered.take() {
            self.inner.release(&key, active);
        }
    }
}
