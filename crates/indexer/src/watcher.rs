use crate::error::Result;
use crate::events::FileChangeEvent;
use crate::filter::IgnoreFilter;
use crate::workspace::RawEventStream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

pub type ChangeHandler = Arc<dyn Fn(FileChangeEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone)]
pub struct FileWatcherConfig {
    pub debounce: Duration,
    pub ignore_patterns: Vec<String>,
    /// Base directories for relative ignore matching
    pub base_dirs: Vec<PathBuf>,
}

impl Default for FileWatcherConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            ignore_patterns: crate::filter::DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            base_dirs: Vec::new(),
        }
    }
}

/// Filters and debounces raw change events per file path.
///
/// Every event for a path restarts that path's timer; when the timer
/// survives a full quiet period the latest event is delivered to all
/// listeners. Paths are independent of each other.
#[derive(Clone)]
pub struct FileWatcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    debounce: Duration,
    filter: IgnoreFilter,
    watching: AtomicBool,
    state: Mutex<WatcherState>,
}

#[derive(Default)]
struct WatcherState {
    pending: HashMap<String, Pending>,
    listeners: Vec<(ListenerId, ChangeHandler)>,
    next_listener: u64,
    next_generation: u64,
    source: Option<JoinHandle<()>>,
}

struct Pending {
    generation: u64,
    timer: JoinHandle<()>,
}

impl FileWatcher {
    pub fn new(config: FileWatcherConfig) -> Result<Self> {
        let filter = IgnoreFilter::new(&config.ignore_patterns, config.base_dirs)?;
        Ok(Self {
            inner: Arc::new(WatcherInner {
                debounce: config.debounce,
                filter,
                watching: AtomicBool::new(false),
                state: Mutex::new(WatcherState::default()),
            }),
        })
    }

    /// Begin accepting events. Idempotent.
    pub fn start(&self) {
        if !self.inner.watching.swap(true, Ordering::SeqCst) {
            log::debug!("File watcher started (debounce {:?})", self.inner.debounce);
        }
    }

    /// Start and pump events from a native source until it closes.
    pub fn start_with_source(&self, mut source: RawEventStream) {
        self.start();
        let watcher = self.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = source.recv().await {
                watcher.handle_event(event);
            }
            log::debug!("File watch source closed");
        });
        if let Some(previous) = self.inner.lock().source.replace(task) {
            previous.abort();
        }
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.inner.watching.load(Ordering::SeqCst)
    }

    pub fn on_change(&self, handler: impl Fn(FileChangeEvent) + Send + Sync + 'static) -> ListenerId {
        let mut state = self.inner.lock();
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        state.listeners.push((id, Arc::new(handler)));
        id
    }

    pub fn off_change(&self, id: ListenerId) -> bool {
        let mut state = self.inner.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(listener, _)| *listener != id);
        state.listeners.len() != before
    }

    /// Inject a raw event as if the platform had reported it.
    pub fn simulate_change(&self, event: FileChangeEvent) {
        self.handle_event(event);
    }

    /// Number of paths with a pending (not yet emitted) event
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Stop watching, cancel every pending timer and drop buffered events.
    pub fn dispose(&self) {
        self.inner.watching.store(false, Ordering::SeqCst);
        let mut state = self.inner.lock();
        for (_, pending) in state.pending.drain() {
            pending.timer.abort();
        }
        if let Some(source) = state.source.take() {
            source.abort();
        }
        state.listeners.clear();
    }

    fn handle_event(&self, event: FileChangeEvent) {
        if !self.is_watching() {
            return;
        }
        if self.inner.filter.is_ignored(&event.file_path) {
            log::trace!("Ignoring change to {}", event.file_path);
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("Dropping change to {}: no async runtime", event.file_path);
            return;
        };

        let mut state = self.inner.lock();
        state.next_generation += 1;
        let generation = state.next_generation;
        let path = event.file_path.clone();

        let inner = Arc::downgrade(&self.inner);
        let debounce = self.inner.debounce;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Some(inner) = inner.upgrade() {
                inner.fire(event, generation);
            }
        });

        if let Some(previous) = state.pending.insert(path, Pending { generation, timer }) {
            previous.timer.abort();
        }
    }
}

impl WatcherInner {
    fn lock(&self) -> MutexGuard<'_, WatcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fire(&self, event: FileChangeEvent, generation: u64) {
        let listeners: Vec<ChangeHandler> = {
            let mut state = self.lock();
            match state.pending.get(&event.file_path) {
                Some(pending) if pending.generation == generation => {
                    state.pending.remove(&event.file_path);
                }
                _ => return,
            }
            state.listeners.iter().map(|(_, h)| h.clone()).collect()
        };
        if !self.watching.load(Ordering::SeqCst) {
            return;
        }

        log::debug!("{} {}", event.kind, event.file_path);
        for listener in listeners {
            listener(event.clone());
        }
    }
}
