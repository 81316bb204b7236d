use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

use crate::error::Result;
use super::Orchestrator;

/// Quiet period after the last event before a reparse starts.
pub const DEBOUNCE_MS: u64 = 300;

/// Directories whose changes never trigger a reparse.
const IGNORED_DIRS: &[&str] = &["node_modules"];

/// Editor droppings and hidden files.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Decides which changed paths matter.
#[derive(Debug, Clone)]
pub struct Filter {
    root: PathBuf,
    output: PathBuf,
}

impl Filter {
    pub fn new(root: &Path, output: &Path) -> Self {
        Filter { root: root.to_path_buf(), output: output.to_path_buf() }
    }

    /// Whether a change at `path` should trigger a reparse: anything under
    /// the root except hidden paths, dependency directories, editor temp
    /// files and the build output.
    pub fn is_relevant(&self, path: &Path) -> bool {
        if path.starts_with(&self.output) || is_temp_file(path) {
            return false;
        }

        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };

        !relative.components().any(|c| {
            let c = c.as_os_str().to_string_lossy();
            c.starts_with('.') || IGNORED_DIRS.contains(&&*c)
        })
    }
}

/// Batches bursts of events into one reparse.
#[derive(Debug)]
struct Debouncer {
    filter: Filter,
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new(filter: Filter) -> Self {
        Debouncer { filter, pending: FxHashSet::default(), last_event: None }
    }

    fn add(&mut self, event: Event) {
        let before = self.pending.len();
        let filter = &self.filter;
        self.pending.extend(event.paths.into_iter().filter(|p| filter.is_relevant(p)));
        if self.pending.len() > before {
            self.last_event = Some(Instant::now());
        }
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self.last_event.is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        self.pending.drain().collect()
    }

    /// How long to wait for the next event: until the quiet period ends if
    /// changes are pending, a long while otherwise.
    fn timeout(&self) -> Duration {
        let quiet = Duration::from_millis(DEBOUNCE_MS);
        match self.last_event {
            Some(t) if !self.pending.is_empty() => quiet.saturating_sub(t.elapsed()),
            _ => Duration::from_secs(60),
        }
    }

    /// Feeds one receive result in. Readiness is checked after every result,
    /// so a steady stream of unrelated events cannot postpone a reparse.
    fn step(&mut self, received: std::result::Result<notify::Result<Event>, RecvTimeoutError>) -> Step {
        match received {
            Ok(Ok(event)) if is_change(&event) => self.add(event),
            Ok(Ok(_)) | Err(RecvTimeoutError::Timeout) => {}
            Ok(Err(e)) => log::error!(target: "wren::dev", "watch error: {e}"),
            Err(RecvTimeoutError::Disconnected) => return Step::Stop,
        }

        if self.ready() {
            Step::Reparse(self.take())
        } else {
            Step::Wait
        }
    }
}

#[derive(Debug, PartialEq)]
enum Step {
    Wait,
    Reparse(Vec<PathBuf>),
    Stop,
}

fn is_change(event: &Event) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
}

/// Starts watching the orchestrator's root on a new thread. Every debounced
/// batch of relevant changes triggers a full reparse. Watching stops when the
/// returned watcher is dropped.
pub fn spawn(orchestrator: Arc<Orchestrator>) -> Result<RecommendedWatcher> {
    let config = orchestrator.config();
    // Events carry absolute, resolved paths.
    let root = config.root.canonicalize()?;
    let filter = Filter::new(&root, &root.join(&config.settings.output));

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx)?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    log::info!(target: "wren::dev", "watching {}", root.display());

    std::thread::spawn(move || {
        let mut debouncer = Debouncer::new(filter);
        loop {
            match debouncer.step(rx.recv_timeout(debouncer.timeout())) {
                Step::Wait => {}
                Step::Stop => break,
                Step::Reparse(changed) => {
                    let names: Vec<_> = changed.iter()
                        .map(|p| p.strip_prefix(&root).unwrap_or(p).display().to_string())
                        .collect();

                    log::info!(target: "wren::dev", "changed: {}, reparsing", names.join(", "));
                    orchestrator.reparse();
                }
            }
        }
    });

    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevant_paths() {
        let filter = Filter::new(Path::new("/site"), Path::new("/site/build"));
        assert!(filter.is_relevant(Path::new("/site/index.html")));
        assert!(filter.is_relevant(Path::new("/site/_layouts/layout.html")));
        assert!(filter.is_relevant(Path::new("/site/builder/a.md")));
        assert!(!filter.is_relevant(Path::new("/site/build/index.html")));
        assert!(!filter.is_relevant(Path::new("/site/.git/index")));
        assert!(!filter.is_relevant(Path::new("/site/node_modules/x/a.js")));
        assert!(!filter.is_relevant(Path::new("/site/a.md~")));
        assert!(!filter.is_relevant(Path::new("/site/.a.md.swp")));
        assert!(!filter.is_relevant(Path::new("/elsewhere/a.md")));
    }

    #[test]
    fn debouncer_waits_for_quiet() {
        let mut debouncer = Debouncer::new(Filter::new(Path::new("/site"), Path::new("/site/build")));
        let event = |path: &str| Event::new(EventKind::Any).add_path(PathBuf::from(path));

        debouncer.add(event("/site/.hidden"));
        assert!(!debouncer.ready());
        assert_eq!(debouncer.timeout(), Duration::from_secs(60));

        debouncer.add(event("/site/a.md"));
        debouncer.add(event("/site/a.md"));
        assert!(!debouncer.ready());
        assert!(debouncer.timeout() <= Duration::from_millis(DEBOUNCE_MS));
        assert!(debouncer.timeout() > Duration::ZERO);

        std::thread::sleep(Duration::from_millis(DEBOUNCE_MS + 50));
        assert!(debouncer.ready());
        assert_eq!(debouncer.take(), [PathBuf::from("/site/a.md")]);
        assert!(!debouncer.ready());
    }

    #[test]
    fn unrelated_events_do_not_postpone_a_reparse() {
        let mut debouncer = Debouncer::new(Filter::new(Path::new("/site"), Path::new("/site/build")));
        let change = |path: &str| -> std::result::Result<notify::Result<Event>, RecvTimeoutError> {
            let event = Event::new(EventKind::Modify(notify::event::ModifyKind::Any));
            Ok(Ok(event.add_path(PathBuf::from(path))))
        };

        assert_eq!(debouncer.step(change("/site/a.md")), Step::Wait);
        std::thread::sleep(Duration::from_millis(DEBOUNCE_MS + 50));
        assert_eq!(debouncer.timeout(), Duration::ZERO);

        // Events that never become pending arrive before any timeout does.
        let step = debouncer.step(change("/site/build/index.html"));
        assert_eq!(step, Step::Reparse(vec![PathBuf::from("/site/a.md")]));
        assert_eq!(debouncer.step(change("/site/.git/index")), Step::Wait);
        assert_eq!(debouncer.step(Err(RecvTimeoutError::Disconnected)), Step::Stop);
    }
}
