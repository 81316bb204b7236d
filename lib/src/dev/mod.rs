//! The development orchestrator: a live, atomically swapped snapshot of the
//! site, rebuilt on every file change and served over HTTP.
//!
//! ```text
//!   watcher thread                 server thread(s)
//!   ──────────────                 ────────────────
//!   notify events                  GET /path
//!        │                             │
//!     debounce                   Orchestrator::handle()
//!        │                             │
//!  Orchestrator::reparse()  ──▶  ArcSwap<Snapshot>  (lock-free load)
//! ```
//!
//! Requests always see one fully built [`Snapshot`]. A reparse builds a new
//! snapshot off to the side and publishes it with a single store; among
//! concurrently running reparses the most recently started one wins.

pub mod response;
pub mod server;
pub mod watch;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Chainable, Error, ErrorKind, Result};
use crate::render::Renderer;
use crate::scope::Resolvers;
use crate::site::Site;

pub use response::Response;

/// URL of the page rendered for unknown paths, if the project has one.
pub const NOT_FOUND_URL: &str = "/404";

/// The result of one parse cycle, as requests see it.
#[derive(Debug)]
pub struct Snapshot {
    /// The last site that parsed successfully.
    pub site: Option<Arc<Site>>,
    pub renderer: Arc<Renderer>,
    /// Set when the most recent parse failed. Pages are not served while set.
    pub error: Option<Error>,
    pub refreshed: DateTime<Utc>,
}

impl Snapshot {
    /// `refreshed` as sent to the reload probe.
    pub fn last_refresh(&self) -> String {
        self.refreshed.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }
}

#[derive(Debug)]
pub struct Orchestrator {
    config: Config,
    resolvers: Resolvers,
    snapshot: ArcSwap<Snapshot>,
    tickets: AtomicU64,
    /// The ticket of the last published snapshot.
    published: Mutex<u64>,
}

impl Orchestrator {
    /// Parses the project once. Missing required files and parse failures
    /// are logged, not returned: the server starts regardless.
    pub fn new(config: Config, resolvers: Resolvers) -> Self {
        let (site, error) = match Orchestrator::parse(&config, &resolvers) {
            Ok(site) => (Some(site), None),
            Err(e) => (None, Some(e)),
        };

        let snapshot = Snapshot {
            site,
            renderer: Arc::new(Renderer::new(&config)),
            error,
            refreshed: Utc::now(),
        };

        Orchestrator {
            config,
            resolvers,
            snapshot: ArcSwap::from_pointee(snapshot),
            tickets: AtomicU64::new(0),
            published: Mutex::new(0),
        }
    }

    fn parse(config: &Config, resolvers: &Resolvers) -> Result<Arc<Site>> {
        let site = match Site::parse(config, resolvers.clone()) {
            Ok(site) => site,
            Err(e) => {
                log::error!(target: "wren::dev", "failed to parse site:\n{e}");
                return Err(e);
            }
        };

        if let Err(e) = site.validate(config) {
            log::warn!(target: "wren::dev", "{e}");
        }

        Ok(Arc::new(site))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn last_refresh(&self) -> String {
        self.snapshot.load().last_refresh()
    }

    /// Reparses the whole project and publishes the result, unless a reparse
    /// that started later has already published. Returns whether this
    /// reparse's result was published.
    pub fn reparse(&self) -> bool {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let result = Orchestrator::parse(&self.config, &self.resolvers);
        let renderer = Arc::new(Renderer::new(&self.config));

        let mut published = self.published.lock();
        if ticket < *published {
            log::debug!(target: "wren::dev", "discarding superseded reparse #{ticket}");
            return false;
        }

        let previous = self.snapshot.load_full();
        let (site, error) = match result {
            Ok(site) => (Some(site), None),
            Err(e) => (previous.site.clone(), Some(e)),
        };

        let now = Utc::now();
        let refreshed = if now > previous.refreshed {
            now
        } else {
            previous.refreshed + chrono::Duration::milliseconds(1)
        };

        self.snapshot.store(Arc::new(Snapshot { site, renderer, error, refreshed }));
        *published = ticket;
        true
    }

    /// Answers a dev request for `url`, a raw request target. Never fails:
    /// errors and panics become `500` responses.
    pub fn handle(&self, url: &str) -> Response {
        let path = request_path(url);
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_handle(&path))) {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let e = match e.kind() {
                    ErrorKind::Other => e.with_kind(ErrorKind::Request),
                    _ => e,
                };

                log::error!(target: "wren::dev", "{path}: {e}");
                Response::error(&e)
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                log::error!(target: "wren::dev", "{path}: panicked: {message}");
                Response::panic(&message, &std::backtrace::Backtrace::force_capture())
            }
        }
    }

    fn try_handle(&self, path: &str) -> Result<Response> {
        let snapshot = self.snapshot.load_full();
        let settings = &self.config.settings;
        if path == settings.reload_path {
            return Ok(Response::probe(&snapshot.last_refresh()));
        }

        if let Some(site) = &snapshot.site {
            let relative = path.trim_start_matches('/');
            if site.is_static(relative) {
                let bytes = std::fs::read(site.root().join(relative))
                    .chain_with(|| error!("failed to read static file", "file" => relative))?;

                return Ok(Response::file(relative, bytes));
            }
        }

        if let Some(error) = &snapshot.error {
            return Err(error.clone());
        }

        let Some(site) = &snapshot.site else {
            return Err(error!("no site has been parsed yet"));
        };

        let inject = |html: String| {
            let refreshed = snapshot.last_refresh();
            response::inject_reload(&html, &settings.reload_path, settings.reload_interval_ms, &refreshed)
        };

        if let Some(page) = site.with_url(path) {
            let rendered = snapshot.renderer.render(site, page)?;
            return Ok(Response::html(200, inject(rendered.html)));
        }

        match site.with_url(NOT_FOUND_URL) {
            Some(page) => {
                let rendered = snapshot.renderer.render(site, page)?;
                Ok(Response::html(404, inject(rendered.html)))
            }
            None => Ok(Response::not_found(inject)),
        }
    }
}

/// Percent-decodes `url` and strips its query string and fragment.
pub fn request_path(url: &str) -> String {
    let end = url.find(|c| c == '?' || c == '#').unwrap_or(url.len());
    let path = percent_encoding::percent_decode_str(&url[..end]).decode_utf8_lossy();
    if path.starts_with('/') {
        path.into_owned()
    } else {
        format!("/{path}")
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

/// Parses the project, then watches it and serves it until the server stops.
pub fn run(config: Config, resolvers: Resolvers) -> Result<()> {
    let bound = server::bind(&config.settings.host, config.settings.port)?;
    let orchestrator = Arc::new(Orchestrator::new(config, resolvers));

    let watched = orchestrator.clone();
    let _watcher = watch::spawn(watched)
        .chain(error!("failed to start the file watcher"))?;

    server::serve(&orchestrator, bound);
    Ok(())
}
