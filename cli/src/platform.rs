//! Native implementations of the session platform seams.
//!
//! Persistent storage is a JSON file under the state directory; the
//! session-scoped store is a JSON file in the system temp directory, so a
//! non-remembered login lasts until the temp directory is cleaned.

#[cfg(test)]
#[path = "platform_test.rs"]
mod platform_test;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use console_session::platform::{HttpRequest, HttpResponse, KeyValueStore, Method, Navigator, Scheduler, Transport};
use console_session::TransportError;
use futures::future::LocalBoxFuture;
use serde_json::Value;

// =============================================================================
// STORAGE
// =============================================================================

/// Key/value store backed by a single JSON object file.
///
/// Every read goes to disk, so concurrent invocations see each other's
/// writes. An unreadable or corrupt file reads as empty.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, String> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|error| {
            tracing::warn!(path = %self.path.display(), %error, "ignoring corrupt state file");
            BTreeMap::new()
        })
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, rendered)?;
        fs::rename(&tmp, &self.path)
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) {
        let mut entries = self.load();
        apply(&mut entries);
        if let Err(error) = self.save(&entries) {
            tracing::warn!(path = %self.path.display(), %error, "state file write failed");
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.load().remove(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        });
    }

    fn remove(&self, key: &str) {
        self.update(|entries| {
            entries.remove(key);
        });
    }
}

// =============================================================================
// HTTP
// =============================================================================

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend fails to initialize.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

pub fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait::async_trait(?Send)]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(reqwest_method(request.method), &request.url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|error| TransportError(error.to_string()))?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        tracing::debug!(method = request.method.as_str(), url = %request.url, status, "http exchange");
        Ok(HttpResponse { status, body })
    }
}

// =============================================================================
// NAVIGATION / TASKS
// =============================================================================

/// Tracks a virtual current view; redirects are announced on stderr.
#[derive(Debug)]
pub struct TerminalNavigator {
    current: RefCell<String>,
}

impl TerminalNavigator {
    pub fn new(start: &str) -> Self {
        Self { current: RefCell::new(start.to_owned()) }
    }
}

impl Navigator for TerminalNavigator {
    fn current_path(&self) -> String {
        self.current.borrow().clone()
    }

    fn redirect(&self, path: &str) {
        eprintln!("-> {path}");
        let bare = path.split('?').next().unwrap_or(path);
        *self.current.borrow_mut() = bare.to_owned();
    }
}

/// Spawns onto the enclosing `tokio::task::LocalSet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        tokio::task::spawn_local(task);
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}
