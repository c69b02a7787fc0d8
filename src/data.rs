use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::FetchError;
use crate::reddit;

/// A GET against the upstream API, relative to its base URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Request {
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl Request {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }
}

/// Transport seam of the query engine. Returns the raw response body.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: &Request) -> Result<String, FetchError>;
}

impl Fetcher for reddit::Client {
    fn fetch(&self, request: &Request) -> Result<String, FetchError> {
        self.get(&request.path, &request.params)
    }
}

/// Canned responses keyed by request path. Unknown paths answer 404.
#[derive(Default)]
pub struct StaticFetcher {
    responses: Mutex<HashMap<String, Result<String, FetchError>>>,
    calls: AtomicUsize,
    log: Mutex<Vec<Request>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, body: impl Into<String>) {
        self.responses
            .lock()
            .insert(path.to_string(), Ok(body.into()));
    }

    pub fn fail(&self, path: &str, err: FetchError) {
        self.responses.lock().insert(path.to_string(), Err(err));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().clone()
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, request: &Request) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(request.clone());
        self.responses
            .lock()
            .get(&request.path)
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Status {
                    status: 404,
                    body: String::new(),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_fetcher_answers_by_path_and_records_calls() {
        let fetcher = StaticFetcher::new();
        fetcher.respond("/r/rust/hot.json", "{}");
        fetcher.fail("/search.json", FetchError::Transport("offline".into()));

        let request = Request::new("/r/rust/hot.json").param("limit", "25");
        assert_eq!(fetcher.fetch(&request).unwrap(), "{}");
        assert!(fetcher.fetch(&Request::new("/search.json")).unwrap_err().is_transport());
        assert_eq!(
            fetcher.fetch(&Request::new("/missing.json")).unwrap_err().status(),
            Some(404)
        );
        assert_eq!(fetcher.calls(), 3);
        assert_eq!(fetcher.requests()[0], request);
    }
}
