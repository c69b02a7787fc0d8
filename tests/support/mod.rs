use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use assert_cmd::Command;
use parking_lot::Mutex;
use tempfile::TempDir;
use tiny_http::{Response, Server};

/// Local stand-in for the Reddit JSON API, answering canned bodies by path.
pub struct FakeReddit {
    server: Arc<Server>,
    base_url: String,
    hits: Arc<Mutex<Vec<String>>>,
    handle: Option<thread::JoinHandle<()>>,
    config_dir: TempDir,
}

impl FakeReddit {
    pub fn start(routes: Vec<(&'static str, u16, String)>) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind fake reddit"));
        let port = server
            .server_addr()
            .to_ip()
            .expect("ip listener")
            .port();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let server = server.clone();
            let hits = hits.clone();
            thread::spawn(move || {
                for request in server.incoming_requests() {
                    let url = request.url().to_string();
                    hits.lock().push(url.clone());
                    let path = url.split('?').next().unwrap_or_default();
                    let response = match routes.iter().find(|(route, _, _)| *route == path) {
                        Some((_, status, body)) => {
                            Response::from_string(body.clone()).with_status_code(*status)
                        }
                        None => Response::from_string("not found").with_status_code(404),
                    };
                    let _ = request.respond(response);
                }
            })
        };

        Self {
            server,
            base_url: format!("http://127.0.0.1:{port}/"),
            hits,
            handle: Some(handle),
            config_dir: tempfile::tempdir().expect("config dir"),
        }
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().clone()
    }

    fn config_path(&self) -> PathBuf {
        let path = self.config_dir.path().join("config.yaml");
        std::fs::write(
            &path,
            format!(
                "reddit:\n  base_url: {}\n  timeout: 5s\nsearch:\n  debounce: 10ms\n",
                self.base_url
            ),
        )
        .expect("write config");
        path
    }

    /// The binary pointed at this server with an isolated config file.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("reddit-lens").expect("binary built");
        cmd.arg("--config")
            .arg(self.config_path())
            .arg("--width")
            .arg("100")
            .env("NO_COLOR", "1");
        cmd
    }
}

impl Drop for FakeReddit {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn post_json(id: &str, title: &str, subreddit: &str) -> serde_json::Value {
    serde_json::json!({
        "kind": "t3",
        "data": {
            "id": id,
            "name": format!("t3_{id}"),
            "title": title,
            "author": "ferris",
            "subreddit": subreddit,
            "subreddit_name_prefixed": format!("r/{subreddit}"),
            "score": 1500,
            "num_comments": 12,
            "created_utc": 1_600_000_000.0,
            "thumbnail": "self",
            "is_self": true,
            "over_18": false,
            "url": "",
            "permalink": format!("/r/{subreddit}/comments/{id}/"),
            "selftext": ""
        }
    })
}

pub fn listing(children: Vec<serde_json::Value>, after: Option<&str>) -> String {
    serde_json::json!({
        "kind": "Listing",
        "data": {"after": after, "before": null, "children": children}
    })
    .to_string()
}
