use std::io::{self, IsTerminal, Write};

use crossterm::cursor::{Hide, Show};
use crossterm::event::KeyCode;
use crossterm::execute;
use log::{debug, warn};

use crate::comments::CommentTree;
use crate::endpoints::GetPostComments;
use crate::error::FetchError;
use crate::query::{QueryClient, QueryOptions, Subscription};
use crate::reddit::Post;
use crate::render::{render_thread, RenderedThread};

pub const COMMENTS_FAILED: &str = "Failed to load comments";

/// Process-wide side effects held only while a modal is open.
pub trait ModalEffects {
    fn install(&mut self);
    fn uninstall(&mut self);
}

/// Hides the terminal cursor while open. Does nothing when stdout is not a
/// terminal.
#[derive(Debug, Default)]
pub struct TerminalEffects;

impl ModalEffects for TerminalEffects {
    fn install(&mut self) {
        let mut stdout = io::stdout();
        if stdout.is_terminal() {
            if let Err(err) = execute!(stdout, Hide) {
                warn!("failed to hide cursor: {err}");
            }
        }
    }

    fn uninstall(&mut self) {
        let mut stdout = io::stdout();
        if stdout.is_terminal() {
            if let Err(err) = execute!(stdout, Show) {
                warn!("failed to restore cursor: {err}");
            }
            let _ = stdout.flush();
        }
    }
}

pub enum CommentsView {
    Hidden,
    Loading,
    Failed { message: &'static str, error: FetchError },
    Loaded(RenderedThread),
}

/// Detail view of one post. Comments are only requested while open, and
/// installed effects are removed on close or drop.
pub struct PostModal {
    post: Post,
    open: bool,
    effects: Box<dyn ModalEffects>,
    comments: Subscription<GetPostComments>,
}

impl PostModal {
    pub fn new(client: &QueryClient, post: Post, effects: Box<dyn ModalEffects>) -> Self {
        let comments = client.subscribe(GetPostComments::for_post(&post), QueryOptions::skip(true));
        Self {
            post,
            open: false,
            effects,
            comments,
        }
    }

    pub fn post(&self) -> &Post {
        &self.post
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        if self.open {
            return;
        }
        debug!("opening post {}", self.post.id);
        self.effects.install();
        self.open = true;
        self.comments.set_skip(false);
    }

    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        debug!("closing post {}", self.post.id);
        self.effects.uninstall();
        self.open = false;
        self.comments.set_skip(true);
    }

    /// Escape closes an open modal. Returns whether the key was consumed.
    pub fn handle_key(&mut self, key: KeyCode) -> bool {
        if self.is_open() && key == KeyCode::Esc {
            self.close();
            return true;
        }
        false
    }

    pub fn refetch_comments(&self) -> bool {
        self.comments.refetch()
    }

    pub fn comments(&self) -> &Subscription<GetPostComments> {
        &self.comments
    }

    /// Comment section state. A failure stays inside this section; the post
    /// header is still available through [`PostModal::post`].
    pub fn comments_view(&self, now: i64) -> CommentsView {
        if !self.is_open() {
            return CommentsView::Hidden;
        }
        let state = self.comments.state();
        if state.is_loading {
            return CommentsView::Loading;
        }
        if let Some(error) = state.error {
            return CommentsView::Failed {
                message: COMMENTS_FAILED,
                error,
            };
        }
        match state.data {
            Some(thread) => {
                let tree = CommentTree::from_listing(thread.comments.clone());
                CommentsView::Loaded(render_thread(&tree, now))
            }
            None => CommentsView::Loading,
        }
    }
}

impl Drop for PostModal {
    fn drop(&mut self) {
        if self.open {
            self.effects.uninstall();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::data::StaticFetcher;
    use crate::query::QueryConfig;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<&'static str>>>);

    impl ModalEffects for Recorder {
        fn install(&mut self) {
            self.0.lock().push("install");
        }

        fn uninstall(&mut self) {
            self.0.lock().push("uninstall");
        }
    }

    fn post() -> Post {
        Post {
            id: "abc".into(),
            name: "t3_abc".into(),
            title: "A post".into(),
            subreddit: "rust".into(),
            ..Post::default()
        }
    }

    fn client(fetcher: Arc<StaticFetcher>) -> QueryClient {
        QueryClient::new(fetcher, Arc::new(ManualClock::new()), QueryConfig::default())
    }

    const THREAD: &str = r#"[
        {"kind":"Listing","data":{"children":[{"kind":"t3","data":{"id":"abc","name":"t3_abc","title":"A post"}}]}},
        {"kind":"Listing","data":{"children":[{"kind":"t1","data":{"id":"c1","name":"t1_c1","body":"hello","replies":""}}]}}
    ]"#;

    #[test]
    fn closed_modal_never_requests_comments() {
        let fetcher = Arc::new(StaticFetcher::new());
        let client = client(fetcher.clone());
        let modal = PostModal::new(&client, post(), Box::new(Recorder::default()));
        client.pump(Duration::from_millis(50));
        assert_eq!(fetcher.calls(), 0);
        assert!(matches!(modal.comments_view(0), CommentsView::Hidden));
    }

    #[test]
    fn opening_fetches_and_renders_thread() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond("/r/rust/comments/abc.json", THREAD);
        let client = client(fetcher.clone());
        let mut modal = PostModal::new(&client, post(), Box::new(Recorder::default()));

        modal.open();
        modal.comments().settle(Duration::from_secs(5));
        let CommentsView::Loaded(thread) = modal.comments_view(0) else {
            panic!("expected loaded comments");
        };
        assert_eq!(thread.nodes().len(), 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn failure_is_scoped_to_comment_section() {
        let fetcher = Arc::new(StaticFetcher::new());
        let client = client(fetcher.clone());
        let mut modal = PostModal::new(&client, post(), Box::new(Recorder::default()));

        modal.open();
        modal.comments().settle(Duration::from_secs(5));
        let CommentsView::Failed { message, error } = modal.comments_view(0) else {
            panic!("expected failure");
        };
        assert_eq!(message, COMMENTS_FAILED);
        assert_eq!(error.status(), Some(404));
        assert!(modal.is_open());
        assert_eq!(modal.post().title, "A post");
    }

    #[test]
    fn effects_are_paired_on_close_escape_and_drop() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond("/r/rust/comments/abc.json", THREAD);
        let client = client(fetcher);
        let recorder = Recorder::default();
        let mut modal = PostModal::new(&client, post(), Box::new(recorder.clone()));

        modal.open();
        modal.open();
        modal.close();
        modal.close();
        assert_eq!(*recorder.0.lock(), ["install", "uninstall"]);

        modal.open();
        assert!(!modal.handle_key(KeyCode::Enter));
        assert!(modal.handle_key(KeyCode::Esc));
        assert!(!modal.is_open());

        modal.open();
        drop(modal);
        assert_eq!(
            *recorder.0.lock(),
            ["install", "uninstall", "install", "uninstall", "install", "uninstall"]
        );
    }

    #[test]
    fn dropping_closed_modal_installs_nothing() {
        let fetcher = Arc::new(StaticFetcher::new());
        let client = client(fetcher);
        let recorder = Recorder::default();
        drop(PostModal::new(&client, post(), Box::new(recorder.clone())));
        assert!(recorder.0.lock().is_empty());
    }
}
