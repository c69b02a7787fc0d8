use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::clock::Clock;
use crate::debounce::Debouncer;
use crate::endpoints::SearchPosts;
use crate::query::{QueryClient, QueryOptions, QueryState, Subscription};
use crate::reddit::{Listing, Post};

pub const DEFAULT_MIN_CHARS: usize = 3;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

pub enum SearchStatus {
    Idle,
    NeedsMoreCharacters { min: usize },
    Query(QueryState<Listing<Post>>),
}

impl SearchStatus {
    pub fn hint(&self) -> Option<String> {
        match self {
            SearchStatus::NeedsMoreCharacters { min } => {
                Some(format!("Type at least {min} characters to search"))
            }
            _ => None,
        }
    }
}

/// Search box coordinator: raw keystrokes go through a debouncer, and the
/// search query only runs once the settled term is long enough.
pub struct SearchController {
    input: String,
    min_chars: usize,
    debounced: Debouncer<String>,
    subscription: Subscription<SearchPosts>,
}

impl SearchController {
    pub fn new(
        client: &QueryClient,
        clock: Arc<dyn Clock>,
        delay: Duration,
        min_chars: usize,
    ) -> Self {
        Self {
            input: String::new(),
            min_chars,
            debounced: Debouncer::new(String::new(), delay, clock),
            subscription: client.subscribe(SearchPosts(String::new()), QueryOptions::skip(true)),
        }
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
        self.debounced.set(self.input.clone());
    }

    pub fn clear(&mut self) {
        self.set_input(String::new());
    }

    /// Applies the debounced term if its delay has elapsed. Returns whether
    /// the query arguments changed.
    pub fn tick(&mut self) -> bool {
        if !self.debounced.poll() {
            return false;
        }
        let term = self.debounced.value().clone();
        let skip = term.chars().count() < self.min_chars;
        debug!("search term settled on {term:?} (skip={skip})");
        self.subscription
            .update(SearchPosts(term), QueryOptions::skip(skip));
        true
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn term(&self) -> &str {
        self.debounced.value()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debounced.deadline()
    }

    pub fn refetch(&self) -> bool {
        self.subscription.refetch()
    }

    pub fn subscription(&self) -> &Subscription<SearchPosts> {
        &self.subscription
    }

    pub fn status(&self) -> SearchStatus {
        let typed = self.input.chars().count();
        if typed == 0 {
            SearchStatus::Idle
        } else if typed < self.min_chars {
            SearchStatus::NeedsMoreCharacters {
                min: self.min_chars,
            }
        } else {
            SearchStatus::Query(self.subscription.state())
        }
    }
}
