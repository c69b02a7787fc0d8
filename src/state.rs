use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::endpoints::GetPosts;
use crate::error::ValidationError;
use crate::reddit::{SortOption, TimeFilter};

pub const DEFAULT_SUBREDDIT: &str = "popular";
pub const SUBREDDIT_PARAM: &str = "subreddit";

static SUBREDDIT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").expect("valid subreddit regex"));

/// Normalizes user-typed subreddit input: trims, lower-cases and strips a
/// leading `r/`. Blank input yields `Ok(None)`.
pub fn validate_subreddit(input: &str) -> Result<Option<String>, ValidationError> {
    let lowered = input.trim().to_lowercase();
    let cleaned = lowered.strip_prefix("r/").unwrap_or(&lowered);
    if cleaned.is_empty() {
        return Ok(None);
    }
    if !SUBREDDIT_NAME.is_match(cleaned) {
        return Err(ValidationError::InvalidSubreddit(input.to_string()));
    }
    Ok(Some(cleaned.to_string()))
}

/// Browsing selections. Separate from anything fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiState {
    selected_subreddit: String,
    sort_by: SortOption,
    time_filter: TimeFilter,
}

impl Default for UiState {
    fn default() -> Self {
        Self::new(DEFAULT_SUBREDDIT)
    }
}

impl UiState {
    pub fn new(default_subreddit: impl Into<String>) -> Self {
        Self {
            selected_subreddit: default_subreddit.into(),
            sort_by: SortOption::default(),
            time_filter: TimeFilter::default(),
        }
    }

    pub fn selected_subreddit(&self) -> &str {
        &self.selected_subreddit
    }

    pub fn sort_by(&self) -> SortOption {
        self.sort_by
    }

    pub fn time_filter(&self) -> TimeFilter {
        self.time_filter
    }

    pub fn set_subreddit(&mut self, name: impl Into<String>) {
        self.selected_subreddit = name.into();
    }

    pub fn set_sort_by(&mut self, sort: SortOption) {
        self.sort_by = sort;
    }

    pub fn set_time_filter(&mut self, filter: TimeFilter) {
        self.time_filter = filter;
    }

    /// Validates and applies a custom subreddit typed by the user. Nothing
    /// changes when the input is blank or rejected.
    pub fn submit_subreddit(&mut self, input: &str) -> Result<bool, ValidationError> {
        match validate_subreddit(input)? {
            Some(name) => {
                self.set_subreddit(name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The post listing for the current selection. The time filter only
    /// applies to `top`.
    pub fn posts_query(&self) -> GetPosts {
        let filter = (self.sort_by == SortOption::Top).then_some(self.time_filter);
        GetPosts::new(self.selected_subreddit.clone())
            .sort(self.sort_by)
            .time_filter(filter)
    }

    /// Seeds the store from `?subreddit=`. The URL wins when present.
    pub fn apply_url(&mut self, url: &Url) -> bool {
        let Some(value) = url
            .query_pairs()
            .find(|(key, _)| key == SUBREDDIT_PARAM)
            .map(|(_, value)| value.into_owned())
        else {
            return false;
        };
        match validate_subreddit(&value) {
            Ok(Some(name)) => {
                self.set_subreddit(name);
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!("ignoring subreddit from url {value:?}: {err}");
                false
            }
        }
    }

    /// Writes the selected subreddit back into `url`, keeping other params.
    pub fn write_url(&self, url: &mut Url) {
        let others: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != SUBREDDIT_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &others {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(SUBREDDIT_PARAM, &self.selected_subreddit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::Endpoint;

    #[test]
    fn defaults() {
        let state = UiState::default();
        assert_eq!(state.selected_subreddit(), "popular");
        assert_eq!(state.sort_by(), SortOption::Hot);
        assert_eq!(state.time_filter(), TimeFilter::Day);
    }

    #[test]
    fn setters_replace_only_their_field() {
        let mut state = UiState::default();
        state.set_sort_by(SortOption::Top);
        assert_eq!(state.selected_subreddit(), "popular");
        assert_eq!(state.time_filter(), TimeFilter::Day);
        state.set_time_filter(TimeFilter::Week);
        state.set_subreddit("rust");
        assert_eq!(state.sort_by(), SortOption::Top);
        assert_eq!(state.time_filter(), TimeFilter::Week);
        assert_eq!(state.selected_subreddit(), "rust");
    }

    #[test]
    fn subreddit_input_is_normalized() {
        assert_eq!(validate_subreddit("  r/RustLang "), Ok(Some("rustlang".into())));
        assert_eq!(validate_subreddit("ask_science2"), Ok(Some("ask_science2".into())));
        assert_eq!(validate_subreddit("   "), Ok(None));
        assert_eq!(validate_subreddit("r/"), Ok(None));
        let err = validate_subreddit("rust-lang").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid subreddit name. Use only letters, numbers, and underscores."
        );
        assert!(validate_subreddit("r/a b").is_err());
    }

    #[test]
    fn rejected_input_leaves_state_untouched() {
        let mut state = UiState::default();
        assert!(state.submit_subreddit("no spaces").is_err());
        assert_eq!(state.submit_subreddit(""), Ok(false));
        assert_eq!(state.selected_subreddit(), "popular");
        assert_eq!(state.submit_subreddit("R/Rust"), Ok(true));
        assert_eq!(state.selected_subreddit(), "rust");
    }

    #[test]
    fn url_parameter_wins_on_load() {
        let mut state = UiState::new("popular");
        let url = Url::parse("https://app.local/?sort=new&subreddit=reactjs").unwrap();
        assert!(state.apply_url(&url));
        assert_eq!(state.selected_subreddit(), "reactjs");

        let bad = Url::parse("https://app.local/?subreddit=%3Cscript%3E").unwrap();
        assert!(!state.apply_url(&bad));
        assert!(!state.apply_url(&Url::parse("https://app.local/").unwrap()));
        assert_eq!(state.selected_subreddit(), "reactjs");
    }

    #[test]
    fn selection_is_written_back_to_url() {
        let mut state = UiState::default();
        state.set_subreddit("rust");
        let mut url = Url::parse("https://app.local/?subreddit=old&page=2").unwrap();
        state.write_url(&mut url);
        assert_eq!(url.query(), Some("page=2&subreddit=rust"));

        let mut reloaded = UiState::default();
        assert!(reloaded.apply_url(&url));
        assert_eq!(reloaded, state);
    }

    #[test]
    fn posts_query_follows_selection() {
        let mut state = UiState::default();
        state.set_subreddit("reactjs");
        assert_eq!(
            state.posts_query().cache_key().as_str(),
            r#"getPosts({"subreddit":"reactjs","sort":"hot","limit":25})"#
        );
        state.set_sort_by(SortOption::Top);
        state.set_time_filter(TimeFilter::Week);
        assert_eq!(state.posts_query().time_filter, Some(TimeFilter::Week));
    }
}
