use std::fmt;

use serde::Serialize;

use crate::data::Request;
use crate::error::FetchError;
use crate::reddit::{self, Listing, Post, PostComments, SortOption, TimeFilter};

pub const DEFAULT_LIMIT: u32 = 25;
pub const SEARCH_LIMIT: u32 = 25;

/// Invalidation label shared by cached reads and the writes that stale them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Posts,
    Comments,
}

/// Operation name plus a stable serialization of its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new<A: Serialize + ?Sized>(operation: &str, args: &A) -> Self {
        // Plain data structs always serialize; "null" keeps the key total.
        let args = serde_json::to_string(args).unwrap_or_else(|_| "null".to_string());
        CacheKey(format!("{operation}({args})"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A declarative read: how to build its request, decode its body, and which
/// tags its cached result carries.
pub trait Endpoint: Serialize + Clone + Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    const NAME: &'static str;

    fn request(&self) -> Request;

    fn decode(body: &str) -> Result<Self::Output, FetchError>;

    fn tags(&self) -> &'static [Tag] {
        &[]
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::new(Self::NAME, self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetPosts {
    pub subreddit: String,
    pub sort: SortOption,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(rename = "t", skip_serializing_if = "Option::is_none")]
    pub time_filter: Option<TimeFilter>,
}

/// Bare subreddit name as it appears in request paths, so equal requests
/// always share a cache key.
fn subreddit_name(raw: &str) -> String {
    raw.trim().trim_start_matches("r/").to_string()
}

impl GetPosts {
    pub fn new(subreddit: impl AsRef<str>) -> Self {
        Self {
            subreddit: subreddit_name(subreddit.as_ref()),
            sort: SortOption::Hot,
            limit: DEFAULT_LIMIT,
            after: None,
            time_filter: None,
        }
    }

    pub fn sort(mut self, sort: SortOption) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    pub fn time_filter(mut self, filter: Option<TimeFilter>) -> Self {
        self.time_filter = filter;
        self
    }
}

impl Endpoint for GetPosts {
    type Output = Listing<Post>;

    const NAME: &'static str = "getPosts";

    fn request(&self) -> Request {
        let options = reddit::ListingOptions {
            after: self.after.clone(),
            limit: Some(self.limit),
            extra: self
                .time_filter
                .map(|filter| vec![("t".to_string(), filter.as_str().to_string())])
                .unwrap_or_default(),
            ..Default::default()
        };
        Request {
            path: format!("/r/{}/{}.json", self.subreddit, self.sort.as_str()),
            params: options.into_params(),
        }
    }

    fn decode(body: &str) -> Result<Self::Output, FetchError> {
        reddit::decode_post_listing(body)
    }

    fn tags(&self) -> &'static [Tag] {
        &[Tag::Posts]
    }
}

/// Site-wide search. Results are never invalidated by tagged writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPosts(pub String);

impl Endpoint for SearchPosts {
    type Output = Listing<Post>;

    const NAME: &'static str = "searchPosts";

    fn request(&self) -> Request {
        Request::new("/search.json")
            .param("q", self.0.clone())
            .param("limit", SEARCH_LIMIT.to_string())
    }

    fn decode(body: &str) -> Result<Self::Output, FetchError> {
        reddit::decode_post_listing(body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetPostComments {
    pub subreddit: String,
    #[serde(rename = "postId")]
    pub post_id: String,
}

impl GetPostComments {
    pub fn new(subreddit: impl AsRef<str>, post_id: impl AsRef<str>) -> Self {
        Self {
            subreddit: subreddit_name(subreddit.as_ref()),
            post_id: post_id.as_ref().trim().to_string(),
        }
    }

    pub fn for_post(post: &Post) -> Self {
        Self::new(&post.subreddit, &post.id)
    }
}

impl Endpoint for GetPostComments {
    type Output = PostComments;

    const NAME: &'static str = "getPostComments";

    fn request(&self) -> Request {
        Request::new(format!("/r/{}/comments/{}.json", self.subreddit, self.post_id))
    }

    fn decode(body: &str) -> Result<Self::Output, FetchError> {
        reddit::decode_post_comments(body)
    }

    fn tags(&self) -> &'static [Tag] {
        &[Tag::Comments]
    }
}
