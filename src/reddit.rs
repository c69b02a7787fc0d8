use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use anyhow::{bail, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::de::value::MapAccessDeserializer;
use serde::de::{self, DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::FetchError;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com/";

const THUMBNAIL_SENTINELS: [&str; 5] = ["self", "default", "nsfw", "spoiler", "image"];

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingOptions {
    pub after: Option<String>,
    pub before: Option<String>,
    pub limit: Option<u32>,
    pub extra: Vec<(String, String)>,
}

impl ListingOptions {
    pub fn into_params(self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(limit) = self.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        if let Some(after) = self.after {
            params.push(("after".into(), after));
        }
        if let Some(before) = self.before {
            params.push(("before".into(), before));
        }
        params.extend(self.extra);
        params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOption {
    #[default]
    Hot,
    New,
    Top,
    Rising,
}

impl SortOption {
    pub const ALL: [SortOption; 4] = [
        SortOption::Hot,
        SortOption::New,
        SortOption::Top,
        SortOption::Rising,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOption::Hot => "hot",
            SortOption::New => "new",
            SortOption::Top => "top",
            SortOption::Rising => "rising",
        }
    }
}

impl fmt::Display for SortOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOption {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SortOption::ALL
            .into_iter()
            .find(|sort| sort.as_str() == value.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown sort {value:?} (expected hot, new, top or rising)"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub const ALL: [TimeFilter; 6] = [
        TimeFilter::Hour,
        TimeFilter::Day,
        TimeFilter::Week,
        TimeFilter::Month,
        TimeFilter::Year,
        TimeFilter::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TimeFilter::ALL
            .into_iter()
            .find(|filter| filter.as_str() == value.trim().to_ascii_lowercase())
            .ok_or_else(|| {
                format!("unknown time filter {value:?} (expected hour, day, week, month, year or all)")
            })
    }
}

/// Blocking client for the public, unauthenticated JSON endpoints.
pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("reddit client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn url_for(&self, path: &str, params: &[(String, String)]) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| FetchError::Transport(format!("invalid request url: {err}")))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    pub fn get(&self, path: &str, params: &[(String, String)]) -> Result<String, FetchError> {
        let url = self.url_for(path, params)?;
        let resp = self
            .http
            .get(url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(FetchError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Page of things in server order; `after`/`before` are `None` at either end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing<T = Thing> {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default = "Vec::new")]
    pub children: Vec<T>,
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self {
            after: None,
            before: None,
            children: Vec::new(),
        }
    }
}

impl<T> Listing<T> {
    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<Listing<U>, E> {
        let children = self
            .children
            .into_iter()
            .map(&mut f)
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Listing {
            after: self.after,
            before: self.before,
            children,
        })
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// The `{kind, data}` envelope, closed over the kinds this client reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Thing {
    #[serde(rename = "t1")]
    Comment(Comment),
    #[serde(rename = "t3")]
    Post(Post),
    #[serde(rename = "more")]
    More(More),
    #[serde(rename = "Listing")]
    Listing(Listing),
}

impl Thing {
    pub fn kind(&self) -> &'static str {
        match self {
            Thing::Comment(_) => "t1",
            Thing::Post(_) => "t3",
            Thing::More(_) => "more",
            Thing::Listing(_) => "Listing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub selftext: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub subreddit_name_prefixed: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub over_18: bool,
}

impl Post {
    pub fn created_at(&self) -> Option<SystemTime> {
        if self.created_utc == 0.0 {
            return None;
        }
        let secs = self.created_utc.trunc() as u64;
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Thumbnail URL when it points at an actual image rather than a
    /// placeholder keyword.
    pub fn displayable_thumbnail(&self) -> Option<&str> {
        let thumb = self.thumbnail.trim();
        if thumb.is_empty() || THUMBNAIL_SENTINELS.contains(&thumb) {
            return None;
        }
        match Url::parse(thumb) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(thumb),
            _ => None,
        }
    }

    pub fn self_text(&self) -> Option<&str> {
        self.selftext
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub depth: i64,
    #[serde(default)]
    pub is_submitter: bool,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub score_hidden: bool,
    #[serde(default)]
    pub collapsed: bool,
    /// `""` on the wire when there are no replies.
    #[serde(
        default,
        deserialize_with = "deserialize_replies",
        serialize_with = "serialize_replies"
    )]
    pub replies: Option<Listing>,
}

fn deserialize_replies<'de, D>(deserializer: D) -> Result<Option<Listing>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(RepliesVisitor)
}

/// Reads `replies` straight from the input, without buffering the subtree,
/// so nesting depth is bounded only by the decoder's stack handling.
struct RepliesVisitor;

impl<'de> Visitor<'de> for RepliesVisitor {
    type Value = Option<Listing>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an empty string or a Listing")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }

    fn visit_str<E: de::Error>(self, text: &str) -> Result<Self::Value, E> {
        if text.is_empty() {
            Ok(None)
        } else {
            Err(E::custom(format!(
                "replies must be empty or a Listing, got string {text:?}"
            )))
        }
    }

    fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        match Thing::deserialize(MapAccessDeserializer::new(map))? {
            Thing::Listing(listing) => Ok(Some(listing)),
            other => Err(de::Error::custom(format!(
                "replies must be a Listing, got kind {}",
                other.kind()
            ))),
        }
    }
}

fn serialize_replies<S>(replies: &Option<Listing>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    #[derive(Serialize)]
    struct Envelope<'a> {
        kind: &'static str,
        data: &'a Listing,
    }

    match replies {
        None => serializer.serialize_str(""),
        Some(listing) => Envelope {
            kind: "Listing",
            data: listing,
        }
        .serialize(serializer),
    }
}

impl Comment {
    /// Copy of this comment with its reply subtree left behind.
    pub fn without_replies(&self) -> Comment {
        Comment {
            id: self.id.clone(),
            name: self.name.clone(),
            parent_id: self.parent_id.clone(),
            body: self.body.clone(),
            author: self.author.clone(),
            score: self.score,
            created_utc: self.created_utc,
            depth: self.depth,
            is_submitter: self.is_submitter,
            stickied: self.stickied,
            score_hidden: self.score_hidden,
            collapsed: self.collapsed,
            replies: None,
        }
    }
}

impl Drop for Comment {
    // Flattens the reply subtree so arbitrarily deep threads drop in a loop.
    fn drop(&mut self) {
        let Some(replies) = self.replies.take() else {
            return;
        };
        let mut pending = replies.children;
        while let Some(thing) = pending.pop() {
            match thing {
                Thing::Comment(mut comment) => {
                    if let Some(replies) = comment.replies.take() {
                        pending.extend(replies.children);
                    }
                }
                Thing::Listing(listing) => pending.extend(listing.children),
                Thing::Post(_) | Thing::More(_) => {}
            }
        }
    }
}

/// Elided subtree marker. Terminal: its ids are never resolved here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct More {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub depth: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostComments {
    pub post: Post,
    pub comments: Listing,
}

/// Parses a JSON body with no nesting limit; deep input grows the stack on
/// the heap instead of overflowing it.
fn from_json<T: DeserializeOwned>(body: &str) -> Result<T, FetchError> {
    let mut json = serde_json::Deserializer::from_str(body);
    json.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut json))?;
    json.end()?;
    Ok(value)
}

pub fn decode_listing(body: &str) -> Result<Listing, FetchError> {
    match from_json::<Thing>(body)? {
        Thing::Listing(listing) => Ok(listing),
        other => Err(FetchError::Malformed(format!(
            "expected a Listing, got kind {}",
            other.kind()
        ))),
    }
}

pub fn decode_post_listing(body: &str) -> Result<Listing<Post>, FetchError> {
    decode_listing(body)?.try_map(|thing| match thing {
        Thing::Post(post) => Ok(post),
        other => Err(FetchError::Malformed(format!(
            "post listing contains kind {}",
            other.kind()
        ))),
    })
}

/// Decodes the `[post listing, comment listing]` pair served for a thread.
pub fn decode_post_comments(body: &str) -> Result<PostComments, FetchError> {
    let payload: Vec<Thing> = from_json(body)?;
    let mut parts = payload.into_iter();
    let (Some(Thing::Listing(post_listing)), Some(Thing::Listing(comments)), None) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(FetchError::Malformed(
            "comments payload must be exactly two listings".into(),
        ));
    };
    let post = match post_listing.children.into_iter().next() {
        Some(Thing::Post(post)) => post,
        Some(other) => {
            return Err(FetchError::Malformed(format!(
                "post listing starts with kind {}",
                other.kind()
            )))
        }
        None => return Err(FetchError::Malformed("post listing empty".into())),
    };
    Ok(PostComments { post, comments })
}
