mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;

use support::{listing, post_json, FakeReddit};

#[test]
fn prints_version() {
    Command::cargo_bin("reddit-lens")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::cargo_bin("reddit-lens")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("posts"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("comments"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn invalid_subreddit_is_rejected_before_any_request() {
    let reddit = FakeReddit::start(vec![]);
    reddit
        .command()
        .args(["posts", "-s", "rust-lang!"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Invalid subreddit name. Use only letters, numbers, and underscores.",
        ));
    assert!(reddit.hits().is_empty());
}

#[test]
fn short_search_is_rejected_before_any_request() {
    let reddit = FakeReddit::start(vec![]);
    reddit
        .command()
        .args(["search", "re"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Type at least 3 characters to search"));
    assert!(reddit.hits().is_empty());
}

#[test]
fn lists_posts_for_subreddit() {
    let body = listing(
        vec![
            post_json("a1", "Hooks in depth", "reactjs"),
            post_json("a2", "Server components", "reactjs"),
        ],
        Some("t3_a2"),
    );
    let reddit = FakeReddit::start(vec![("/r/reactjs/hot.json", 200, body)]);
    reddit
        .command()
        .args(["posts", "-s", "r/ReactJS"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. Hooks in depth"))
        .stdout(predicate::str::contains("2. Server components"))
        .stdout(predicate::str::contains("r/reactjs • by ferris • 1.5k points"))
        .stdout(predicate::str::contains("Showing 2 posts from r/reactjs"))
        .stdout(predicate::str::contains("next page: --after t3_a2"));

    let hits = reddit.hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0], "/r/reactjs/hot.json?limit=25");
}

#[test]
fn top_listing_carries_time_filter() {
    let body = listing(vec![post_json("b1", "Best of week", "rust")], None);
    let reddit = FakeReddit::start(vec![("/r/rust/top.json", 200, body)]);
    reddit
        .command()
        .args(["posts", "-s", "rust", "--sort", "top", "--time", "week", "--limit", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Best of week"));
    assert_eq!(reddit.hits(), ["/r/rust/top.json?limit=5&t=week"]);
}

#[test]
fn shared_link_selects_subreddit() {
    let body = listing(vec![post_json("c1", "From a link", "golang")], None);
    let reddit = FakeReddit::start(vec![("/r/golang/hot.json", 200, body)]);
    reddit
        .command()
        .args(["posts", "--link", "https://share.example/?subreddit=golang"])
        .assert()
        .success()
        .stdout(predicate::str::contains("From a link"))
        .stdout(predicate::str::contains(
            "share: https://share.example/?subreddit=golang",
        ));
}

#[test]
fn empty_listing_shows_empty_state() {
    let reddit = FakeReddit::start(vec![("/r/quiet/hot.json", 200, listing(vec![], None))]);
    reddit
        .command()
        .args(["posts", "-s", "quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No posts found in r/quiet"));
}

#[test]
fn http_errors_report_status() {
    let reddit = FakeReddit::start(vec![("/r/private/hot.json", 403, "{}".to_string())]);
    reddit
        .command()
        .args(["posts", "-s", "private"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error 403: Failed to fetch posts"));
}

#[test]
fn malformed_payload_is_an_error() {
    let reddit = FakeReddit::start(vec![(
        "/r/odd/hot.json",
        200,
        "<html>not json</html>".to_string(),
    )]);
    reddit
        .command()
        .args(["posts", "-s", "odd"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Something went wrong"))
        .stderr(predicate::str::contains("unexpected payload"));
}

#[test]
fn search_sends_full_term() {
    let body = listing(vec![post_json("d1", "Rust lang news", "rust")], None);
    let reddit = FakeReddit::start(vec![("/search.json", 200, body)]);
    reddit
        .command()
        .args(["search", "rust", "lang"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 results found"))
        .stdout(predicate::str::contains("Rust lang news"));
    assert_eq!(reddit.hits(), ["/search.json?q=rust+lang&limit=25"]);
}

#[test]
fn comments_render_nested_tree_literally() {
    let reply = json!({
        "kind": "t1",
        "data": {
            "id": "c2",
            "name": "t1_c2",
            "parent_id": "t1_c1",
            "body": "<script>alert(1)</script>",
            "author": "op_user",
            "score": 7,
            "created_utc": 1_600_000_000.0,
            "depth": 1,
            "is_submitter": true,
            "stickied": false,
            "replies": {
                "kind": "Listing",
                "data": {"after": null, "before": null, "children": [
                    {"kind": "more", "data": {"count": 4, "children": ["x"], "id": "x", "name": "t1_x", "parent_id": "t1_c2", "depth": 2}}
                ]}
            }
        }
    });
    let top = json!({
        "kind": "t1",
        "data": {
            "id": "c1",
            "name": "t1_c1",
            "parent_id": "t3_p1",
            "body": "Top level",
            "author": "mod",
            "score": 2500,
            "created_utc": 1_600_000_000.0,
            "depth": 0,
            "is_submitter": false,
            "stickied": true,
            "replies": {"kind": "Listing", "data": {"after": null, "before": null, "children": [reply]}}
        }
    });
    let body = json!([
        {"kind": "Listing", "data": {"after": null, "before": null, "children": [post_json("p1", "Thread title", "rust")]}},
        {"kind": "Listing", "data": {"after": null, "before": null, "children": [
            top,
            {"kind": "more", "data": {"count": 9, "children": ["y"], "id": "y", "name": "t1_y", "parent_id": "t3_p1"}}
        ]}}
    ])
    .to_string();
    let reddit = FakeReddit::start(vec![("/r/rust/comments/p1.json", 200, body)]);
    reddit
        .command()
        .args(["comments", "rust", "p1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Thread title"))
        .stdout(predicate::str::contains("12 Comments"))
        .stdout(predicate::str::contains("│ mod • 2.5k points"))
        .stdout(predicate::str::contains("Pinned"))
        .stdout(predicate::str::contains("op_user OP • 7 points"))
        .stdout(predicate::str::contains("│ <script>alert(1)</script>"))
        .stdout(predicate::str::contains("Load 4 more replies..."))
        .stdout(predicate::str::contains("Load 9 more replies...").not());
}

#[test]
fn thread_without_comments_shows_empty_state() {
    let body = json!([
        {"kind": "Listing", "data": {"children": [post_json("p2", "Lonely", "rust")]}},
        {"kind": "Listing", "data": {"children": []}}
    ])
    .to_string();
    let reddit = FakeReddit::start(vec![("/r/rust/comments/p2.json", 200, body)]);
    reddit
        .command()
        .args(["comments", "rust", "p2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No comments yet. Be the first to comment!"));
}

#[test]
fn failed_comments_keep_scoped_message() {
    let reddit = FakeReddit::start(vec![]);
    reddit
        .command()
        .args(["comments", "rust", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load comments"));
}

#[test]
fn unreachable_host_is_a_transport_error() {
    let reddit = FakeReddit::start(vec![]);
    let mut cmd = reddit.command();
    cmd.env("REDDIT_LENS_REDDIT__BASE_URL", "http://127.0.0.1:9/")
        .args(["posts", "-s", "rust"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Something went wrong"))
        .stderr(predicate::str::contains("transport failure"));
}
