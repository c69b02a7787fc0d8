use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use textwrap::{wrap, Options as WrapOptions};

use crate::comments::{CommentTree, NodeId, NodeKind};
use crate::error::FetchError;
use crate::format::{format_age, format_score};
use crate::reddit::{Comment, Post};

pub const EMPTY_COMMENTS: &str = "No comments yet. Be the first to comment!";

/// Gutter colours, cycled by nesting depth.
pub const PALETTE: [Color; 6] = [
    Color::LightRed,
    Color::Blue,
    Color::Green,
    Color::Yellow,
    Color::Magenta,
    Color::LightMagenta,
];

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedComment {
    pub name: String,
    pub depth: usize,
    pub palette_index: usize,
    pub author: String,
    pub is_op: bool,
    pub pinned: bool,
    pub score: String,
    pub age: String,
    /// Verbatim body. Never parsed as markup.
    pub body: String,
    pub descendant_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderedNode {
    Comment(RenderedComment),
    LoadMore { depth: usize, count: u64 },
}

impl RenderedNode {
    pub fn depth(&self) -> usize {
        match self {
            RenderedNode::Comment(comment) => comment.depth,
            RenderedNode::LoadMore { depth, .. } => *depth,
        }
    }
}

pub fn load_more_label(count: u64) -> String {
    format!("Load {count} more replies...")
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderedThread {
    Empty,
    Nodes(Vec<RenderedNode>),
}

impl RenderedThread {
    pub fn nodes(&self) -> &[RenderedNode] {
        match self {
            RenderedThread::Empty => &[],
            RenderedThread::Nodes(nodes) => nodes,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RenderedThread::Empty)
    }
}

/// Renders a post's top-level comments. "More" markers at the root are
/// dropped; nested ones become load-more leaves.
pub fn render_thread(tree: &CommentTree, now: i64) -> RenderedThread {
    let roots: Vec<NodeId> = tree
        .roots()
        .iter()
        .copied()
        .filter(|id| tree.get(*id).is_some_and(|node| node.comment().is_some()))
        .collect();
    if roots.is_empty() {
        return RenderedThread::Empty;
    }
    RenderedThread::Nodes(render_nodes(tree, &roots, 0, now))
}

/// Renders one wire comment and all of its replies, starting at `depth`.
pub fn render_comment(comment: &Comment, depth: usize, now: i64) -> Vec<RenderedNode> {
    let tree = CommentTree::from_comment(comment);
    render_nodes(&tree, tree.roots(), depth, now)
}

/// Pre-order walk with an explicit stack; output order matches the nested
/// layout top to bottom.
pub fn render_nodes(
    tree: &CommentTree,
    start: &[NodeId],
    base_depth: usize,
    now: i64,
) -> Vec<RenderedNode> {
    let counts = tree.descendant_counts();
    let mut out = Vec::new();
    let mut stack: Vec<(NodeId, usize)> = start.iter().rev().map(|id| (*id, base_depth)).collect();

    while let Some((id, depth)) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        match &node.kind {
            NodeKind::More(more) => out.push(RenderedNode::LoadMore {
                depth,
                count: more.count,
            }),
            NodeKind::Comment(comment) => {
                out.push(RenderedNode::Comment(rendered_comment(
                    comment,
                    depth,
                    counts.get(id).copied().unwrap_or(0),
                    now,
                )));
                stack.extend(node.children.iter().rev().map(|child| (*child, depth + 1)));
            }
        }
    }
    out
}

fn rendered_comment(comment: &Comment, depth: usize, descendants: usize, now: i64) -> RenderedComment {
    let author = if comment.author.trim().is_empty() {
        "[deleted]".to_string()
    } else {
        comment.author.clone()
    };
    RenderedComment {
        name: comment.name.clone(),
        depth,
        palette_index: depth % PALETTE.len(),
        author,
        is_op: comment.is_submitter,
        pinned: comment.stickied,
        score: format_score(comment.score),
        age: format_age(comment.created_utc, now),
        body: comment.body.clone(),
        descendant_count: descendants,
    }
}

/// Styles rendered nodes as terminal text, wrapping bodies to `width`.
pub fn to_text(nodes: &[RenderedNode], width: usize) -> Text<'static> {
    let meta = Style::default().fg(Color::DarkGray);
    let max_indent = width / 2;
    let mut lines = Vec::new();

    for node in nodes {
        let depth = node.depth();
        let indent = " ".repeat((depth * 2).min(max_indent));
        let gutter = Style::default().fg(PALETTE[depth % PALETTE.len()]);
        match node {
            RenderedNode::LoadMore { count, .. } => {
                lines.push(Line::from(vec![
                    Span::raw(indent.clone()),
                    Span::styled(
                        load_more_label(*count),
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::UNDERLINED),
                    ),
                ]));
            }
            RenderedNode::Comment(comment) => {
                let author_style = if comment.is_op {
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().add_modifier(Modifier::BOLD)
                };
                let mut header = vec![
                    Span::raw(indent.clone()),
                    Span::styled("│ ", gutter),
                    Span::styled(comment.author.clone(), author_style),
                ];
                if comment.is_op {
                    header.push(Span::styled(
                        " OP",
                        Style::default().fg(Color::Black).bg(Color::Cyan),
                    ));
                }
                header.push(Span::styled(
                    format!(" • {} points • {}", comment.score, comment.age),
                    meta,
                ));
                if comment.pinned {
                    header.push(Span::styled(" • Pinned", Style::default().fg(Color::Green)));
                }
                lines.push(Line::from(header));

                let body_width = width.saturating_sub(indent.len() + 2).max(20);
                for paragraph in comment.body.split('\n') {
                    let wrapped = if paragraph.is_empty() {
                        vec![String::new()]
                    } else {
                        wrap(paragraph, WrapOptions::new(body_width).break_words(true))
                            .into_iter()
                            .map(|cow| cow.into_owned())
                            .collect()
                    };
                    for text in wrapped {
                        lines.push(Line::from(vec![
                            Span::raw(indent.clone()),
                            Span::styled("│ ", gutter),
                            Span::raw(text),
                        ]));
                    }
                }
            }
        }
    }
    Text::from(lines)
}

pub fn thread_text(thread: &RenderedThread, width: usize) -> Text<'static> {
    match thread {
        RenderedThread::Empty => Text::from(Line::from(Span::styled(
            EMPTY_COMMENTS,
            Style::default().fg(Color::DarkGray),
        ))),
        RenderedThread::Nodes(nodes) => to_text(nodes, width),
    }
}

/// `r/{sub} • by {author} • {score} points • {age} • {n} comments`
pub fn post_meta_line(post: &Post, now: i64) -> String {
    let subreddit = if post.subreddit_name_prefixed.is_empty() {
        format!("r/{}", post.subreddit)
    } else {
        post.subreddit_name_prefixed.clone()
    };
    format!(
        "{subreddit} • by {} • {} points • {} • {} comments",
        post.author,
        format_score(post.score),
        format_age(post.created_utc, now),
        post.num_comments
    )
}

pub fn posts_error_message(error: &FetchError) -> String {
    match error.status() {
        Some(status) => format!("Error {status}: Failed to fetch posts"),
        None => "Something went wrong. Please try again.".to_string(),
    }
}

pub fn no_posts_message(subreddit: &str) -> String {
    format!("No posts found in r/{subreddit}")
}

pub fn no_results_message(term: &str) -> String {
    format!("No results found for \"{term}\"")
}

/// Numbered post list: title line, metadata line, optional thumbnail link.
pub fn posts_text(posts: &[Post], width: usize, now: i64) -> Text<'static> {
    let meta = Style::default().fg(Color::DarkGray);
    let mut lines = Vec::new();
    for (index, post) in posts.iter().enumerate() {
        let number = format!("{:>3}. ", index + 1);
        let pad = " ".repeat(number.len());
        let title_width = width.saturating_sub(number.len()).max(20);
        let options = WrapOptions::new(title_width).break_words(true);
        for (line_no, segment) in wrap(&post.title, options).into_iter().enumerate() {
            let lead = if line_no == 0 { number.clone() } else { pad.clone() };
            let mut spans = vec![
                Span::styled(lead, meta),
                Span::styled(segment.into_owned(), Style::default().add_modifier(Modifier::BOLD)),
            ];
            if line_no == 0 && post.over_18 {
                spans.push(Span::styled(" NSFW", Style::default().fg(Color::Red)));
            }
            lines.push(Line::from(spans));
        }
        lines.push(Line::from(vec![
            Span::raw(pad.clone()),
            Span::styled(post_meta_line(post, now), meta),
        ]));
        if let Some(thumb) = post.displayable_thumbnail() {
            lines.push(Line::from(vec![
                Span::raw(pad.clone()),
                Span::styled(thumb.to_string(), Style::default().fg(Color::Blue)),
            ]));
        }
        lines.push(Line::default());
    }
    Text::from(lines)
}
