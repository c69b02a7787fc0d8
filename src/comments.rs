//! Arena form of a comment thread.
//!
//! The wire shape nests each reply listing inside its parent comment. Here
//! every node lives in one flat `Vec`, linked by index, so building,
//! walking and dropping a thread never recurse on the call stack.

use log::warn;

use crate::reddit::{Comment, Listing, More, Thing};

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Replies are moved into the arena, so `replies` is always `None` here.
    Comment(Comment),
    More(More),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Nesting level, 0 for top-level entries.
    pub depth: usize,
}

impl Node {
    pub fn comment(&self) -> Option<&Comment> {
        match &self.kind {
            NodeKind::Comment(comment) => Some(comment),
            NodeKind::More(_) => None,
        }
    }

    pub fn more(&self) -> Option<&More> {
        match &self.kind {
            NodeKind::More(more) => Some(more),
            NodeKind::Comment(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentTree {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl CommentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a comment listing into the arena, preserving sibling order.
    /// Things other than comments and "more" markers are skipped.
    pub fn from_listing(listing: Listing) -> Self {
        let mut tree = Self::new();
        let mut stack = vec![(None, listing.children.into_iter())];

        loop {
            let Some((parent, things)) = stack.last_mut() else {
                break;
            };
            let parent = *parent;
            let Some(thing) = things.next() else {
                stack.pop();
                continue;
            };
            match thing {
                Thing::Comment(mut comment) => {
                    let replies = comment.replies.take();
                    let id = tree.push_comment(parent, comment);
                    if let Some(replies) = replies {
                        stack.push((Some(id), replies.children.into_iter()));
                    }
                }
                Thing::More(more) => {
                    tree.push_more(parent, more);
                }
                other => warn!("skipping {} inside comment listing", other.kind()),
            }
        }

        tree
    }

    /// Copies a borrowed comment and its replies into a fresh arena, with
    /// the comment as the only root.
    pub fn from_comment(root: &Comment) -> Self {
        let mut tree = Self::new();
        let id = tree.push_comment(None, root.without_replies());
        let mut stack = vec![(id, replies_of(root))];

        loop {
            let Some((parent, things)) = stack.last_mut() else {
                break;
            };
            let parent = *parent;
            let Some(thing) = things.next() else {
                stack.pop();
                continue;
            };
            match thing {
                Thing::Comment(comment) => {
                    let id = tree.push_comment(Some(parent), comment.without_replies());
                    stack.push((id, replies_of(comment)));
                }
                Thing::More(more) => {
                    tree.push_more(Some(parent), more.clone());
                }
                other => warn!("skipping {} inside comment listing", other.kind()),
            }
        }

        tree
    }

    pub fn push_comment(&mut self, parent: Option<NodeId>, mut comment: Comment) -> NodeId {
        comment.replies = None;
        self.push(parent, NodeKind::Comment(comment))
    }

    pub fn push_more(&mut self, parent: Option<NodeId>, more: More) -> NodeId {
        self.push(parent, NodeKind::More(more))
    }

    fn push(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        let depth = match parent.and_then(|p| self.nodes.get(p)) {
            Some(node) => node.depth + 1,
            None => 0,
        };
        let parent = parent.filter(|p| *p < id);
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            depth,
        });
        match parent {
            Some(p) => self.nodes[p].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of real comments, excluding "more" markers.
    pub fn comment_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Comment(_)))
            .count()
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.nodes.iter().map(|node| node.depth).max()
    }

    /// Looks a comment up by fullname (`t1_...`).
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.comment().is_some_and(|c| c.name == name))
    }

    /// Ids from `id` up to its root, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.nodes.get(id).and_then(|node| node.parent);
        while let Some(parent) = cursor {
            out.push(parent);
            cursor = self.nodes[parent].parent;
        }
        out
    }

    /// Count of every node below `id`. Computed bottom-up in one pass.
    pub fn descendant_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.nodes.len()];
        // Children always have larger ids than their parent.
        for id in (0..self.nodes.len()).rev() {
            if let Some(parent) = self.nodes[id].parent {
                counts[parent] += counts[id] + 1;
            }
        }
        counts
    }
}

fn replies_of(comment: &Comment) -> std::slice::Iter<'_, Thing> {
    comment
        .replies
        .as_ref()
        .map(|replies| replies.children.as_slice())
        .unwrap_or_default()
        .iter()
}

impl From<Listing> for CommentTree {
    fn from(listing: Listing) -> Self {
        Self::from_listing(listing)
    }
}
