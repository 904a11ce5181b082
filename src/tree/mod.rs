//! Flat comment rows to a nested reply forest.
//!
//! Rows are linked by `parent_id` only. The builder indexes them by id, hangs
//! every row under its parent when the parent is part of the same input, and
//! promotes everything else to a root. Input order is kept everywhere.

use std::collections::HashMap;

use crate::models::{Comment, CommentNode};

/// Builds the reply forest for one article's comments.
///
/// Rows whose parent is missing from `comments` (or that point at
/// themselves) become roots. Rows caught in a parent cycle are unreachable
/// from any root, so the earliest row of each cycle is promoted instead.
/// Every input row appears exactly once in the output.
pub fn build_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    let len = comments.len();

    let mut index: HashMap<i64, usize> = HashMap::with_capacity(len);
    for (position, comment) in comments.iter().enumerate() {
        index.entry(comment.id).or_insert(position);
    }

    let mut parent_of: Vec<Option<usize>> = vec![None; len];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); len];
    let mut roots = Vec::new();
    for (position, comment) in comments.iter().enumerate() {
        let parent = comment
            .parent_id
            .and_then(|parent_id| index.get(&parent_id).copied())
            .filter(|&parent| parent != position);

        match parent {
            Some(parent) => {
                parent_of[position] = Some(parent);
                children[parent].push(position);
            }
            None => roots.push(position),
        }
    }

    let mut reachable = vec![false; len];
    for &root in &roots {
        mark_reachable(root, &children, &mut reachable);
    }
    for position in 0..len {
        if reachable[position] {
            continue;
        }
        if let Some(parent) = parent_of[position].take() {
            children[parent].retain(|&child| child != position);
        }
        roots.push(position);
        mark_reachable(position, &children, &mut reachable);
    }
    roots.sort_unstable();

    assemble(comments, &roots, &children)
}

/// Total number of comments in a forest, replies included.
pub fn count_comments(forest: &[CommentNode]) -> usize {
    forest.iter().map(|node| 1 + node.reply_count()).sum()
}

/// Depth-first search for a node by id.
pub fn find_node(forest: &[CommentNode], id: i64) -> Option<&CommentNode> {
    let mut stack: Vec<&CommentNode> = forest.iter().collect();
    while let Some(node) = stack.pop() {
        if node.id() == id {
            return Some(node);
        }
        stack.extend(node.replies.iter());
    }
    None
}

/// Depth of the node with `id`, roots being depth 0.
pub fn depth_of(forest: &[CommentNode], id: i64) -> Option<usize> {
    let mut stack: Vec<(&CommentNode, usize)> = forest.iter().map(|node| (node, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        if node.id() == id {
            return Some(depth);
        }
        stack.extend(node.replies.iter().map(|reply| (reply, depth + 1)));
    }
    None
}

fn mark_reachable(start: usize, children: &[Vec<usize>], reachable: &mut [bool]) {
    let mut stack = vec![start];
    while let Some(position) = stack.pop() {
        if reachable[position] {
            continue;
        }
        reachable[position] = true;
        stack.extend(children[position].iter().copied());
    }
}

// Builds nodes bottom-up in post-order so deep chains never recurse.
fn assemble(comments: Vec<Comment>, roots: &[usize], children: &[Vec<usize>]) -> Vec<CommentNode> {
    let mut slots: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = vec![None; slots.len()];

    let mut post_order = Vec::with_capacity(slots.len());
    let mut stack: Vec<(usize, bool)> = roots.iter().rev().map(|&root| (root, false)).collect();
    while let Some((position, expanded)) = stack.pop() {
        if expanded {
            post_order.push(position);
            continue;
        }
        stack.push((position, true));
        stack.extend(children[position].iter().rev().map(|&child| (child, false)));
    }

    for position in post_order {
        let Some(comment) = slots[position].take() else {
            continue;
        };
        let replies = children[position]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        built[position] = Some(CommentNode { comment, replies });
    }

    roots
        .iter()
        .filter_map(|&root| built[root].take())
        .collect()
}
