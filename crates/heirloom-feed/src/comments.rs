use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use heirloom_types::models::{Comment, CommentNode};

pub const MAX_COMMENT_LEN: usize = 2000;

/// Shapes a story's flat comment list into threads: top-level comments with
/// their replies one level below.
///
/// Replies may arrive before their parents. A comment is a thread root when it has no
/// parent, its parent is not in `comments` (e.g. deleted), it names itself as
/// parent, or its parent chain loops. Any other comment joins the thread of
/// the root its chain reaches, so replies to replies flatten into the thread.
/// Roots and replies keep the relative order they had in `comments`.
pub fn build_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    let parents: HashMap<Uuid, Option<Uuid>> =
        comments.iter().map(|c| (c.id, c.parent_id)).collect();

    let mut roots: Vec<CommentNode> = Vec::new();
    let mut replies: HashMap<Uuid, Vec<Comment>> = HashMap::new();

    for comment in comments {
        match thread_root(&parents, comment.id) {
            Some(root) if root != comment.id => replies.entry(root).or_default().push(comment),
            _ => roots.push(CommentNode {
                comment,
                replies: Vec::new(),
            }),
        }
    }

    for node in &mut roots {
        if let Some(thread) = replies.remove(&node.comment.id) {
            node.replies = thread;
        }
    }
    roots
}

/// Follows parent links from `id`. `None` means the chain loops.
fn thread_root(parents: &HashMap<Uuid, Option<Uuid>>, id: Uuid) -> Option<Uuid> {
    let mut seen = HashSet::new();
    let mut current = id;
    loop {
        if !seen.insert(current) {
            return None;
        }
        match parents.get(&current).copied().flatten() {
            Some(parent) if parent != current && parents.contains_key(&parent) => current = parent,
            _ => return Some(current),
        }
    }
}

/// Number of comments held by a tree.
pub fn count(tree: &[CommentNode]) -> usize {
    tree.iter().map(|n| 1 + n.replies.len()).sum()
}

/// Removes `comment_id` from a built tree. Direct replies of the removed
/// comment lose their parent and become thread roots, matching how the store
/// handles a deleted parent. Returns `None` when the id is not in the tree.
pub fn detach(tree: Vec<CommentNode>, comment_id: Uuid) -> Option<Vec<CommentNode>> {
    let mut flat: Vec<Comment> = Vec::with_capacity(count(&tree));
    for node in tree {
        flat.push(node.comment);
        flat.extend(node.replies);
    }

    let before = flat.len();
    flat.retain(|c| c.id != comment_id);
    if flat.len() == before {
        return None;
    }
    for c in &mut flat {
        if c.parent_id == Some(comment_id) {
            c.parent_id = None;
        }
    }
    Some(build_tree(flat))
}
