//! File Tree Model
//!
//! The client never patches the tree: every reload replaces it wholesale and
//! presentation state (`is_open`) is re-derived from the session by path.

use hollow_types::{FileNode, FileTree, SessionState};
use std::collections::HashSet;

/// Icon/type class of a node, derived from `is_dir` and the extension only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Markdown,
    Script,
    Style,
    Data,
    Image,
    Text,
    Other,
}

impl FileKind {
    pub fn of(node: &FileNode) -> Self {
        if node.is_dir {
            return FileKind::Directory;
        }
        match node.extension().as_deref() {
            Some("md" | "mdx" | "markdown") => FileKind::Markdown,
            Some("js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs") => FileKind::Script,
            Some("css" | "scss" | "less") => FileKind::Style,
            Some("json" | "yaml" | "yml" | "toml") => FileKind::Data,
            Some("png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "ico") => FileKind::Image,
            Some("txt" | "html" | "htm") => FileKind::Text,
            _ => FileKind::Other,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            FileKind::Directory => "▸",
            FileKind::Markdown => "M",
            FileKind::Script => "S",
            FileKind::Style => "C",
            FileKind::Data => "D",
            FileKind::Image => "I",
            FileKind::Text => "T",
            FileKind::Other => "·",
        }
    }
}

/// How a node should be displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeView {
    pub modified: bool,
    pub active: bool,
    pub open: bool,
    pub kind: FileKind,
}

pub fn node_view(node: &FileNode, session: &SessionState) -> NodeView {
    NodeView {
        modified: session.is_modified(&node.path),
        active: session.is_current(&node.path),
        open: node.is_dir && node.is_open,
        kind: FileKind::of(node),
    }
}

/// Re-derive `is_open` on a freshly fetched tree.
///
/// Exactly the directories whose path is listed in `opened_dir` end up open;
/// all other nodes are closed.
pub fn reconcile(mut tree: FileTree, session: &SessionState) -> FileTree {
    let open: HashSet<&str> = session.open_dir_paths().into_iter().collect();
    apply_open(&mut tree, &open);
    tree
}

fn apply_open(tree: &mut FileTree, open: &HashSet<&str>) {
    tree.node.is_open = tree.node.is_dir && open.contains(tree.node.path.as_str());
    for item in &mut tree.items {
        apply_open(item, open);
    }
}

/// Paths of all non-directory nodes, in presentation order
pub fn flatten_files(tree: &FileTree) -> Vec<String> {
    let mut out = Vec::new();
    collect_files(tree, &mut out);
    out
}

fn collect_files(tree: &FileTree, out: &mut Vec<String>) {
    if !tree.node.is_dir {
        out.push(tree.node.path.clone());
        return;
    }
    for item in &tree.items {
        collect_files(item, out);
    }
}

pub fn find<'a>(tree: &'a FileTree, path: &str) -> Option<&'a FileTree> {
    if tree.node.path == path {
        return Some(tree);
    }
    tree.items.iter().find_map(|item| find(item, path))
}

/// Directories that contain `path`, outermost first, excluding the root
pub fn ancestors<'a>(tree: &'a FileTree, path: &str) -> Vec<&'a FileNode> {
    fn walk<'a>(tree: &'a FileTree, path: &str, trail: &mut Vec<&'a FileNode>) -> bool {
        if tree.node.path == path {
            return true;
        }
        for item in tree.items.iter().filter(|i| i.node.is_dir) {
            trail.push(&item.node);
            if walk(item, path, trail) {
                return true;
            }
            trail.pop();
        }
        tree.items.iter().any(|i| !i.node.is_dir && i.node.path == path)
    }

    let mut trail = Vec::new();
    if walk(tree, path, &mut trail) {
        trail
    } else {
        Vec::new()
    }
}

/// Render the tree as indented text. Closed directories hide their items.
///
/// Markers: `*` modified, `>` active file.
pub fn render_tree(tree: &FileTree, session: &SessionState) -> String {
    let mut out = String::new();
    for item in &tree.items {
        render_node(item, session, 0, &mut out);
    }
    out
}

fn render_node(tree: &FileTree, session: &SessionState, depth: usize, out: &mut String) {
    let view = node_view(&tree.node, session);
    let icon = match view.kind {
        FileKind::Directory if view.open => "▾",
        kind => kind.icon(),
    };
    out.push_str(&"  ".repeat(depth));
    out.push_str(if view.active { "> " } else { "  " });
    out.push_str(icon);
    out.push(' ');
    out.push_str(&tree.node.name);
    if view.modified {
        out.push_str(" *");
    }
    out.push('\n');

    if view.open {
        for item in &tree.items {
            render_node(item, session, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileTree {
        let mut root = FileTree::root();
        root.items = vec![
            FileTree::dir(
                "/src",
                vec![
                    FileTree::dir("/src/lib", vec![FileTree::file("/src/lib/util.ts")]),
                    FileTree::file("/src/a.ts"),
                ],
            ),
            FileTree::dir("/docs", vec![FileTree::file("/docs/readme.md")]),
            FileTree::file("/index.md"),
        ];
        root
    }

    #[test]
    fn test_flatten_single_file() {
        let mut root = FileTree::root();
        root.items = vec![FileTree::dir("/src", vec![FileTree::file("/src/a.ts")])];
        assert_eq!(flatten_files(&root), vec!["/src/a.ts".to_string()]);
    }

    #[test]
    fn test_flatten_keeps_presentation_order() {
        assert_eq!(
            flatten_files(&sample()),
            vec!["/src/lib/util.ts", "/src/a.ts", "/docs/readme.md", "/index.md"]
        );
    }

    #[test]
    fn test_reload_rederives_open_dirs() {
        let session = SessionState {
            opened_dir: Some(vec![FileNode::new("/src", true), FileNode::new("/docs", true)]),
            ..Default::default()
        };

        // A fresh fetch: no node carries is_open
        let tree = reconcile(sample(), &session);

        assert!(find(&tree, "/src").unwrap().node.is_open);
        assert!(find(&tree, "/docs").unwrap().node.is_open);
        assert!(!find(&tree, "/src/lib").unwrap().node.is_open);
        assert!(!find(&tree, "/index.md").unwrap().node.is_open);

        // Reconciling again after the session forgets /docs closes it
        let session = SessionState {
            opened_dir: Some(vec![FileNode::new("/src", true)]),
            ..Default::default()
        };
        let tree = reconcile(tree, &session);
        assert!(!find(&tree, "/docs").unwrap().node.is_open);
    }

    #[test]
    fn test_node_view_derivation() {
        let session = SessionState {
            modified_files: vec![FileNode::new("/src/a.ts", false)],
            curr_file: Some(FileTree::file("/index.md")),
            ..Default::default()
        };
        let a = node_view(&FileNode::new("/src/a.ts", false), &session);
        assert!(a.modified && !a.active);
        assert_eq!(a.kind, FileKind::Script);

        let index = node_view(&FileNode::new("/index.md", false), &session);
        assert!(index.active && !index.modified);
        assert_eq!(index.kind, FileKind::Markdown);

        assert_eq!(FileKind::of(&FileNode::new("/src", true)), FileKind::Directory);
        assert_eq!(FileKind::of(&FileNode::new("/LICENSE", false)), FileKind::Other);
    }

    #[test]
    fn test_ancestors() {
        let tree = sample();
        let trail: Vec<&str> = ancestors(&tree, "/src/lib/util.ts")
            .iter()
            .map(|n| n.path.as_str())
            .collect();
        assert_eq!(trail, vec!["/src", "/src/lib"]);
        assert!(ancestors(&tree, "/index.md").is_empty());
        assert!(ancestors(&tree, "/nope").is_empty());
    }

    #[test]
    fn test_render_hides_closed_dirs() {
        let session = SessionState {
            opened_dir: Some(vec![FileNode::new("/src", true)]),
            modified_files: vec![FileNode::new("/src/a.ts", false)],
            ..Default::default()
        };
        let tree = reconcile(sample(), &session);
        let text = render_tree(&tree, &session);
        assert!(text.contains("a.ts *"));
        assert!(text.contains("lib"));
        assert!(!text.contains("util.ts"));
        assert!(!text.contains("readme.md"));
    }
}
