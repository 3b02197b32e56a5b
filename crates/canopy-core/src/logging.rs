//! Tracing targets, timing spans and tree rendering.
//!
//! Field writes and collection mutations log at `trace`; listener failures
//! and index collisions log at `warn`. Every event carries one of the
//! [`targets`], so a subscriber can filter per subsystem:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("canopy_core::collection=trace")
//!         .init();
//! }
//! ```
//!
//! # Debug Visualization
//!
//! Use [`TreeDebug`] to render a node and everything below it:
//!
//! ```ignore
//! use canopy_core::logging::{TreeDebug, TreeFormatOptions};
//!
//! println!("{}", TreeDebug::with_options(&*root, TreeFormatOptions::minimal()));
//! ```

use std::fmt::{self, Write as FmtWrite};

use crate::model::{AsAny, EventedModel};
use crate::tree::TreeNode;

/// `tracing` targets used by this crate.
pub mod targets {
    /// Evented model target (field writes, parent links).
    pub const MODEL: &str = "canopy_core::model";
    /// Parent-aware collection target.
    pub const COLLECTION: &str = "canopy_core::collection";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "canopy_core::signal";
    /// Tree traversal target.
    pub const TREE: &str = "canopy_core::tree";
    /// Performance span target.
    pub const PERF: &str = "canopy_core::perf";
}

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Indentation only.
    Compact,
}

impl TreeStyle {
    /// Connector, last connector, continuation and blank segments.
    fn segments(self) -> [&'static str; 4] {
        match self {
            Self::Ascii => ["+-- ", "`-- ", "|   ", "    "],
            Self::Unicode => [
                "\u{251c}\u{2500}\u{2500} ",
                "\u{2514}\u{2500}\u{2500} ",
                "\u{2502}   ",
                "    ",
            ],
            Self::Compact => ["- ", "- ", "  ", "  "],
        }
    }
}

/// Configuration for tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show model IDs.
    pub show_ids: bool,
    /// Whether to show type names.
    pub show_types: bool,
    /// Whether to list each node's leaves.
    pub show_leaves: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_types: false,
            show_leaves: true,
            max_depth: None,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_types: true,
            ..Default::default()
        }
    }

    /// Create options for minimal output: node names only.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_types: false,
            show_leaves: false,
            ..Default::default()
        }
    }

    /// Limit the rendered depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

/// Renders a tree node and its descendants as an indented outline.
///
/// Leaves are listed before child nodes, matching traversal order.
pub struct TreeDebug<'a, N> {
    root: &'a N,
    options: TreeFormatOptions,
}

impl<'a, N> TreeDebug<'a, N>
where
    N: TreeNode,
    N::Leaf: fmt::Display,
{
    /// Create a visualizer with default options.
    pub fn new(root: &'a N) -> Self {
        Self::with_options(root, TreeFormatOptions::default())
    }

    /// Create a visualizer with custom options.
    pub fn with_options(root: &'a N, options: TreeFormatOptions) -> Self {
        Self { root, options }
    }

    /// Render the tree into a string.
    pub fn format(&self) -> String {
        let mut output = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_tree(&mut output);
        output
    }

    fn write_tree(&self, out: &mut impl FmtWrite) -> fmt::Result {
        self.write_label(out, &self.root.node_name(), self.root)?;
        self.write_children(out, self.root, "", 0)
    }

    fn write_children(
        &self,
        out: &mut impl FmtWrite,
        node: &N,
        prefix: &str,
        depth: usize,
    ) -> fmt::Result {
        if self.options.max_depth.is_some_and(|max| depth >= max) {
            return Ok(());
        }

        let [tee, corner, bar, blank] = self.options.style.segments();
        let leaves = if self.options.show_leaves {
            node.leaf_items().to_vec()
        } else {
            Vec::new()
        };
        let children = node.child_nodes().to_vec();
        let total = leaves.len() + children.len();

        for (i, leaf) in leaves.iter().enumerate() {
            let connector = if i + 1 == total { corner } else { tee };
            write!(out, "{prefix}{connector}")?;
            self.write_label(out, &leaf.to_string(), &**leaf)?;
        }

        for (i, child) in children.iter().enumerate() {
            let is_last = leaves.len() + i + 1 == total;
            let connector = if is_last { corner } else { tee };
            write!(out, "{prefix}{connector}")?;
            self.write_label(out, &child.node_name(), &**child)?;

            let nested = format!("{prefix}{}", if is_last { blank } else { bar });
            self.write_children(out, child, &nested, depth + 1)?;
        }
        Ok(())
    }

    fn write_label<M: EventedModel>(
        &self,
        out: &mut impl FmtWrite,
        label: &str,
        model: &M,
    ) -> fmt::Result {
        let label = if label.is_empty() { "(unnamed)" } else { label };
        out.write_str(label)?;
        if self.options.show_ids {
            write!(out, " [{}]", model.model_id())?;
        }
        if self.options.show_types {
            let type_name = AsAny::type_name(model);
            let short_type = type_name.rsplit("::").next().unwrap_or(type_name);
            write!(out, " ({short_type})")?;
        }
        out.write_char('\n')
    }
}

impl<N> fmt::Display for TreeDebug<'_, N>
where
    N: TreeNode,
    N::Leaf: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f)
    }
}

/// Enters an `info` span on the perf target until dropped.
#[derive(Debug)]
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Enter a span labelled `name`.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: targets::PERF, "perf", operation = name);
        Self {
            _span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Folder, Note};

    fn sample() -> std::sync::Arc<Folder> {
        let root = Folder::new("root");
        let child = Folder::new("child");
        child.notes.append(Note::new("inner")).unwrap();
        root.notes.append(Note::new("top")).unwrap();
        root.children.append(child).unwrap();
        root.children.append(Folder::new("empty")).unwrap();
        root
    }

    #[test]
    fn test_tree_format_minimal() {
        let root = sample();
        let output = TreeDebug::with_options(&*root, TreeFormatOptions::minimal()).format();
        assert_eq!(output, "root\n├── child\n└── empty\n");
    }

    #[test]
    fn test_tree_format_ascii_with_leaves() {
        let root = sample();
        let options = TreeFormatOptions {
            style: TreeStyle::Ascii,
            show_ids: false,
            ..Default::default()
        };
        let output = TreeDebug::with_options(&*root, options).to_string();
        assert_eq!(
            output,
            "root\n+-- top\n+-- child\n|   `-- inner\n`-- empty\n"
        );
    }

    #[test]
    fn test_tree_format_compact() {
        let root = sample();
        let options = TreeFormatOptions {
            style: TreeStyle::Compact,
            show_ids: false,
            ..Default::default()
        };
        let output = TreeDebug::with_options(&*root, options).format();
        assert_eq!(output, "root\n- top\n- child\n  - inner\n- empty\n");
    }

    #[test]
    fn test_tree_format_detailed() {
        let root = sample();
        let output = TreeDebug::with_options(&*root, TreeFormatOptions::detailed()).format();
        assert!(output.contains(&format!("root [{}] (Folder)", root.model_id())));
        assert!(output.contains("(Note)"));
    }

    #[test]
    fn test_tree_format_max_depth() {
        let root = sample();
        let options = TreeFormatOptions::minimal().with_max_depth(0);
        assert_eq!(TreeDebug::with_options(&*root, options).format(), "root\n");
    }

    #[test]
    fn test_perf_span() {
        let _span = PerfSpan::new("test_operation");
        tracing::trace!(target: targets::PERF, "inside perf span");
    }
}
