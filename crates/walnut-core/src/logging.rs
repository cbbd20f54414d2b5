//! Logging and debugging facilities for Walnut.
//!
//! This module provides:
//! - The `tracing` targets every Walnut subsystem logs under
//! - Debug visualization of property group hierarchies
//! - Performance spans for timing longer operations
//!
//! # Tracing Integration
//!
//! Walnut uses the `tracing` crate for instrumentation and never installs a
//! subscriber itself. To see logs, install one in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("walnut_kernel=info,walnut_core::property=debug")
//!         .init();
//! }
//! ```
//!
//! # Debug Visualization
//!
//! Use [`PropertyTreeDebug`] to render a property group:
//!
//! ```
//! use walnut_core::logging::PropertyTreeDebug;
//! use walnut_core::property::PropertyGroup;
//!
//! let root = PropertyGroup::new("Properties", "");
//! root.add_property("threshold", "", 0.5).unwrap();
//! println!("{}", PropertyTreeDebug::new().format(&root));
//! ```

use crate::property::{Property, PropertyGroup};

/// `tracing` targets, one per subsystem, for `EnvFilter` directives such as
/// `walnut_kernel::project=debug`.
pub mod targets {
    pub const CORE: &str = "walnut_core";
    pub const SIGNAL: &str = "walnut_core::signal";
    pub const CONDITION: &str = "walnut_core::condition";
    pub const SHARED: &str = "walnut_core::shared";
    pub const PROPERTY: &str = "walnut_core::property";
    pub const KERNEL: &str = "walnut_kernel";
    /// Prototype registry and library discovery.
    pub const FACTORY: &str = "walnut_kernel::factory";
    pub const CONTAINER: &str = "walnut_kernel::container";
    /// Module threads: start, ready, crash, stop.
    pub const MODULE: &str = "walnut_kernel::module";
    pub const CONNECTOR: &str = "walnut_kernel::connector";
    /// Project file parsing, loading and saving.
    pub const PROJECT: &str = "walnut_kernel::project";
    /// [`PerfSpan`](super::PerfSpan) timings.
    pub const PERF: &str = "walnut::perf";
}

/// How [`PropertyTreeDebug`] draws branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// `+--` and `` `-- ``.
    Ascii,
    #[default]
    Unicode,
    /// A dash per entry, no connecting lines.
    Compact,
}

/// What [`PropertyTreeDebug`] prints.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    pub style: TreeStyle,
    /// Whether to show property type tags.
    pub show_types: bool,
    /// Whether to show current values.
    pub show_values: bool,
    /// Whether to include hidden properties.
    pub show_hidden: bool,
    /// Groups deeper than this are cut off. The root is depth 0.
    pub max_depth: Option<usize>,
    /// Spaces per nesting level, after the branch character.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_types: true,
            show_values: true,
            show_hidden: false,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Everything, hidden properties included.
    pub fn detailed() -> Self {
        Self {
            show_hidden: true,
            ..Default::default()
        }
    }

    /// Names only.
    pub fn minimal() -> Self {
        Self {
            show_types: false,
            show_values: false,
            ..Default::default()
        }
    }
}

/// Renders a property group as an indented tree, one property per line.
#[derive(Debug, Clone, Default)]
pub struct PropertyTreeDebug {
    options: TreeFormatOptions,
}

impl PropertyTreeDebug {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format a group and everything below it.
    pub fn format(&self, root: &PropertyGroup) -> String {
        let mut out = String::new();
        self.format_node(root, 0, true, &mut out);
        out
    }

    fn format_node(&self, property: &dyn Property, depth: usize, is_last: bool, output: &mut String) {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return;
        }

        output.push_str(&self.build_prefix(depth, is_last));
        output.push_str(if property.name().is_empty() {
            "(unnamed)"
        } else {
            property.name()
        });
        if self.options.show_types {
            output.push_str(&format!(" ({})", property.property_type()));
        }
        if self.options.show_values && property.as_group().is_none() {
            output.push_str(&format!(" = {}", property.get_as_string()));
        }
        if property.is_hidden() {
            output.push_str(" [hidden]");
        }
        output.push('\n');

        let Some(group) = property.as_group() else {
            return;
        };
        let ticket = group.get_read_ticket();
        let children: Vec<_> = ticket
            .iter()
            .filter(|p| self.options.show_hidden || !p.is_hidden())
            .collect();
        let last = children.len().saturating_sub(1);
        for (i, child) in children.into_iter().enumerate() {
            self.format_node(child.as_ref(), depth + 1, i == last, output);
        }
    }

    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, corner, last) = match self.options.style {
            TreeStyle::Ascii => ("|", "+-- ", "`-- "),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500} ", "\u{2514}\u{2500}\u{2500} "),
            TreeStyle::Compact => ("", "- ", "- "),
        };

        let indent = " ".repeat(self.options.indent_size);
        let mut prefix = format!("{branch}{indent}").repeat(depth - 1);
        prefix.push_str(if is_last { last } else { corner });
        prefix
    }
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Used to time longer operations such as loading a project.
#[derive(Debug)]
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Enter a span named after `operation`. It is exited on drop.
    pub fn new(operation: &'static str) -> Self {
        let span = tracing::info_span!(target: targets::PERF, "perf", operation);
        Self {
            _span: span.entered(),
        }
    }
}
