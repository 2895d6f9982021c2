//! Structured transform specifications.
//!
//! Defect generators describe what should happen to the video as an
//! ordered list of named filter stages with typed parameters (plus raw
//! graph fragments for the few multi-branch effects).  The textual form
//! ffmpeg expects is produced only at the invocation boundary, so
//! parameter sampling stays independently testable from process
//! plumbing.

use std::fmt::Display;

use crate::span::Span;

/// One named filter stage, e.g. `gblur=sigma=0.85` or
/// `boxblur=0:1:enable='between(n\,5\,9)'`.
#[derive(Debug, Clone)]
pub struct Stage {
    name: &'static str,
    args: Vec<String>,
    enable: Option<String>,
}

impl Stage {
    pub fn new(name: &'static str) -> Self {
        Stage { name, args: Vec::new(), enable: None }
    }

    /// `key=value` argument.
    pub fn arg(mut self, key: &'static str, value: impl Display) -> Self {
        self.args.push(format!("{key}={value}"));
        self
    }

    /// `key='expr'` argument; the quotes protect commas inside the
    /// expression from the filter-chain parser.
    pub fn expr(mut self, key: &'static str, expr: impl Display) -> Self {
        self.args.push(format!("{key}='{expr}'"));
        self
    }

    /// Positional argument, e.g. the `0:1` of `boxblur=0:1`.
    pub fn positional(mut self, value: impl Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// Gate the stage with a frame-index enable expression.
    pub fn enable_in(mut self, expr: &str) -> Self {
        self.enable = Some(expr.to_string());
        self
    }

    fn render(&self) -> String {
        let mut parts = self.args.clone();
        if let Some(en) = &self.enable {
            parts.push(format!("enable='{en}'"));
        }
        if parts.is_empty() {
            self.name.to_string()
        } else {
            format!("{}={}", self.name, parts.join(":"))
        }
    }
}

#[derive(Debug, Clone)]
enum Item {
    Stage(Stage),
    Graph(String),
}

/// Ordered filter chain; renders to the `-vf` argument.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    items: Vec<Item>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.items.push(Item::Stage(stage));
        self
    }

    /// Append a pre-built multi-branch graph fragment (split/overlay
    /// style constructs that do not fit the linear stage model).
    pub fn graph(mut self, graph: impl Into<String>) -> Self {
        self.items.push(Item::Graph(graph.into()));
        self
    }

    /// Every chain ends with this: libx264 requires even dimensions.
    pub fn even_scale(self) -> Self {
        self.stage(
            Stage::new("scale")
                .positional("trunc(iw/2)*2")
                .positional("trunc(ih/2)*2"),
        )
    }

    /// Serialize to ffmpeg's textual filter syntax.
    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(|item| match item {
                Item::Stage(s) => s.render(),
                Item::Graph(g) => g.clone(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// `between(n\,a\,b) + between(n\,c\,d) + …` over the given spans, for
/// use in `enable=` clauses.
pub fn enable_between(spans: &[Span]) -> String {
    spans
        .iter()
        .map(|s| format!("between(n\\,{}\\,{})", s.start, s.end))
        .collect::<Vec<_>>()
        .join(" + ")
}
