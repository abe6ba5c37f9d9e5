//! Gitignore pattern matching.
//!
//! A single `.gitignore` file compiles into an [`IgnoreNode`]: an ordered
//! rule list where the last matching rule wins. An [`IgnoreManager`] stacks
//! nodes from the repository root down to the path's own directory, plus
//! `.git/info/exclude` and `core.excludesFile`, and lets the deepest
//! decisive node override shallower ones.

use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};
use git_utils::wildmatch::{WildmatchFlags, WildmatchPattern};

/// Outcome of evaluating a path against one node's rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// A rule in this node matched and the path is ignored.
    Ignored,
    /// A negated rule in this node matched, re-including the path.
    NotIgnored,
    /// No rule in this node applies; defer to the parent node.
    CheckParent,
}

/// A single compiled gitignore rule.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pattern: WildmatchPattern,
    /// Whether the pattern was prefixed with `!`.
    pub negated: bool,
    /// Whether the pattern only matches directories (trailing `/`).
    pub dir_only: bool,
    /// Whether the pattern is anchored to the node's directory (contains a
    /// non-trailing `/`, including a leading one).
    pub anchored: bool,
    /// The raw pattern text after stripping negation, anchoring, and the
    /// directory-only marker.
    pub raw: BString,
}

impl IgnoreRule {
    /// Parse a single raw line from a gitignore file. Returns `None` for
    /// blank lines and comments.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let mut line = line;

        if line.is_empty() || line[0] == b'#' {
            return None;
        }

        // Strip trailing whitespace unless escaped with a backslash.
        while line.len() > 1 && line.last() == Some(&b' ') && line[line.len() - 2] != b'\\' {
            line = &line[..line.len() - 1];
        }
        if line.last() == Some(&b' ') && line.len() == 1 {
            return None;
        }
        if line.is_empty() {
            return None;
        }

        let negated = line[0] == b'!';
        if negated {
            line = &line[1..];
            if line.is_empty() {
                return None;
            }
        }

        // Escaped leading `#` or `!` is a literal pattern character.
        if line[0] == b'\\' && line.len() > 1 && (line[1] == b'#' || line[1] == b'!') {
            line = &line[1..];
        }

        let dir_only = line.last() == Some(&b'/');
        let line = if dir_only { &line[..line.len() - 1] } else { line };
        if line.is_empty() {
            return None;
        }

        let anchored = line.contains(&b'/');
        let pattern_bytes = if line[0] == b'/' { &line[1..] } else { line };
        if pattern_bytes.is_empty() {
            return None;
        }

        let pattern = WildmatchPattern::new(BStr::new(pattern_bytes), WildmatchFlags::PATHNAME);

        Some(Self {
            pattern,
            negated,
            dir_only,
            anchored,
            raw: BString::from(pattern_bytes),
        })
    }

    /// Does this rule match `path` (relative to the node's own directory)?
    fn matches(&self, path: &BStr, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if self.anchored {
            return self.pattern.matches(path);
        }
        if self.pattern.matches(path) {
            return true;
        }
        match path.rfind_byte(b'/') {
            Some(pos) => self.pattern.matches(BStr::new(&path[pos + 1..])),
            None => false,
        }
    }
}

/// The compiled rule list from a single ignore source (a `.gitignore` file,
/// `.git/info/exclude`, or `core.excludesFile`).
#[derive(Debug, Clone, Default)]
pub struct IgnoreNode {
    rules: Vec<IgnoreRule>,
}

impl IgnoreNode {
    /// An empty node that never matches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse all rules out of raw gitignore file content.
    pub fn parse(content: &[u8]) -> Self {
        let rules = content.lines().filter_map(IgnoreRule::parse).collect();
        Self { rules }
    }

    /// Number of rules in this node.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether this node has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate `path` (relative to this node's directory) against the rule
    /// list in order; the last matching rule wins.
    pub fn matches(&self, path: &BStr, is_dir: bool) -> MatchResult {
        let mut result = MatchResult::CheckParent;
        for rule in &self.rules {
            if rule.matches(path, is_dir) {
                result = if rule.negated {
                    MatchResult::NotIgnored
                } else {
                    MatchResult::Ignored
                };
            }
        }
        result
    }
}

/// Layered gitignore evaluation across an entire working tree.
///
/// Nodes are kept sorted by directory depth so evaluation can walk from the
/// path's own directory up toward the repository root, stopping at the
/// first node that reaches a decision. If no per-directory node decides,
/// `.git/info/exclude` and then the configured global patterns apply.
#[derive(Debug, Clone, Default)]
pub struct IgnoreManager {
    /// `core.excludesFile` patterns; lowest priority.
    global: IgnoreNode,
    /// `.git/info/exclude` patterns.
    exclude: IgnoreNode,
    /// `(directory, node)` pairs sorted by ascending directory depth.
    nodes: Vec<(PathBuf, IgnoreNode)>,
}

impl IgnoreManager {
    /// Create an empty manager with no loaded patterns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the global `core.excludesFile` pattern set.
    pub fn set_global_patterns(&mut self, contents: &[u8]) {
        self.global = IgnoreNode::parse(contents);
    }

    /// Load `.git/info/exclude` pattern set.
    pub fn set_exclude_patterns(&mut self, contents: &[u8]) {
        self.exclude = IgnoreNode::parse(contents);
    }

    /// Register the `.gitignore` content governing `dir` (a path relative
    /// to the repository root; `""` for the root itself).
    pub fn add_ignore_file(&mut self, dir: impl Into<PathBuf>, contents: &[u8]) {
        let dir = normalize_dir(dir.into());
        let node = IgnoreNode::parse(contents);
        let depth = depth_of(&dir);
        let pos = self.nodes.partition_point(|(d, _)| depth_of(d) <= depth);
        self.nodes.insert(pos, (dir, node));
    }

    /// Is `path` (relative to the repository root, `/`-separated, no
    /// leading slash) ignored?
    pub fn is_ignored(&self, path: &BStr, is_dir: bool) -> bool {
        for (dir, node) in self.nodes.iter().rev() {
            let Some(relative) = relative_to(dir, path) else {
                continue;
            };
            if relative.is_empty() {
                continue;
            }
            match node.matches(relative, is_dir) {
                MatchResult::Ignored => return true,
                MatchResult::NotIgnored => return false,
                MatchResult::CheckParent => continue,
            }
        }

        match self.exclude.matches(path, is_dir) {
            MatchResult::Ignored => return true,
            MatchResult::NotIgnored => return false,
            MatchResult::CheckParent => {}
        }

        matches!(self.global.matches(path, is_dir), MatchResult::Ignored)
    }
}

fn normalize_dir(dir: PathBuf) -> PathBuf {
    let s = dir.to_string_lossy();
    let trimmed = s.trim_matches('/');
    PathBuf::from(trimmed)
}

fn depth_of(dir: &Path) -> usize {
    if dir.as_os_str().is_empty() {
        0
    } else {
        dir.components().count()
    }
}

/// Compute `path` relative to `dir`, both `/`-separated repo-root-relative
/// paths. Returns `None` if `path` does not live under `dir`.
fn relative_to<'a>(dir: &Path, path: &'a BStr) -> Option<&'a BStr> {
    if dir.as_os_str().is_empty() {
        return Some(path);
    }
    let dir_str = dir.to_string_lossy();
    let prefix_bytes = dir_str.as_bytes();
    if path.len() < prefix_bytes.len() || &path[..prefix_bytes.len()] != prefix_bytes {
        return None;
    }
    if path.len() == prefix_bytes.len() {
        return Some(BStr::new(b""));
    }
    if path[prefix_bytes.len()] != b'/' {
        return None;
    }
    Some(BStr::new(&path[prefix_bytes.len() + 1..]))
}
