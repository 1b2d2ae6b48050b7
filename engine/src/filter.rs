//! Glob patterns for include/exclude filters.
//!
//! Patterns support `*` (any run of characters) and `?` (one character).
//! Each pattern is compiled once per job into an anchored, case-insensitive
//! regex. A pattern that fails to compile degrades to an exact,
//! case-sensitive comparison.

use regex::{Regex, RegexBuilder};

/// A single compiled glob.
#[derive(Debug, Clone)]
pub enum Pattern {
    Glob(Regex),
    Exact(String),
}

impl Pattern {
    pub fn compile(glob: &str) -> Self {
        let mut expr = String::with_capacity(glob.len() + 8);
        expr.push('^');
        for ch in glob.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
            }
        }
        expr.push('$');

        match RegexBuilder::new(&expr).case_insensitive(true).build() {
            Ok(re) => Pattern::Glob(re),
            Err(e) => {
                tracing::warn!("pattern '{}' did not compile ({}); matching it literally", glob, e);
                Pattern::Exact(glob.to_string())
            }
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Glob(re) => re.is_match(name),
            Pattern::Exact(literal) => literal == name,
        }
    }
}

/// A list of compiled globs; matches when any member does.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Self {
        PatternSet {
            patterns: globs.iter().map(|g| Pattern::compile(g.as_ref())).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }
}

/// The compiled filters of one job.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub include_files: PatternSet,
    pub exclude_files: PatternSet,
    pub exclude_dirs: PatternSet,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
}

impl Filters {
    pub fn from_config(config: &crate::config::JobConfig) -> Self {
        Filters {
            include_files: PatternSet::new(&config.include_files),
            exclude_files: PatternSet::new(&config.exclude_files),
            exclude_dirs: PatternSet::new(&config.exclude_dirs),
            min_size: config.min_size,
            max_size: config.max_size,
        }
    }

    /// Whether a directory (by name or relative path) prunes its subtree.
    pub fn excludes_dir(&self, name: &str, relative: &str) -> bool {
        self.exclude_dirs.matches(name) || self.exclude_dirs.matches(relative)
    }

    /// Whether a file passes the name and size filters.
    pub fn accepts_file(&self, name: &str, relative: &str, size: u64) -> bool {
        if self.exclude_files.matches(name) || self.exclude_files.matches(relative) {
            return false;
        }
        if !self.include_files.is_empty()
            && !(self.include_files.matches(name) || self.include_files.matches(relative))
        {
            return false;
        }
        if self.min_size.is_some_and(|min| size < min) {
            return false;
        }
        if self.max_size.is_some_and(|max| size > max) {
            return false;
        }
        true
    }
}
