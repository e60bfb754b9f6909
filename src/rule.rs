//! Text rules and rule sets.
//!
//! A [`Rule`] pairs a [`Matcher`] with an [`Action`] and a [`Guard`]. Rules
//! only ever see in-memory text; disk access lives in [`crate::rewriter`].
//! A [`RuleSet`] threads content through its rules in declared order, so a
//! rule always sees the output of the rules before it.

use crate::error::{Error, Result};
use regex::{Captures, Regex};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

/// A pattern over unparsed text.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact substring.
    Literal(String),
    /// Regular expression. Templates may refer to capture groups as `${n}`.
    Regex(Regex),
    /// Consecutive whole lines, compared exactly (`\n` line endings).
    Lines(Vec<String>),
    /// An item introduced by a header pattern. The span runs from the header
    /// to the brace closing the first `{` at or after the header's start, so
    /// a header may end with the opening brace itself.
    Braced(Regex),
}

impl Matcher {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Lines(lines.into_iter().map(Into::into).collect())
    }

    pub fn braced(header: &str) -> Result<Self> {
        Ok(Self::Braced(Regex::new(header)?))
    }

    /// All non-overlapping match spans, left to right.
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        match self {
            Self::Literal(needle) if needle.is_empty() => Vec::new(),
            Self::Literal(needle) => text
                .match_indices(needle.as_str())
                .map(|(start, m)| start..start + m.len())
                .collect(),
            Self::Regex(re) => re.find_iter(text).map(|m| m.range()).collect(),
            Self::Lines(lines) => line_block_spans(text, &lines.join("\n")),
            Self::Braced(header) => braced_spans(text, header),
        }
    }

    /// The first match span, if any.
    pub fn find(&self, text: &str) -> Option<Range<usize>> {
        match self {
            Self::Literal(needle) if needle.is_empty() => None,
            Self::Literal(needle) => text.find(needle.as_str()).map(|s| s..s + needle.len()),
            Self::Regex(re) => re.find(text).map(|m| m.range()),
            _ => self.spans(text).into_iter().next(),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(text),
            _ => self.find(text).is_some(),
        }
    }

    /// Whether the pattern targets a construct spanning several lines.
    pub fn spans_lines(&self) -> bool {
        match self {
            Self::Literal(needle) => needle.contains('\n'),
            Self::Regex(re) => {
                let pattern = re.as_str();
                pattern.contains("(?s") || pattern.contains(r"\n") || pattern.contains(r"\s")
            }
            Self::Lines(lines) => lines.len() > 1,
            Self::Braced(_) => true,
        }
    }

    /// Replaces every match (or only the first) with `with`.
    ///
    /// Returns borrowed text when nothing matched.
    pub fn replace<'t>(&self, text: &'t str, with: &Replacement, scope: Scope) -> Cow<'t, str> {
        let limit = match scope {
            Scope::All => 0,
            Scope::First => 1,
        };

        if let Self::Regex(re) = self {
            return match with {
                Replacement::Template(template) => re.replacen(text, limit, template.as_str()),
                Replacement::Map(f) => re.replacen(text, limit, |caps: &Captures<'_>| f(&caps[0])),
            };
        }

        let mut spans = self.spans(text);
        if limit > 0 {
            spans.truncate(limit);
        }
        splice(text, &spans, with)
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(needle) => write!(f, "{:?}", needle),
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
            Self::Lines(lines) => write!(f, "lines{:?}", lines),
            Self::Braced(header) => write!(f, "braced /{}/", header.as_str()),
        }
    }
}

fn splice<'t>(text: &'t str, spans: &[Range<usize>], with: &Replacement) -> Cow<'t, str> {
    if spans.is_empty() {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for span in spans {
        out.push_str(&text[last..span.start]);
        out.push_str(&with.render(&text[span.clone()]));
        last = span.end;
    }
    out.push_str(&text[last..]);
    Cow::Owned(out)
}

fn line_block_spans(text: &str, block: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    if block.is_empty() {
        return spans;
    }

    let step = block.chars().next().map_or(1, char::len_utf8);
    let mut from = 0;
    while let Some(offset) = text[from..].find(block) {
        let start = from + offset;
        let end = start + block.len();
        let starts_line = start == 0 || text.as_bytes()[start - 1] == b'\n';
        let rest = &text[end..];
        let ends_line = rest.is_empty() || rest.starts_with('\n') || rest.starts_with("\r\n");
        if starts_line && ends_line {
            spans.push(start..end);
            from = end;
        } else {
            from = start + step;
        }
    }
    spans
}

fn braced_spans(text: &str, header: &Regex) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(m) = header.find_at(text, from) {
        let Some(end) = body_end(text, m.start()) else {
            break;
        };
        spans.push(m.start()..end);
        from = end.max(m.end());
    }
    spans
}

/// Offset just past the brace that closes the first `{` at or after `from`.
///
/// Braces inside string literals and comments are counted like any other.
fn body_end(text: &str, from: usize) -> Option<usize> {
    let open = from + text[from..].find('{')?;
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// What a match is replaced with.
#[derive(Clone)]
pub enum Replacement {
    /// Fixed text. Capture references (`${1}`) only expand for regex matchers.
    Template(String),
    /// Computed from the full matched text.
    Map(fn(&str) -> String),
}

impl Replacement {
    fn render(&self, matched: &str) -> String {
        match self {
            Self::Template(template) => template.clone(),
            Self::Map(f) => f(matched),
        }
    }
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Self::Map(_) => f.write_str("Map(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    First,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

#[derive(Debug, Clone)]
pub enum Action {
    Replace { with: Replacement, scope: Scope },
    /// Splice `text` next to the first anchor match. No anchor, no insertion.
    Insert { text: String, side: Side },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    ReplaceInPlace,
    ReplaceConstruct,
    InsertAtAnchor,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReplaceInPlace => "replace-in-place",
            Self::ReplaceConstruct => "replace-construct",
            Self::InsertAtAnchor => "insert-at-anchor",
        })
    }
}

/// Precondition evaluated against the current content before a rule runs.
#[derive(Debug, Clone)]
pub enum Guard {
    Always,
    Contains(String),
    Lacks(String),
    Matches(Matcher),
    NoMatch(Matcher),
    All(Vec<Guard>),
    Any(Vec<Guard>),
}

impl Guard {
    pub fn contains(marker: impl Into<String>) -> Self {
        Self::Contains(marker.into())
    }

    pub fn lacks(marker: impl Into<String>) -> Self {
        Self::Lacks(marker.into())
    }

    pub fn matches(pattern: &str) -> Result<Self> {
        Ok(Self::Matches(Matcher::regex(pattern)?))
    }

    pub fn no_match(pattern: &str) -> Result<Self> {
        Ok(Self::NoMatch(Matcher::regex(pattern)?))
    }

    pub fn holds(&self, content: &str) -> bool {
        match self {
            Self::Always => true,
            Self::Contains(marker) => content.contains(marker.as_str()),
            Self::Lacks(marker) => !content.contains(marker.as_str()),
            Self::Matches(matcher) => matcher.is_match(content),
            Self::NoMatch(matcher) => !matcher.is_match(content),
            Self::All(guards) => guards.iter().all(|g| g.holds(content)),
            Self::Any(guards) => guards.iter().any(|g| g.holds(content)),
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, op: &str, guards: &[Guard]| {
            write!(f, "{}(", op)?;
            for (i, guard) in guards.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", guard)?;
            }
            f.write_str(")")
        };
        match self {
            Self::Always => f.write_str("always"),
            Self::Contains(marker) => write!(f, "contains {:?}", marker),
            Self::Lacks(marker) => write!(f, "lacks {:?}", marker),
            Self::Matches(matcher) => write!(f, "matches {}", matcher),
            Self::NoMatch(matcher) => write!(f, "no match {}", matcher),
            Self::All(guards) => join(f, "all", guards),
            Self::Any(guards) => join(f, "any", guards),
        }
    }
}

/// One named text transformation.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    matcher: Matcher,
    action: Action,
    guard: Guard,
    after: Vec<String>,
}

impl Rule {
    fn new(name: impl Into<String>, matcher: Matcher, action: Action) -> Self {
        Self {
            name: name.into(),
            matcher,
            action,
            guard: Guard::Always,
            after: Vec::new(),
        }
    }

    /// Replaces every match with `template`.
    pub fn replace(name: impl Into<String>, matcher: Matcher, template: impl Into<String>) -> Self {
        let with = Replacement::Template(template.into());
        Self::new(name, matcher, Action::Replace { with, scope: Scope::All })
    }

    /// Replaces every match with `f(matched_text)`.
    pub fn replace_with(name: impl Into<String>, matcher: Matcher, f: fn(&str) -> String) -> Self {
        let with = Replacement::Map(f);
        Self::new(name, matcher, Action::Replace { with, scope: Scope::All })
    }

    pub fn remove(name: impl Into<String>, matcher: Matcher) -> Self {
        Self::replace(name, matcher, "")
    }

    pub fn insert_after(name: impl Into<String>, anchor: Matcher, text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(name, anchor, Action::Insert { text, side: Side::After })
    }

    pub fn insert_before(name: impl Into<String>, anchor: Matcher, text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(name, anchor, Action::Insert { text, side: Side::Before })
    }

    /// Restricts a replacement to the first occurrence.
    pub fn first_only(mut self) -> Self {
        if let Action::Replace { scope, .. } = &mut self.action {
            *scope = Scope::First;
        }
        self
    }

    pub fn when(mut self, guard: Guard) -> Self {
        self.guard = guard;
        self
    }

    /// Declares that `rule` must appear earlier in the same rule set.
    pub fn after(mut self, rule: &str) -> Self {
        self.after.push(rule.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn kind(&self) -> ActionKind {
        match self.action {
            Action::Insert { .. } => ActionKind::InsertAtAnchor,
            Action::Replace { .. } if self.matcher.spans_lines() => ActionKind::ReplaceConstruct,
            Action::Replace { .. } => ActionKind::ReplaceInPlace,
        }
    }

    /// Applies the rule, returning `None` when the content would not change.
    pub fn apply(&self, content: &str) -> Option<String> {
        if !self.guard.holds(content) {
            return None;
        }

        let updated = match &self.action {
            Action::Replace { with, scope } => self.matcher.replace(content, with, *scope),
            Action::Insert { text, side } => {
                let span = self.matcher.find(content)?;
                let at = match side {
                    Side::Before => span.start,
                    Side::After => span.end,
                };
                let mut out = String::with_capacity(content.len() + text.len());
                out.push_str(&content[..at]);
                out.push_str(text);
                out.push_str(&content[at..]);
                Cow::Owned(out)
            }
        };

        match updated {
            Cow::Owned(out) if out != content => Some(out),
            _ => None,
        }
    }
}

/// Result of running a rule set over some content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub content: String,
    /// Names of the rules that changed the content, in order.
    pub fired: Vec<String>,
}

/// An ordered, immutable sequence of rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
    name: String,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Builds a rule set, rejecting unguarded insertions and rules placed
    /// before a rule they declared to run after.
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Result<Self> {
        for (index, rule) in rules.iter().enumerate() {
            if matches!(rule.action, Action::Insert { .. }) && matches!(rule.guard, Guard::Always) {
                return Err(Error::UnguardedInsert(rule.name.clone()));
            }
            for dependency in &rule.after {
                if !rules[..index].iter().any(|r| &r.name == dependency) {
                    return Err(Error::RuleOrder {
                        rule: rule.name.clone(),
                        after: dependency.clone(),
                    });
                }
            }
        }

        Ok(Self {
            name: name.into(),
            rules,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn apply(&self, content: &str) -> Applied {
        let mut current = content.to_string();
        let mut fired = Vec::new();

        for rule in &self.rules {
            if let Some(next) = rule.apply(&current) {
                current = next;
                fired.push(rule.name.clone());
            }
        }

        Applied {
            content: current,
            fired,
        }
    }
}
