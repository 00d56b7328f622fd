//! Selector model
//!
//! A [`Selector`] is an ordered list of fallback predicates plus a pick
//! policy. Its canonical text form (see [`std::fmt::Display`]) parses back to
//! an identical value, which is what scripts and AI payloads carry.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::SelectorParseError;
use crate::parser;

/// How visible text is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextMatch {
    /// Whole trimmed text equals the value (`text=`)
    Exact,
    /// Case-insensitive substring (`text~=`)
    Contains,
    /// Case-insensitive prefix (`text^=`)
    Prefix,
}

impl TextMatch {
    pub fn operator(&self) -> &'static str {
        match self {
            TextMatch::Exact => "=",
            TextMatch::Contains => "~=",
            TextMatch::Prefix => "^=",
        }
    }
}

/// Geometric relation to an anchor element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Below,
    Above,
    LeftOf,
    RightOf,
    Near,
}

impl Relation {
    pub fn name(&self) -> &'static str {
        match self {
            Relation::Below => "below",
            Relation::Above => "above",
            Relation::LeftOf => "left_of",
            Relation::RightOf => "right_of",
            Relation::Near => "near",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "below" => Some(Relation::Below),
            "above" => Some(Relation::Above),
            "left_of" => Some(Relation::LeftOf),
            "right_of" => Some(Relation::RightOf),
            "near" => Some(Relation::Near),
            _ => None,
        }
    }
}

/// Composable element predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// Stable element identifier
    Id(String),
    /// Role/type, compared case-insensitively
    Role(String),
    /// Visible text
    Text { value: String, mode: TextMatch },
    Enabled(bool),
    Visible(bool),
    /// Element has at least one descendant matching the inner predicate
    Has(Box<Predicate>),
    /// Element stands in `relation` to the first element matching `anchor`
    Relative {
        relation: Relation,
        anchor: Box<Predicate>,
    },
    /// All predicates hold
    And(Vec<Predicate>),
    /// `target` matches and some ancestor matches `ancestor`
    Descendant {
        ancestor: Box<Predicate>,
        target: Box<Predicate>,
    },
}

impl Predicate {
    pub fn id(value: impl Into<String>) -> Self {
        Predicate::Id(value.into())
    }

    pub fn role(value: impl Into<String>) -> Self {
        Predicate::Role(value.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Predicate::Text {
            value: value.into(),
            mode: TextMatch::Exact,
        }
    }

    pub fn text_contains(value: impl Into<String>) -> Self {
        Predicate::Text {
            value: value.into(),
            mode: TextMatch::Contains,
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut items) => {
                items.push(other);
                Predicate::And(items)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn inside(self, ancestor: Predicate) -> Self {
        Predicate::Descendant {
            ancestor: Box::new(ancestor),
            target: Box::new(self),
        }
    }

    /// True when the predicate names the element itself by id, role or text,
    /// ignoring anything reachable only through a relation.
    pub fn is_anchored(&self) -> bool {
        match self {
            Predicate::Id(_) | Predicate::Role(_) | Predicate::Text { .. } => true,
            Predicate::Enabled(_) | Predicate::Visible(_) => false,
            Predicate::Has(_) | Predicate::Relative { .. } => false,
            Predicate::And(items) => items.iter().any(Predicate::is_anchored),
            Predicate::Descendant { target, .. } => target.is_anchored(),
        }
    }

    fn map_values<F>(&self, f: &F) -> Predicate
    where
        F: Fn(&str) -> String,
    {
        match self {
            Predicate::Id(v) => Predicate::Id(f(v)),
            Predicate::Role(v) => Predicate::Role(f(v)),
            Predicate::Text { value, mode } => Predicate::Text {
                value: f(value),
                mode: *mode,
            },
            Predicate::Enabled(b) => Predicate::Enabled(*b),
            Predicate::Visible(b) => Predicate::Visible(*b),
            Predicate::Has(inner) => Predicate::Has(Box::new(inner.map_values(f))),
            Predicate::Relative { relation, anchor } => Predicate::Relative {
                relation: *relation,
                anchor: Box::new(anchor.map_values(f)),
            },
            Predicate::And(items) => Predicate::And(items.iter().map(|p| p.map_values(f)).collect()),
            Predicate::Descendant { ancestor, target } => Predicate::Descendant {
                ancestor: Box::new(ancestor.map_values(f)),
                target: Box::new(target.map_values(f)),
            },
        }
    }

    fn visit_values<F>(&self, f: &mut F)
    where
        F: FnMut(&str),
    {
        match self {
            Predicate::Id(v) | Predicate::Role(v) => f(v),
            Predicate::Text { value, .. } => f(value),
            Predicate::Enabled(_) | Predicate::Visible(_) => {}
            Predicate::Has(inner) => inner.visit_values(f),
            Predicate::Relative { anchor, .. } => anchor.visit_values(f),
            Predicate::And(items) => items.iter().for_each(|p| p.visit_values(f)),
            Predicate::Descendant { ancestor, target } => {
                ancestor.visit_values(f);
                target.visit_values(f);
            }
        }
    }
}

/// Disambiguation policy applied to the matches of one alternative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Pick {
    /// Keep every match; single-target actions treat >1 as ambiguous
    #[default]
    Unique,
    First,
    Last,
    /// 0-based index in document order
    Nth(usize),
}

/// Whether a selector survives layout changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorStability {
    /// Every alternative names the element by id, role or text
    Stable,
    /// Some alternative depends only on position or index
    Positional,
}

/// Declarative element selector with ordered fallbacks
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    /// Primary predicate first, then fallbacks in the order they are tried
    pub alternatives: Vec<Predicate>,
    pub pick: Pick,
}

impl Selector {
    pub fn new(primary: Predicate) -> Self {
        Self {
            alternatives: vec![primary],
            pick: Pick::Unique,
        }
    }

    /// Parse the canonical text form
    pub fn parse(input: &str) -> Result<Self, SelectorParseError> {
        parser::parse_selector(input)
    }

    pub fn with_fallback(mut self, fallback: Predicate) -> Self {
        self.alternatives.push(fallback);
        self
    }

    pub fn with_pick(mut self, pick: Pick) -> Self {
        self.pick = pick;
        self
    }

    pub fn primary(&self) -> Option<&Predicate> {
        self.alternatives.first()
    }

    pub fn stability(&self) -> SelectorStability {
        let positional = matches!(self.pick, Pick::Nth(_))
            || self.alternatives.iter().any(|alt| !alt.is_anchored());
        if positional {
            SelectorStability::Positional
        } else {
            SelectorStability::Stable
        }
    }

    /// Rewrite every string value, e.g. to substitute script variables
    pub fn map_values<F>(&self, f: F) -> Selector
    where
        F: Fn(&str) -> String,
    {
        Selector {
            alternatives: self.alternatives.iter().map(|p| p.map_values(&f)).collect(),
            pick: self.pick,
        }
    }

    /// Visit every string value in declaration order
    pub fn visit_values<F>(&self, mut f: F)
    where
        F: FnMut(&str),
    {
        for alt in &self.alternatives {
            alt.visit_values(&mut f);
        }
    }
}

impl FromStr for Selector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, alt) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" || ")?;
            }
            write!(f, "{alt}")?;
        }
        match self.pick {
            Pick::Unique => Ok(()),
            Pick::First => f.write_str(" @first"),
            Pick::Last => f.write_str(" @last"),
            Pick::Nth(n) => write!(f, " @nth={n}"),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Id(v) => write!(f, "id={}", Value(v)),
            Predicate::Role(v) => write!(f, "role={}", Value(v)),
            Predicate::Text { value, mode } => write!(f, "text{}{}", mode.operator(), Value(value)),
            Predicate::Enabled(b) => write!(f, "enabled={b}"),
            Predicate::Visible(b) => write!(f, "visible={b}"),
            Predicate::Has(inner) => write!(f, "has({inner})"),
            Predicate::Relative { relation, anchor } => write!(f, "{}({anchor})", relation.name()),
            Predicate::And(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" && ")?;
                    }
                    match item {
                        Predicate::And(_) | Predicate::Descendant { .. } => write!(f, "({item})")?,
                        _ => write!(f, "{item}")?,
                    }
                }
                Ok(())
            }
            Predicate::Descendant { ancestor, target } => {
                write!(f, "{ancestor} >> ")?;
                match target.as_ref() {
                    Predicate::Descendant { .. } => write!(f, "({target})"),
                    _ => write!(f, "{target}"),
                }
            }
        }
    }
}

/// Attribute value, quoted only when it is not a bare word
struct Value<'a>(&'a str);

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bare = !self.0.is_empty()
            && self.0.chars().all(parser::is_bare_char)
            && self.0 != "true"
            && self.0 != "false";
        if bare {
            return f.write_str(self.0);
        }
        f.write_str("\"")?;
        for c in self.0.chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                other => write!(f, "{other}")?,
            }
        }
        f.write_str("\"")
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Selector::parse(&raw).map_err(de::Error::custom)
    }
}
