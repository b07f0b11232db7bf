//! # Topic Templates
//!
//! Topics with named placeholders, e.g. `$device/:id/channel/:channel`.
//!
//! A template is subscribed at the broker with every placeholder replaced by
//! the single-level wildcard, and each delivered topic is then matched
//! against the template to extract the placeholder values:
//!
//! ```text
//! template   $device/:id/channel/:channel
//! filter     $device/+/channel/+
//! topic      $device/42/channel/motion  =>  {id: "42", channel: "motion"}
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use sphere_bus::{MULTI_LEVEL_WILDCARD, SINGLE_LEVEL_WILDCARD, TOPIC_SEPARATOR};

use crate::error::ConfigurationError;
use crate::PLACEHOLDER_PREFIX;

/// Placeholder name to captured topic segment.
pub type TopicValues = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed topic template. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicTemplate {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` for an empty template, a bare `:` segment, a
    /// placeholder name used twice, or a literal segment holding `+` or `#`.
    pub fn parse(template: &str) -> Result<Self, ConfigurationError> {
        if template.is_empty() {
            return Err(ConfigurationError::EmptyTemplate);
        }

        let mut seen = HashSet::new();
        let mut segments = Vec::new();

        for (position, part) in template.split(TOPIC_SEPARATOR).enumerate() {
            let Some(name) = part.strip_prefix(PLACEHOLDER_PREFIX) else {
                if part.contains(SINGLE_LEVEL_WILDCARD) || part.contains(MULTI_LEVEL_WILDCARD) {
                    return Err(ConfigurationError::WildcardInTemplate {
                        template: template.to_string(),
                        position,
                    });
                }
                segments.push(Segment::Literal(part.to_string()));
                continue;
            };
            if name.is_empty() {
                return Err(ConfigurationError::EmptyPlaceholder {
                    template: template.to_string(),
                    position,
                });
            }
            if !seen.insert(name) {
                return Err(ConfigurationError::DuplicatePlaceholder {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }
            segments.push(Segment::Placeholder(name.to_string()));
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    /// Match a concrete topic.
    ///
    /// Succeeds only when the segment counts are equal and every literal
    /// segment is byte-for-byte equal. Each placeholder captures exactly one
    /// segment.
    #[must_use]
    pub fn matches(&self, topic: &str) -> Option<TopicValues> {
        let mut values = TopicValues::new();
        let mut parts = topic.split(TOPIC_SEPARATOR);

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if literal != part => return None,
                Segment::Literal(_) => {}
                Segment::Placeholder(name) => {
                    values.insert(name.clone(), part.to_string());
                }
            }
        }

        // Longer topics never match
        if parts.next().is_some() {
            return None;
        }
        Some(values)
    }

    /// The broker filter routing every topic this template can match.
    #[must_use]
    pub fn to_broker_filter(&self) -> String {
        let parts: Vec<&str> = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(literal) => literal.as_str(),
                Segment::Placeholder(_) => SINGLE_LEVEL_WILDCARD,
            })
            .collect();
        parts.join(&TOPIC_SEPARATOR.to_string())
    }

    /// Placeholder names in template order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    #[must_use]
    pub fn has_placeholders(&self) -> bool {
        self.placeholders().next().is_some()
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for TopicTemplate {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TopicTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
