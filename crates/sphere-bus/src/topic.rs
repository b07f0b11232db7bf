//! # Topic Filters
//!
//! Broker-side routing rules: which concrete topics a subscription filter
//! receives. Exact placeholder extraction is not done here; the broker only
//! needs to route every topic that *could* match.

use crate::error::TransportError;
use crate::{MULTI_LEVEL_WILDCARD, SINGLE_LEVEL_WILDCARD, TOPIC_SEPARATOR};

/// Check if a concrete topic is routed to a subscription filter.
///
/// `+` matches exactly one level, `#` matches the remaining levels
/// (including none, so `a/#` matches `a`).
#[must_use]
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split(TOPIC_SEPARATOR);
    let mut topic_levels = topic.split(TOPIC_SEPARATOR);

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some(MULTI_LEVEL_WILDCARD), _) => return true,
            (Some(SINGLE_LEVEL_WILDCARD), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Validate a subscription filter.
///
/// Wildcards must occupy a whole level and `#` may only appear last.
pub fn validate_filter(filter: &str) -> Result<(), TransportError> {
    if filter.is_empty() {
        return Err(TransportError::invalid_topic(filter, "filter is empty"));
    }

    let levels: Vec<&str> = filter.split(TOPIC_SEPARATOR).collect();
    let last = levels.len() - 1;

    for (index, level) in levels.iter().enumerate() {
        if *level == MULTI_LEVEL_WILDCARD && index != last {
            return Err(TransportError::invalid_topic(
                filter,
                "'#' is only allowed as the last level",
            ));
        }
        if level.len() > 1 && (level.contains('+') || level.contains('#')) {
            return Err(TransportError::invalid_topic(
                filter,
                "wildcards must occupy a whole level",
            ));
        }
    }

    Ok(())
}

/// Validate a topic used for publishing. Wildcards are not allowed.
pub fn validate_publish_topic(topic: &str) -> Result<(), TransportError> {
    if topic.is_empty() {
        return Err(TransportError::invalid_topic(topic, "topic is empty"));
    }
    if topic.contains('+') || topic.contains('#') {
        return Err(TransportError::invalid_topic(
            topic,
            "wildcards are not allowed when publishing",
        ));
    }
    Ok(())
}
