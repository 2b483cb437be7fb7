use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// Longest routing key the bus accepts, matching the AMQP field limit.
const MAX_KEY_LENGTH: usize = 255;

/// A validated dot-separated routing key, e.g. `order.item.created`.
///
/// Keys are plain words joined by dots. Wildcard characters are only
/// meaningful in [`BindingPattern`]s and are rejected here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Parses and validates a routing key.
    pub fn parse(key: impl Into<String>) -> Result<Self, BusError> {
        let key = key.into();
        let invalid = |reason: &str| BusError::InvalidRoutingKey {
            key: key.clone(),
            reason: reason.to_string(),
        };

        if key.is_empty() {
            return Err(invalid("key is empty"));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(invalid("key exceeds 255 bytes"));
        }
        for segment in key.split('.') {
            if segment.is_empty() {
                return Err(invalid("empty segment"));
            }
            if segment.contains(['*', '#']) {
                return Err(invalid("wildcards are not allowed in routing keys"));
            }
        }

        Ok(Self(key))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the dot-separated segments of the key.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RoutingKey {
    type Error = BusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoutingKey> for String {
    fn from(key: RoutingKey) -> Self {
        key.0
    }
}

/// One segment of a parsed binding pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    /// Matches the identical key segment.
    Literal(String),
    /// `*`: matches exactly one key segment.
    SingleWildcard,
    /// `#`: matches zero or more key segments.
    MultiWildcard,
}

/// A topic binding pattern with AMQP wildcard semantics.
///
/// `*` substitutes for exactly one segment, `#` for zero or more, and
/// either may appear anywhere in the pattern:
///
/// - `order.#` matches `order`, `order.created` and `order.item.created`
/// - `*.created` matches `order.created` but not `order.item.created`
/// - `#` matches every key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BindingPattern {
    raw: String,
    segments: Vec<PatternSegment>,
}

impl BindingPattern {
    /// Parses and validates a binding pattern.
    pub fn parse(pattern: impl Into<String>) -> Result<Self, BusError> {
        let raw = pattern.into();
        let invalid = |reason: &str| BusError::InvalidPattern {
            pattern: raw.clone(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("pattern is empty"));
        }
        if raw.len() > MAX_KEY_LENGTH {
            return Err(invalid("pattern exceeds 255 bytes"));
        }

        let mut segments = Vec::new();
        for segment in raw.split('.') {
            let parsed = match segment {
                "" => return Err(invalid("empty segment")),
                "*" => PatternSegment::SingleWildcard,
                "#" => PatternSegment::MultiWildcard,
                literal => {
                    if literal.contains(['*', '#']) {
                        return Err(invalid("wildcard must be a whole segment"));
                    }
                    PatternSegment::Literal(literal.to_string())
                }
            };
            segments.push(parsed);
        }

        Ok(Self { raw, segments })
    }

    /// Returns the pattern as originally written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Checks whether a routing key matches this pattern.
    pub fn matches(&self, key: &RoutingKey) -> bool {
        let key_segments: Vec<&str> = key.segments().collect();
        Self::matches_segments(&self.segments, &key_segments)
    }

    fn matches_segments(pattern: &[PatternSegment], key: &[&str]) -> bool {
        match pattern.split_first() {
            None => key.is_empty(),
            Some((PatternSegment::Literal(literal), rest)) => key
                .split_first()
                .is_some_and(|(head, tail)| literal == head && Self::matches_segments(rest, tail)),
            Some((PatternSegment::SingleWildcard, rest)) => key
                .split_first()
                .is_some_and(|(_, tail)| Self::matches_segments(rest, tail)),
            Some((PatternSegment::MultiWildcard, rest)) => {
                // Match zero segments here, or swallow one and stay on
                // the wildcard for the next.
                Self::matches_segments(rest, key)
                    || key
                        .split_first()
                        .is_some_and(|(_, tail)| Self::matches_segments(pattern, tail))
            }
        }
    }
}

impl std::fmt::Display for BindingPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl TryFrom<String> for BindingPattern {
    type Error = BusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<BindingPattern> for String {
    fn from(pattern: BindingPattern) -> Self {
        pattern.raw
    }
}
