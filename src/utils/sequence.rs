//! Ordering of sibling nodes by their sequence suffix.
//!
//! Sequential node names end in a decimal counter generated by the service.
//! Queue order must follow the numeric value of that counter, so names are
//! never compared as plain strings.

use std::cmp::Ordering;
use std::fmt;

/// Parse the trailing decimal counter of a sequential node name.
///
/// Leading zeros are irrelevant: `"0000000042"`, `"lock-42"` and
/// `"lock-00042"` all yield 42. Returns `None` when the name has no trailing
/// digits or the counter does not fit in a `u64`.
pub fn parse_sequence(name: &str) -> Option<u64> {
    let digits_start = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    name[digits_start..].parse().ok()
}

/// Compare two sibling names by sequence number, ascending.
///
/// Names without a sequence sort after all sequenced names. Equal sequence
/// numbers fall back to the full name so distinct nodes never compare equal.
pub fn compare_sequence(
    a: &str,
    b: &str,
) -> Ordering {
    match (parse_sequence(a), parse_sequence(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Sibling node name ordered by [`compare_sequence`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceName {
    name: String,
    sequence: Option<u64>,
}

impl SequenceName {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let sequence = parse_sequence(&name);
        Self { name, sequence }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }
}

impl Ord for SequenceName {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        match (self.sequence, other.sequence) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| self.name.cmp(&other.name)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.name.cmp(&other.name),
        }
    }
}

impl PartialOrd for SequenceName {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SequenceName {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for SequenceName {
    fn from(name: &str) -> Self {
        SequenceName::new(name)
    }
}

impl From<String> for SequenceName {
    fn from(name: String) -> Self {
        SequenceName::new(name)
    }
}
