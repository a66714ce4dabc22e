//! Tag-branded monotonic identifiers
//!
//! Window keys, toast keys and mutation versions are all drawn from a
//! [`SequenceGenerator`]. The tag lives only in the type, so a window key
//! can never be compared with a toast key:
//!
//! ```compile_fail
//! use compass_navigator::navigator::{make_sequence, ToastTag, WindowTag};
//!
//! let windows = make_sequence::<WindowTag>();
//! let toasts = make_sequence::<ToastTag>();
//! assert!(windows.next() < toasts.next());
//! ```

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Marker for a sequence namespace
pub trait SequenceTag: 'static {
    const NAME: &'static str;
}

/// Namespace for window keys
#[derive(Debug, Clone, Copy)]
pub enum WindowTag {}

impl SequenceTag for WindowTag {
    const NAME: &'static str = "Window";
}

/// Namespace for toast keys
#[derive(Debug, Clone, Copy)]
pub enum ToastTag {}

impl SequenceTag for ToastTag {
    const NAME: &'static str = "Toast";
}

/// Namespace for imperative object mutation versions
#[derive(Debug, Clone, Copy)]
pub enum MutationTag {}

impl SequenceTag for MutationTag {
    const NAME: &'static str = "Mutation";
}

/// Opaque token, unique and strictly increasing within its tag namespace
pub struct Sequence<Tag> {
    value: u64,
    _tag: PhantomData<fn() -> Tag>,
}

impl<Tag> Sequence<Tag> {
    fn from_raw(value: u64) -> Self {
        Self {
            value,
            _tag: PhantomData,
        }
    }

    /// Allocation index of this token (starts at 1)
    pub fn get(&self) -> u64 {
        self.value
    }
}

// Manual impls: derives would put bounds on `Tag`, which is uninhabited.
impl<Tag> Clone for Sequence<Tag> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Tag> Copy for Sequence<Tag> {}

impl<Tag> PartialEq for Sequence<Tag> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<Tag> Eq for Sequence<Tag> {}

impl<Tag> PartialOrd for Sequence<Tag> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Tag> Ord for Sequence<Tag> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<Tag> Hash for Sequence<Tag> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<Tag: SequenceTag> fmt::Debug for Sequence<Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", Tag::NAME, self.value)
    }
}

impl<Tag: SequenceTag> fmt::Display for Sequence<Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", Tag::NAME, self.value)
    }
}

impl<Tag> Serialize for Sequence<Tag> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.value)
    }
}

/// Per-tag counter handing out [`Sequence`] tokens
pub struct SequenceGenerator<Tag> {
    counter: AtomicU64,
    _tag: PhantomData<fn() -> Tag>,
}

impl<Tag: SequenceTag> SequenceGenerator<Tag> {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            _tag: PhantomData,
        }
    }

    /// Allocate the next token. Never reuses a value.
    pub fn next(&self) -> Sequence<Tag> {
        let value = self.counter.fetch_add(1, AtomicOrdering::Relaxed) + 1;
        Sequence::from_raw(value)
    }
}

impl<Tag: SequenceTag> Default for SequenceGenerator<Tag> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tag: SequenceTag> fmt::Debug for SequenceGenerator<Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceGenerator")
            .field("tag", &Tag::NAME)
            .field("allocated", &self.counter.load(AtomicOrdering::Relaxed))
            .finish()
    }
}

/// Create a fresh generator for `Tag`
pub fn make_sequence<Tag: SequenceTag>() -> SequenceGenerator<Tag> {
    SequenceGenerator::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ten_thousand_tokens_strictly_increase() {
        let generator = make_sequence::<WindowTag>();
        let tokens: Vec<_> = (0..10_000).map(|_| generator.next()).collect();

        for pair in tokens.windows(2) {
            assert!(pair[0] < pair[1]);
        }

        let distinct: HashSet<_> = tokens.iter().copied().collect();
        assert_eq!(distinct.len(), 10_000);
    }

    #[test]
    fn test_generators_are_independent() {
        let first = make_sequence::<ToastTag>();
        let second = make_sequence::<ToastTag>();

        assert_eq!(first.next().get(), 1);
        assert_eq!(first.next().get(), 2);
        assert_eq!(second.next().get(), 1);
    }

    #[test]
    fn test_display_includes_tag_name() {
        let generator = make_sequence::<MutationTag>();
        let token = generator.next();
        assert_eq!(token.to_string(), "Mutation#1");
        assert_eq!(format!("{:?}", token), "Mutation#1");
    }

    #[test]
    fn test_serializes_as_number() {
        let generator = make_sequence::<WindowTag>();
        generator.next();
        let token = generator.next();
        assert_eq!(serde_json::to_string(&token).unwrap(), "2");
    }
}
