// meta.rs — The producers/consumers/tags triple and its merge algebra.
//
// Producers and tags are plain string sets and accumulate by union.
// Consumers are special: the default is "anyone may receive this", which
// is modeled as a distinct Universal variant rather than an in-band magic
// element. On the wire Universal is spelled `["*"]`, and any incoming set
// containing the "*" marker normalizes to Universal, so `{"*"}` and
// `{"*", "x"}` denote the same value.

use std::collections::BTreeSet;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// The universal-consumer marker as it appears in serialized form and in
/// policy source text.
pub const UNIVERSAL_MARKER: &str = "*";

/// The set of consumers a value may flow to.
///
/// `Universal` means unrestricted — the set of all consumers. It is the
/// identity of intersection: `Universal ∩ x = x`, returned verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerSet {
    /// Unrestricted: any consumer may receive the value.
    Universal,
    /// Restricted to the named consumers.
    Named(BTreeSet<String>),
}

impl ConsumerSet {
    /// Build a named consumer set from string elements.
    ///
    /// If any element is the `"*"` marker the whole set normalizes to
    /// `Universal`.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for name in names {
            let name = name.into();
            if name == UNIVERSAL_MARKER {
                return ConsumerSet::Universal;
            }
            set.insert(name);
        }
        ConsumerSet::Named(set)
    }

    /// An empty (maximally restricted) consumer set.
    pub fn empty() -> Self {
        ConsumerSet::Named(BTreeSet::new())
    }

    pub fn is_universal(&self) -> bool {
        matches!(self, ConsumerSet::Universal)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ConsumerSet::Universal => false,
            ConsumerSet::Named(set) => set.is_empty(),
        }
    }

    /// Whether the named consumer is permitted by this set.
    pub fn contains(&self, name: &str) -> bool {
        match self {
            ConsumerSet::Universal => true,
            ConsumerSet::Named(set) => set.contains(name),
        }
    }

    /// Absorbing intersection: if either side is universal the other side
    /// is returned verbatim; otherwise true set intersection.
    pub fn intersect(&self, other: &ConsumerSet) -> ConsumerSet {
        match (self, other) {
            (ConsumerSet::Universal, x) => x.clone(),
            (x, ConsumerSet::Universal) => x.clone(),
            (ConsumerSet::Named(a), ConsumerSet::Named(b)) => {
                ConsumerSet::Named(a.intersection(b).cloned().collect())
            }
        }
    }

    /// Union. Universal absorbs everything.
    pub fn union(&self, other: &ConsumerSet) -> ConsumerSet {
        match (self, other) {
            (ConsumerSet::Universal, _) | (_, ConsumerSet::Universal) => ConsumerSet::Universal,
            (ConsumerSet::Named(a), ConsumerSet::Named(b)) => {
                ConsumerSet::Named(a.union(b).cloned().collect())
            }
        }
    }

    /// Set difference. Removing named elements from the universal set is a
    /// no-op (the complement is not representable) — policies that need to
    /// restrict a universal consumer set must assign or intersect instead.
    pub fn difference(&self, other: &ConsumerSet) -> ConsumerSet {
        match (self, other) {
            (_, ConsumerSet::Universal) => ConsumerSet::empty(),
            (ConsumerSet::Universal, ConsumerSet::Named(_)) => ConsumerSet::Universal,
            (ConsumerSet::Named(a), ConsumerSet::Named(b)) => {
                ConsumerSet::Named(a.difference(b).cloned().collect())
            }
        }
    }

    /// Symmetric difference, with the same non-representability caveat as
    /// [`ConsumerSet::difference`] when exactly one side is universal.
    pub fn symmetric_difference(&self, other: &ConsumerSet) -> ConsumerSet {
        match (self, other) {
            (ConsumerSet::Universal, ConsumerSet::Universal) => ConsumerSet::empty(),
            (ConsumerSet::Universal, ConsumerSet::Named(_))
            | (ConsumerSet::Named(_), ConsumerSet::Universal) => ConsumerSet::Universal,
            (ConsumerSet::Named(a), ConsumerSet::Named(b)) => {
                ConsumerSet::Named(a.symmetric_difference(b).cloned().collect())
            }
        }
    }

    /// The named elements, or `None` for the universal set.
    pub fn names(&self) -> Option<&BTreeSet<String>> {
        match self {
            ConsumerSet::Universal => None,
            ConsumerSet::Named(set) => Some(set),
        }
    }

    /// Whether the two sets share any consumer. The universal set overlaps
    /// anything non-empty.
    pub fn overlaps(&self, other: &ConsumerSet) -> bool {
        !self.intersect(other).is_empty()
    }
}

impl Default for ConsumerSet {
    fn default() -> Self {
        ConsumerSet::Universal
    }
}

// Wire form: a plain string list, Universal spelled ["*"].
impl Serialize for ConsumerSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConsumerSet::Universal => serializer.collect_seq([UNIVERSAL_MARKER]),
            ConsumerSet::Named(set) => serializer.collect_seq(set),
        }
    }
}

impl<'de> Deserialize<'de> for ConsumerSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        Ok(ConsumerSet::from_names(names))
    }
}

/// The metadata triple attached to every interpreter-tracked value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Which tools (or models) produced this value.
    #[serde(default)]
    pub producers: BTreeSet<String>,
    /// Which consumers may receive this value. Defaults to universal.
    #[serde(default)]
    pub consumers: ConsumerSet,
    /// Free-form classification labels.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Metadata {
    /// Fresh metadata: no producers, no tags, universal consumers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor from iterators of names.
    pub fn with<P, C, T>(producers: P, consumers: C, tags: T) -> Self
    where
        P: IntoIterator<Item = String>,
        C: IntoIterator<Item = String>,
        T: IntoIterator<Item = String>,
    {
        Metadata {
            producers: producers.into_iter().collect(),
            consumers: ConsumerSet::from_names(consumers),
            tags: tags.into_iter().collect(),
        }
    }

    /// Merge two metadata triples: producers and tags union, consumers
    /// intersect under the universal-absorption rule.
    pub fn merge(&self, other: &Metadata) -> Metadata {
        Metadata {
            producers: self.producers.union(&other.producers).cloned().collect(),
            consumers: self.consumers.intersect(&other.consumers),
            tags: self.tags.union(&other.tags).cloned().collect(),
        }
    }

    /// N-ary merge, folding pairwise. The fold identity is fresh metadata
    /// (empty producers/tags, universal consumers), so merging zero parents
    /// yields the default.
    pub fn merge_all<'a, I>(parents: I) -> Metadata
    where
        I: IntoIterator<Item = &'a Metadata>,
    {
        parents
            .into_iter()
            .fold(Metadata::new(), |acc, m| acc.merge(m))
    }

    /// Whether every field is at its default (nothing tracked yet).
    pub fn is_default(&self) -> bool {
        self.producers.is_empty() && self.tags.is_empty() && self.consumers.is_universal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(producers: &[&str], consumers: &[&str], tags: &[&str]) -> Metadata {
        Metadata::with(
            producers.iter().map(|s| s.to_string()),
            consumers.iter().map(|s| s.to_string()),
            tags.iter().map(|s| s.to_string()),
        )
    }

    #[test]
    fn default_is_empty_producers_universal_consumers() {
        let m = Metadata::new();
        assert!(m.producers.is_empty());
        assert!(m.tags.is_empty());
        assert!(m.consumers.is_universal());
        assert!(m.is_default());
    }

    #[test]
    fn marker_normalizes_to_universal() {
        assert!(ConsumerSet::from_names(["*"]).is_universal());
        // Extra elements alongside the marker do not narrow it.
        assert!(ConsumerSet::from_names(["*", "x"]).is_universal());
        assert!(!ConsumerSet::from_names(["x"]).is_universal());
    }

    #[test]
    fn universal_absorbs_in_intersection() {
        let named = ConsumerSet::from_names(["a", "b"]);
        assert_eq!(ConsumerSet::Universal.intersect(&named), named);
        assert_eq!(named.intersect(&ConsumerSet::Universal), named);
        assert_eq!(
            ConsumerSet::Universal.intersect(&ConsumerSet::Universal),
            ConsumerSet::Universal
        );
    }

    #[test]
    fn named_intersection_is_true_intersection() {
        let a = ConsumerSet::from_names(["a", "b"]);
        let b = ConsumerSet::from_names(["b", "c"]);
        assert_eq!(a.intersect(&b), ConsumerSet::from_names(["b"]));
    }

    #[test]
    fn difference_from_universal_is_noop() {
        let named = ConsumerSet::from_names(["x"]);
        assert_eq!(ConsumerSet::Universal.difference(&named), ConsumerSet::Universal);
        assert_eq!(named.difference(&ConsumerSet::Universal), ConsumerSet::empty());
    }

    #[test]
    fn merge_unions_producers_and_tags() {
        let a = meta(&["p1"], &["c1", "c2"], &["t1"]);
        let b = meta(&["p2"], &["c2", "c3"], &["t2"]);
        let merged = a.merge(&b);
        assert_eq!(
            merged.producers,
            ["p1", "p2"].iter().map(|s| s.to_string()).collect()
        );
        assert_eq!(
            merged.tags,
            ["t1", "t2"].iter().map(|s| s.to_string()).collect()
        );
        assert_eq!(merged.consumers, ConsumerSet::from_names(["c2"]));
    }

    #[test]
    fn merge_is_commutative() {
        let samples = [
            meta(&["p1"], &["c1"], &["t1"]),
            meta(&["p2"], &["*"], &["t2", "t3"]),
            meta(&[], &["c1", "c2"], &[]),
        ];
        for a in &samples {
            for b in &samples {
                assert_eq!(a.merge(b), b.merge(a));
            }
        }
    }

    #[test]
    fn merge_is_associative() {
        let a = meta(&["p1"], &["c1", "c2"], &["t1"]);
        let b = meta(&["p2"], &["*"], &["t2"]);
        let c = meta(&["p3"], &["c2", "c3"], &["t3"]);
        assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn merge_is_idempotent() {
        let a = meta(&["p1"], &["c1"], &["t1"]);
        assert_eq!(a.merge(&a), a);
        assert_eq!(a.merge(&a).merge(&a), a);
    }

    #[test]
    fn merge_all_folds_parents() {
        let parents = vec![
            meta(&["p1"], &["c1", "c2"], &["t1"]),
            meta(&["p2"], &["c2", "c3"], &["t2"]),
            meta(&["p3"], &["*"], &["t3"]),
        ];
        let merged = Metadata::merge_all(&parents);
        assert_eq!(merged.producers.len(), 3);
        assert_eq!(merged.tags.len(), 3);
        // c1∩c2 absorbed through the universal third parent → {"c2"}.
        assert_eq!(merged.consumers, ConsumerSet::from_names(["c2"]));
    }

    #[test]
    fn merge_all_of_nothing_is_default() {
        let merged = Metadata::merge_all(std::iter::empty());
        assert!(merged.is_default());
    }

    #[test]
    fn serde_round_trip_preserves_universal() {
        let m = meta(&["p"], &["*"], &["t"]);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"*\""));
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn serde_round_trip_named_consumers() {
        let m = meta(&["p"], &["alice", "bob"], &[]);
        let json = serde_json::to_string(&m).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let m: Metadata = serde_json::from_str("{}").unwrap();
        assert!(m.is_default());
    }
}
