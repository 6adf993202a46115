//! The user's restriction selection.
//!
//! A selection is four sets of opaque targets. It is always replaced
//! wholesale: editors build a new value and hand it to the shared store,
//! never patch the stored one.

mod bundle;

pub use bundle::{decode, encode, SelectionDecodeError, SELECTION_VERSION};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::target::{RestrictionTarget, TargetKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionSelection {
    #[serde(default)]
    pub apps: BTreeSet<RestrictionTarget>,
    #[serde(default)]
    pub app_categories: BTreeSet<RestrictionTarget>,
    #[serde(default)]
    pub domains: BTreeSet<RestrictionTarget>,
    #[serde(default)]
    pub domain_categories: BTreeSet<RestrictionTarget>,
}

impl RestrictionSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, kind: TargetKind) -> &BTreeSet<RestrictionTarget> {
        match kind {
            TargetKind::App => &self.apps,
            TargetKind::AppCategory => &self.app_categories,
            TargetKind::Domain => &self.domains,
            TargetKind::DomainCategory => &self.domain_categories,
        }
    }

    pub fn set_mut(&mut self, kind: TargetKind) -> &mut BTreeSet<RestrictionTarget> {
        match kind {
            TargetKind::App => &mut self.apps,
            TargetKind::AppCategory => &mut self.app_categories,
            TargetKind::Domain => &mut self.domains,
            TargetKind::DomainCategory => &mut self.domain_categories,
        }
    }

    /// Builder-style insert, handy for tests and the CLI.
    pub fn with(mut self, kind: TargetKind, target: RestrictionTarget) -> Self {
        self.insert(kind, target);
        self
    }

    pub fn insert(&mut self, kind: TargetKind, target: RestrictionTarget) -> bool {
        self.set_mut(kind).insert(target)
    }

    pub fn is_empty(&self) -> bool {
        TargetKind::ALL.iter().all(|k| self.set(*k).is_empty())
    }

    /// Total entries across all four sets.
    pub fn len(&self) -> usize {
        TargetKind::ALL.iter().map(|k| self.set(*k).len()).sum()
    }

    pub fn contains(&self, target: &RestrictionTarget) -> bool {
        TargetKind::ALL.iter().any(|k| self.set(*k).contains(target))
    }

    pub fn iter(&self) -> impl Iterator<Item = (TargetKind, &RestrictionTarget)> + '_ {
        TargetKind::ALL
            .into_iter()
            .flat_map(move |k| self.set(k).iter().map(move |t| (k, t)))
    }

    /// Union of the four sets.
    pub fn all_targets(&self) -> BTreeSet<RestrictionTarget> {
        self.iter().map(|(_, t)| t.clone()).collect()
    }

    /// The selection with every exempt target removed from every set.
    pub fn without(&self, exempt: &BTreeSet<RestrictionTarget>) -> RestrictionSelection {
        let keep = |set: &BTreeSet<RestrictionTarget>| -> BTreeSet<RestrictionTarget> {
            set.difference(exempt).cloned().collect()
        };
        RestrictionSelection {
            apps: keep(&self.apps),
            app_categories: keep(&self.app_categories),
            domains: keep(&self.domains),
            domain_categories: keep(&self.domain_categories),
        }
    }

    /// Targets present here but absent from `next`.
    pub fn dropped_in(&self, next: &RestrictionSelection) -> BTreeSet<RestrictionTarget> {
        self.all_targets()
            .difference(&next.all_targets())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> RestrictionTarget {
        RestrictionTarget::from_bytes(s.as_bytes())
    }

    #[test]
    fn without_removes_exempt_from_every_set() {
        let sel = RestrictionSelection::new()
            .with(TargetKind::App, t("a"))
            .with(TargetKind::App, t("b"))
            .with(TargetKind::DomainCategory, t("a"))
            .with(TargetKind::Domain, t("d"));
        let exempt: BTreeSet<_> = [t("a")].into_iter().collect();

        let restricted = sel.without(&exempt);
        assert_eq!(restricted.apps.len(), 1);
        assert!(restricted.domain_categories.is_empty());
        assert!(restricted.domains.contains(&t("d")));
        assert!(!restricted.contains(&t("a")));
    }

    #[test]
    fn all_targets_is_a_union() {
        let sel = RestrictionSelection::new()
            .with(TargetKind::App, t("a"))
            .with(TargetKind::AppCategory, t("a"))
            .with(TargetKind::Domain, t("x"));
        assert_eq!(sel.len(), 3);
        assert_eq!(sel.all_targets().len(), 2);
    }

    #[test]
    fn dropped_in_lists_removed_targets() {
        let before = RestrictionSelection::new()
            .with(TargetKind::App, t("a"))
            .with(TargetKind::App, t("b"));
        let after = RestrictionSelection::new().with(TargetKind::App, t("b"));
        let dropped = before.dropped_in(&after);
        assert_eq!(dropped.into_iter().collect::<Vec<_>>(), vec![t("a")]);
    }

    #[test]
    fn empty_selection() {
        let sel = RestrictionSelection::new();
        assert!(sel.is_empty());
        assert_eq!(sel.len(), 0);
        assert!(sel.without(&BTreeSet::new()).is_empty());
    }
}
