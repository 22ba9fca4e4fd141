#![deny(warnings)]

//! Batch aggregation of independent site calculations.
//!
//! A batch holds one entry per scanned site, each with its own supply
//! values. Entries are computed independently, so recomputation order does
//! not matter; totals are derived from the per-entry results on demand and
//! never maintained incrementally.

use prod_core::{ActiveEffect, Group, ResourceId, ResourceSet, Site, SiteCategory, SiteId};
use prod_engine::{convert_from, CalcError, ForwardResult, SiteSession, YieldRates};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// One scanned site in the batch with its own inputs and latest results.
#[derive(Clone, Debug)]
pub struct BatchEntry {
    site: Site,
    group: Option<Group>,
    supply: BTreeMap<ResourceId, String>,
    produced: ResourceSet,
    leftover: ResourceSet,
}

impl BatchEntry {
    /// The entry's site.
    pub fn site(&self) -> &Site {
        &self.site
    }

    /// The owning group, when the site has one.
    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    /// Stored supply values for this entry.
    pub fn supply(&self) -> &BTreeMap<ResourceId, String> {
        &self.supply
    }

    /// Output from the latest recomputation. Extractive entries carry their
    /// seeded fixed output from the moment they are added.
    pub fn produced(&self) -> &ResourceSet {
        &self.produced
    }

    /// Unconsumed supply from the latest recomputation.
    pub fn leftover(&self) -> &ResourceSet {
        &self.leftover
    }
}

/// Merged totals across the whole batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchTotals {
    /// Sum of every entry's produced output.
    pub produced: ResourceSet,
    /// Summed required inputs. Stays empty while the batch runs forward
    /// calculations only.
    pub required: ResourceSet,
    /// Sum of every entry's unconsumed leftover.
    pub leftover: ResourceSet,
}

/// Result of one batch recomputation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Per-site results keyed by site id.
    pub per_entry: BTreeMap<SiteId, ForwardResult>,
    /// Merged totals across all entries.
    pub totals: BatchTotals,
}

/// An ordered collection of per-site forward calculations sharing one set
/// of active effects and one rate table.
#[derive(Clone, Debug)]
pub struct Batch {
    effects: Vec<ActiveEffect>,
    rates: YieldRates,
    entries: Vec<BatchEntry>,
    totals: Option<BatchTotals>,
}

impl Batch {
    /// Opens an empty batch under the given effects and rates.
    pub fn new(effects: Vec<ActiveEffect>, rates: YieldRates) -> Self {
        Self {
            effects,
            rates,
            entries: Vec::new(),
            totals: None,
        }
    }

    /// Entries in scan order.
    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    /// Number of scanned sites.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been scanned yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a site is already part of the batch.
    pub fn contains(&self, site_id: SiteId) -> bool {
        self.entries.iter().any(|e| e.site.id == site_id)
    }

    /// Totals of the latest recomputation. `None` after any mutation until
    /// [`Batch::recompute`] runs again.
    pub fn totals(&self) -> Option<&BatchTotals> {
        self.totals.as_ref()
    }

    /// Appends a scanned site. Scanning the same tag twice is a no-op and
    /// returns `false`. Extractive entries are seeded with their
    /// bonus-adjusted fixed output immediately; processing entries stay
    /// empty until the next recomputation.
    pub fn add_entry(&mut self, site: Site, group: Option<Group>) -> Result<bool, CalcError> {
        self.push_entry(site, group, BTreeMap::new())
    }

    /// Promotes a single-site session into the batch, carrying over its
    /// pending supply entries.
    pub fn adopt_session(&mut self, session: &SiteSession) -> Result<bool, CalcError> {
        self.push_entry(
            session.site().clone(),
            session.group().cloned(),
            session.supply().clone(),
        )
    }

    fn push_entry(
        &mut self,
        site: Site,
        group: Option<Group>,
        supply: BTreeMap<ResourceId, String>,
    ) -> Result<bool, CalcError> {
        if site.category == SiteCategory::Processing && site.formulas.is_empty() {
            return Err(CalcError::NoFormulas);
        }
        if self.contains(site.id) {
            debug!(site = site.id.0, "tag already scanned; ignoring duplicate");
            return Ok(false);
        }
        let seeded = if site.category == SiteCategory::Extractive {
            convert_from(&site, group.as_ref(), &self.effects, &self.rates, &supply)?
        } else {
            ForwardResult::default()
        };
        self.entries.push(BatchEntry {
            site,
            group,
            supply,
            produced: seeded.produced,
            leftover: seeded.leftover,
        });
        self.totals = None;
        Ok(true)
    }

    /// Removes a site from the batch. Returns whether it was present.
    pub fn remove_entry(&mut self, site_id: SiteId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.site.id != site_id);
        if self.entries.len() == before {
            return false;
        }
        self.totals = None;
        true
    }

    /// Drops every entry and the cached totals.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.totals = None;
    }

    /// Updates one stored supply value. Takes effect on the next
    /// recomputation; returns whether the site was found.
    pub fn set_entry_input(
        &mut self,
        site_id: SiteId,
        resource: ResourceId,
        value: impl Into<String>,
    ) -> bool {
        match self.entries.iter_mut().find(|e| e.site.id == site_id) {
            Some(entry) => {
                entry.supply.insert(resource, value.into());
                self.totals = None;
                true
            }
            None => false,
        }
    }

    /// Recomputes every entry from its own site, group, and inputs, stores
    /// the results on the entries, and derives fresh totals.
    ///
    /// Entries with nothing entered contribute empty results rather than an
    /// error; the batch view stays quiet about sites the user has not
    /// filled in yet. Recomputing twice without edits yields equal reports.
    pub fn recompute(&mut self) -> BatchReport {
        let mut report = BatchReport::default();
        for entry in &mut self.entries {
            let result = match convert_from(
                &entry.site,
                entry.group.as_ref(),
                &self.effects,
                &self.rates,
                &entry.supply,
            ) {
                Ok(result) => result,
                Err(CalcError::EmptyRequest) => ForwardResult::default(),
                Err(CalcError::NoFormulas) => {
                    debug!(site = entry.site.id.0, "entry lost its formulas; contributing nothing");
                    ForwardResult::default()
                }
            };
            entry.produced = result.produced.clone();
            entry.leftover = result.leftover.clone();
            report.totals.produced = report.totals.produced.merge(&result.produced, 1).normalized();
            report.totals.leftover = report.totals.leftover.merge(&result.leftover, 1).normalized();
            report.per_entry.insert(entry.site.id, result);
        }
        self.totals = Some(report.totals.clone());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prod_core::{EffectKind, EffectTarget, Formula, GroupId};
    use proptest::prelude::*;

    fn set(pairs: &[(&str, i64)]) -> ResourceSet {
        ResourceSet::from_counts(pairs.iter().map(|(id, count)| (*id, *count)))
    }

    fn sawmill(id: u64) -> Site {
        Site {
            id: SiteId(id),
            name: "Sawmill".to_string(),
            category: SiteCategory::Processing,
            tier: 2,
            bonus_tier_unlocked: false,
            formulas: vec![Formula {
                inputs: set(&[("wood", 2)]),
                outputs: set(&[("plank", 1)]),
                output_cap: set(&[("plank", 5)]),
            }],
            fixed_outputs: ResourceSet::new(),
        }
    }

    fn mine() -> Site {
        Site {
            id: SiteId(7),
            name: "Mine".to_string(),
            category: SiteCategory::Extractive,
            tier: 1,
            bonus_tier_unlocked: false,
            formulas: vec![],
            fixed_outputs: set(&[("ore", 10)]),
        }
    }

    fn smiths() -> Group {
        Group {
            id: GroupId(12),
            name: "Smiths".to_string(),
        }
    }

    fn extraction_effect() -> ActiveEffect {
        ActiveEffect {
            kind: EffectKind::HigherExtractionYield,
            targets: vec![EffectTarget::Id(GroupId(12))],
        }
    }

    #[test]
    fn batch_merges_extraction_and_processing() {
        let mut batch = Batch::new(vec![extraction_effect()], YieldRates::default());
        batch.add_entry(mine(), Some(smiths())).unwrap();
        batch.add_entry(sawmill(101), None).unwrap();
        batch.set_entry_input(SiteId(101), ResourceId::new("wood"), "13");

        let report = batch.recompute();
        assert_eq!(report.per_entry.len(), 2);
        assert_eq!(report.totals.produced, set(&[("ore", 12), ("plank", 5)]));
        assert_eq!(report.totals.leftover, set(&[("wood", 3)]));
        assert!(report.totals.required.is_empty());
    }

    #[test]
    fn duplicate_scan_is_ignored() {
        let mut batch = Batch::new(vec![], YieldRates::default());
        assert!(batch.add_entry(mine(), None).unwrap());
        assert!(!batch.add_entry(mine(), None).unwrap());
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn add_rejects_processing_without_formulas() {
        let mut site = sawmill(101);
        site.formulas.clear();
        let mut batch = Batch::new(vec![], YieldRates::default());
        assert_eq!(batch.add_entry(site, None).unwrap_err(), CalcError::NoFormulas);
        assert!(batch.is_empty());
    }

    #[test]
    fn extractive_entries_are_seeded_on_add() {
        let mut batch = Batch::new(vec![extraction_effect()], YieldRates::default());
        batch.add_entry(mine(), Some(smiths())).unwrap();
        // Seeded before any recompute call, bonus applied.
        assert_eq!(batch.entries()[0].produced(), &set(&[("ore", 12)]));
    }

    #[test]
    fn unfilled_entries_contribute_nothing() {
        let mut batch = Batch::new(vec![], YieldRates::default());
        batch.add_entry(mine(), None).unwrap();
        batch.add_entry(sawmill(101), None).unwrap();
        let report = batch.recompute();
        assert_eq!(report.totals.produced, set(&[("ore", 10)]));
        assert!(report.totals.leftover.is_empty());
        assert_eq!(report.per_entry[&SiteId(101)], ForwardResult::default());
    }

    #[test]
    fn entries_do_not_share_budgets() {
        // Two sawmills both declare wood; each consumes only its own.
        let mut batch = Batch::new(vec![], YieldRates::default());
        batch.add_entry(sawmill(1), None).unwrap();
        batch.add_entry(sawmill(2), None).unwrap();
        batch.set_entry_input(SiteId(1), ResourceId::new("wood"), "13");
        batch.set_entry_input(SiteId(2), ResourceId::new("wood"), "13");

        let report = batch.recompute();
        for result in report.per_entry.values() {
            assert_eq!(result.produced, set(&[("plank", 5)]));
            assert_eq!(result.leftover, set(&[("wood", 3)]));
        }
        assert_eq!(report.totals.produced, set(&[("plank", 10)]));
        assert_eq!(report.totals.leftover, set(&[("wood", 6)]));
    }

    #[test]
    fn recompute_is_idempotent() {
        let mut batch = Batch::new(vec![extraction_effect()], YieldRates::default());
        batch.add_entry(mine(), Some(smiths())).unwrap();
        batch.add_entry(sawmill(101), None).unwrap();
        batch.set_entry_input(SiteId(101), ResourceId::new("wood"), "13");
        let first = batch.recompute();
        let second = batch.recompute();
        assert_eq!(first, second);
    }

    #[test]
    fn removal_subtracts_the_entry_contribution() {
        let mut batch = Batch::new(vec![], YieldRates::default());
        batch.add_entry(mine(), None).unwrap();
        batch.add_entry(sawmill(101), None).unwrap();
        batch.set_entry_input(SiteId(101), ResourceId::new("wood"), "13");
        batch.recompute();

        assert!(batch.remove_entry(SiteId(101)));
        assert!(batch.totals().is_none());
        let report = batch.recompute();
        assert_eq!(report.totals.produced, set(&[("ore", 10)]));
        assert!(report.totals.leftover.is_empty());
        assert!(!batch.remove_entry(SiteId(101)));
    }

    #[test]
    fn totals_cache_follows_mutations() {
        let mut batch = Batch::new(vec![], YieldRates::default());
        batch.add_entry(sawmill(101), None).unwrap();
        assert!(batch.totals().is_none());
        batch.recompute();
        assert!(batch.totals().is_some());
        batch.set_entry_input(SiteId(101), ResourceId::new("wood"), "4");
        assert!(batch.totals().is_none());
        batch.recompute();
        assert_eq!(
            batch.totals().map(|t| t.produced.clone()),
            Some(set(&[("plank", 2)]))
        );
    }

    #[test]
    fn adopt_session_carries_pending_supply() {
        let mut session = SiteSession::new(sawmill(101), None, vec![], YieldRates::default());
        session.set_supply(ResourceId::new("wood"), "13");
        let mut batch = Batch::new(vec![], YieldRates::default());
        assert!(batch.adopt_session(&session).unwrap());
        let report = batch.recompute();
        assert_eq!(report.totals.produced, set(&[("plank", 5)]));
        assert_eq!(report.totals.leftover, set(&[("wood", 3)]));
    }

    #[test]
    fn clear_empties_the_batch() {
        let mut batch = Batch::new(vec![], YieldRates::default());
        batch.add_entry(mine(), None).unwrap();
        batch.recompute();
        batch.clear();
        assert!(batch.is_empty());
        assert!(batch.totals().is_none());
        let report = batch.recompute();
        assert_eq!(report, BatchReport::default());
    }

    #[test]
    fn report_serializes_with_numeric_site_keys() {
        let mut batch = Batch::new(vec![], YieldRates::default());
        batch.add_entry(mine(), None).unwrap();
        let report = batch.recompute();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"7\""));
        assert!(json.contains("\"ore\":10"));
    }

    proptest! {
        #[test]
        fn totals_are_the_merge_of_entries(
            first_wood in 0i64..200,
            second_wood in 0i64..200,
        ) {
            let mut batch = Batch::new(vec![], YieldRates::default());
            batch.add_entry(sawmill(1), None).unwrap();
            batch.add_entry(sawmill(2), None).unwrap();
            batch.set_entry_input(SiteId(1), ResourceId::new("wood"), first_wood.to_string());
            batch.set_entry_input(SiteId(2), ResourceId::new("wood"), second_wood.to_string());

            let report = batch.recompute();
            let mut produced = ResourceSet::new();
            let mut leftover = ResourceSet::new();
            for result in report.per_entry.values() {
                produced = produced.merge(&result.produced, 1);
                leftover = leftover.merge(&result.leftover, 1);
            }
            prop_assert_eq!(report.totals.produced, produced.normalized());
            prop_assert_eq!(report.totals.leftover, leftover.normalized());
        }
    }
}
