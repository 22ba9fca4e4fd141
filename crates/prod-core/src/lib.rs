#![deny(warnings)]

//! Core domain models and invariants for the production calculator.
//!
//! This crate defines the serializable types shared by the conversion
//! engine and the batch aggregator, together with validation helpers that
//! guarantee basic invariants on site and formula definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Unique identifier for a resource, e.g. "wood", "plank", "iron_ore".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Builds an identifier from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Numeric identifier of a production site, as printed on its physical tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SiteId(pub u64);

impl SiteId {
    /// Parses a scanned tag into a site id. Tags are plain decimal digits;
    /// surrounding whitespace is tolerated, anything else is rejected.
    pub fn from_tag(tag: &str) -> Option<SiteId> {
        tag.trim().parse::<u64>().ok().map(SiteId)
    }
}

/// Numeric identifier of an owning group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u64);

/// An integer multiset of resources keyed by identifier.
///
/// Counts are signed: intermediate bookkeeping may hold zero entries until
/// an explicit [`ResourceSet::normalized`] pass, and merge results may go
/// negative while a calculation is in flight. Iteration follows identifier
/// order, so merged results are deterministic regardless of insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSet {
    entries: BTreeMap<ResourceId, i64>,
}

impl ResourceSet {
    /// An empty multiset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from identifier/count pairs. Duplicate identifiers
    /// accumulate.
    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for (id, count) in counts {
            let entry = set.entries.entry(ResourceId::new(id)).or_insert(0);
            *entry = entry.saturating_add(count);
        }
        set
    }

    /// Replaces the count stored for `id`.
    pub fn set(&mut self, id: ResourceId, count: i64) {
        self.entries.insert(id, count);
    }

    /// Count stored for `id`, zero when absent.
    pub fn get(&self, id: &ResourceId) -> i64 {
        self.entries.get(id).copied().unwrap_or(0)
    }

    /// Whether an entry exists for `id`, regardless of its count.
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.entries.contains_key(id)
    }

    /// True when the set holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries, zero-count entries included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, i64)> {
        self.entries.iter().map(|(id, count)| (id, *count))
    }

    /// Every count multiplied by `factor`, saturating on overflow. Entries
    /// are kept even when the product is zero.
    pub fn scale(&self, factor: i64) -> ResourceSet {
        let entries = self
            .entries
            .iter()
            .map(|(id, count)| (id.clone(), count.saturating_mul(factor)))
            .collect();
        ResourceSet { entries }
    }

    /// Pointwise sum of `self` and `other` scaled by `sign` (+1 adds,
    /// -1 subtracts). Zero results are kept so that in-flight bookkeeping
    /// stays exact; callers normalize before surfacing anything.
    pub fn merge(&self, other: &ResourceSet, sign: i64) -> ResourceSet {
        let mut entries = self.entries.clone();
        for (id, count) in &other.entries {
            let delta = count.saturating_mul(sign);
            let entry = entries.entry(id.clone()).or_insert(0);
            *entry = entry.saturating_add(delta);
        }
        ResourceSet { entries }
    }

    /// True when every entry of `need` is covered by this set.
    ///
    /// The check is one-directional: identifiers present here but absent
    /// from `need` are ignored, while a `need` identifier with no entry in
    /// this set fails the check outright, whatever its count.
    pub fn dominates(&self, need: &ResourceSet) -> bool {
        need.entries.iter().all(|(id, needed)| {
            match self.entries.get(id) {
                Some(have) => have >= needed,
                None => false,
            }
        })
    }

    /// Copy with zero-count entries removed. Negative counts survive; they
    /// are bookkeeping and must be consumed before display.
    pub fn normalized(&self) -> ResourceSet {
        let entries = self
            .entries
            .iter()
            .filter(|(_, count)| **count != 0)
            .map(|(id, count)| (id.clone(), *count))
            .collect();
        ResourceSet { entries }
    }
}

/// A conversion rule: the resources one cycle consumes and produces, plus a
/// ceiling on the total output producible by repeated cycles in one pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    /// Resources consumed by one cycle. Empty for extraction formulas.
    pub inputs: ResourceSet,
    /// Resources produced by one cycle.
    pub outputs: ResourceSet,
    /// Ceiling on total output within one calculation pass.
    pub output_cap: ResourceSet,
}

impl Formula {
    /// True when every cap identifier also appears among the outputs. A cap
    /// naming other identifiers can never bind and is ignored wholesale.
    pub fn cap_is_consistent(&self) -> bool {
        self.output_cap.iter().all(|(id, _)| self.outputs.contains(id))
    }
}

/// Kinds of production sites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteCategory {
    /// Produces a fixed output list out of nothing.
    Extractive,
    /// Converts supplied resources into outputs via formulas.
    Processing,
}

/// A production site as resolved from its scanned tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Tag identifier printed on the physical asset.
    pub id: SiteId,
    /// Human-readable site name.
    pub name: String,
    /// Extractive or processing.
    pub category: SiteCategory,
    /// Upgrade tier of the site. Display metadata; the calculators only
    /// look at `bonus_tier_unlocked`.
    pub tier: u32,
    /// Whether the bonus upgrade tier is unlocked for this site.
    pub bonus_tier_unlocked: bool,
    /// Conversion formulas, applied strictly in list order: earlier
    /// formulas consume from the shared request before later ones see it.
    #[serde(default)]
    pub formulas: Vec<Formula>,
    /// Fixed per-pass output of an extractive site. Empty for processing.
    #[serde(default)]
    pub fixed_outputs: ResourceSet,
}

/// An owning group whose active effects apply to its sites.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group identifier.
    pub id: GroupId,
    /// Exact group name, used by name-targeted effects.
    pub name: String,
}

/// Yield bonuses that can be active for a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Extractive sites of targeted groups produce more.
    HigherExtractionYield,
    /// Processing sites of targeted groups produce more.
    HigherProductionYield,
}

/// A target of an active effect: an owning group, by id or by bare name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EffectTarget {
    /// Matches the owning group by id; never falls back to the name.
    Id(GroupId),
    /// Matches the owning group by exact name.
    Name(String),
}

impl EffectTarget {
    /// Canonical target match used by every effect lookup.
    pub fn matches(&self, group: &Group) -> bool {
        match self {
            EffectTarget::Id(id) => *id == group.id,
            EffectTarget::Name(name) => *name == group.name,
        }
    }
}

/// One currently-active yield effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEffect {
    /// Which bonus the effect grants.
    #[serde(rename = "effect")]
    pub kind: EffectKind,
    /// Groups the effect applies to, by id or name.
    pub targets: Vec<EffectTarget>,
}

impl ActiveEffect {
    /// True when this effect targets the given group.
    pub fn applies_to(&self, group: &Group) -> bool {
        self.targets.iter().any(|t| t.matches(group))
    }
}

/// True when any active effect of `kind` targets `group`.
///
/// This is the single lookup shared by the yield calculators and by
/// presentation badges. An unowned site (`group = None`) never matches.
pub fn has_effect(effects: &[ActiveEffect], kind: EffectKind, group: Option<&Group>) -> bool {
    match group {
        Some(g) => effects.iter().any(|e| e.kind == kind && e.applies_to(g)),
        None => false,
    }
}

/// Validation errors for definition-level invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Resource identifiers must be non-empty.
    #[error("empty resource identifier")]
    EmptyIdentifier,
    /// Formula and fixed-output counts must be at least 1.
    #[error("non-positive count for resource {0}")]
    NonPositiveCount(String),
    /// Formulas must declare at least one output.
    #[error("formula declares no outputs")]
    MissingOutputs,
    /// Formulas must declare an output cap.
    #[error("formula declares no output cap")]
    MissingOutputCap,
    /// Extractive sites cannot consume resources.
    #[error("extractive site {0} has a formula with inputs")]
    ExtractiveWithInputs(u64),
    /// Extractive sites must declare their fixed outputs.
    #[error("extractive site {0} has no fixed outputs")]
    MissingFixedOutputs(u64),
    /// Processing sites must have at least one formula.
    #[error("processing site {0} has no formulas")]
    NoFormulas(u64),
    /// Site and group names must be non-empty.
    #[error("empty name")]
    EmptyName,
}

/// Validate a definition-side multiset: non-empty identifiers, counts >= 1.
pub fn validate_resource_counts(set: &ResourceSet) -> Result<(), ValidationError> {
    for (id, count) in set.iter() {
        if id.0.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier);
        }
        if count < 1 {
            return Err(ValidationError::NonPositiveCount(id.0.clone()));
        }
    }
    Ok(())
}

/// Validate a conversion formula.
pub fn validate_formula(f: &Formula) -> Result<(), ValidationError> {
    validate_resource_counts(&f.inputs)?;
    validate_resource_counts(&f.outputs)?;
    validate_resource_counts(&f.output_cap)?;
    if f.outputs.is_empty() {
        return Err(ValidationError::MissingOutputs);
    }
    if f.output_cap.is_empty() {
        return Err(ValidationError::MissingOutputCap);
    }
    Ok(())
}

/// Validate a site definition, including category-specific invariants.
pub fn validate_site(site: &Site) -> Result<(), ValidationError> {
    if site.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    for f in &site.formulas {
        validate_formula(f)?;
    }
    validate_resource_counts(&site.fixed_outputs)?;
    match site.category {
        SiteCategory::Extractive => {
            if site.formulas.iter().any(|f| !f.inputs.is_empty()) {
                return Err(ValidationError::ExtractiveWithInputs(site.id.0));
            }
            if site.fixed_outputs.is_empty() {
                return Err(ValidationError::MissingFixedOutputs(site.id.0));
            }
        }
        SiteCategory::Processing => {
            if site.formulas.is_empty() {
                return Err(ValidationError::NoFormulas(site.id.0));
            }
        }
    }
    Ok(())
}

/// Validate a group definition.
pub fn validate_group(group: &Group) -> Result<(), ValidationError> {
    if group.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(())
}
