#![deny(warnings)]

//! Conversion calculators for production sites.
//!
//! This module provides the machinery behind both calculator directions:
//! - Cycle resolution of a formula against a bounding request
//! - Conditional yield bonuses and their multiplier table
//! - Forward ("what do I get") and reverse ("what do I need") conversions
//! - A single-site session modeling the two entry panels

use prod_core::{
    has_effect, ActiveEffect, EffectKind, Formula, Group, ResourceId, ResourceSet, Site,
    SiteCategory,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Hard ceiling on cycles resolved in one pass. Site quantities are tens to
/// low hundreds; reaching this means the formula is effectively ungated.
pub const MAX_CYCLES_PER_PASS: i64 = 100_000;

/// Which side of a formula the request bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Consume available inputs, produce outputs.
    Forward,
    /// Match desired outputs, report required inputs.
    Reverse,
}

/// Consumption and production of a resolved formula pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Inputs consumed over all cycles.
    pub consumed: ResourceSet,
    /// Outputs produced over all cycles, before any yield bonus.
    pub produced: ResourceSet,
}

/// Errors raised by the conversion calculations.
#[derive(Debug, Error, PartialEq)]
pub enum CalcError {
    /// The site directory delivered a processing site without formulas.
    #[error("site has no conversion formulas")]
    NoFormulas,
    /// No entered quantity parsed to a positive value.
    #[error("no positive quantities in the request")]
    EmptyRequest,
}

/// Resolves how many whole cycles of `formula` fit inside `request`.
///
/// The request bounds the formula's input side in the forward direction and
/// its output side in reverse. Independently of the request, the total
/// output may not exceed the formula's cap. The returned sets are the
/// formula sides scaled by the largest cycle count satisfying both bounds.
///
/// An empty request side never gates, so extraction formulas are bounded by
/// their cap alone. A cap naming an identifier the formula does not produce
/// can never bind and is ignored wholesale. When neither bound applies the
/// search stops at [`MAX_CYCLES_PER_PASS`].
pub fn resolve_cycles(formula: &Formula, direction: Direction, request: &ResourceSet) -> Resolution {
    let request_side = match direction {
        Direction::Forward => &formula.inputs,
        Direction::Reverse => &formula.outputs,
    };
    let capped = formula.cap_is_consistent();
    if !capped {
        debug!("output cap names identifiers outside the outputs; resolving uncapped");
    }

    let mut cycles: i64 = 0;
    while cycles < MAX_CYCLES_PER_PASS {
        let next = cycles + 1;
        if !request.dominates(&request_side.scale(next)) {
            break;
        }
        if capped && !formula.output_cap.dominates(&formula.outputs.scale(next)) {
            break;
        }
        cycles = next;
    }
    if cycles == MAX_CYCLES_PER_PASS {
        warn!(cycles, "cycle resolution hit the per-pass clamp; formula is ungated");
    }

    Resolution {
        consumed: formula.inputs.scale(cycles),
        produced: formula.outputs.scale(cycles),
    }
}

/// Multiplier table for the conditional yield bonuses.
///
/// Every factor is expected to be at least 1. The production bonus is
/// deliberately data rather than a literal at each call site: the observed
/// behavior of an earlier build disagreed between call sites, and the
/// canonical value now lives here and nowhere else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YieldRates {
    /// Bonus for extractive sites of groups under a higher-extraction effect.
    pub extraction_bonus: Decimal,
    /// Bonus for processing sites of groups under a higher-production effect.
    pub production_bonus: Decimal,
    /// Bonus for processing sites with the upgrade bonus tier unlocked.
    pub tier_bonus: Decimal,
}

impl Default for YieldRates {
    fn default() -> Self {
        Self {
            extraction_bonus: Decimal::new(12, 1), // 1.2
            production_bonus: Decimal::new(12, 1), // 1.2
            tier_bonus: Decimal::new(15, 1),       // 1.5
        }
    }
}

/// Effective output multiplier for a site owned by `group` under `effects`.
///
/// Extractive sites earn the extraction bonus when an effect targets their
/// group. Processing sites stack the production bonus (when targeted) with
/// the tier bonus (when unlocked). The multiplier applies to produced
/// quantities only, never to consumed ones.
pub fn yield_multiplier(
    category: SiteCategory,
    group: Option<&Group>,
    effects: &[ActiveEffect],
    bonus_tier_unlocked: bool,
    rates: &YieldRates,
) -> Decimal {
    match category {
        SiteCategory::Extractive => {
            if has_effect(effects, EffectKind::HigherExtractionYield, group) {
                rates.extraction_bonus
            } else {
                Decimal::ONE
            }
        }
        SiteCategory::Processing => {
            let production = if has_effect(effects, EffectKind::HigherProductionYield, group) {
                rates.production_bonus
            } else {
                Decimal::ONE
            };
            let tier = if bonus_tier_unlocked {
                rates.tier_bonus
            } else {
                Decimal::ONE
            };
            production * tier
        }
    }
}

/// Scales every produced count by `multiplier`, truncating fractions.
fn apply_yield(produced: &ResourceSet, multiplier: Decimal) -> ResourceSet {
    if multiplier == Decimal::ONE {
        return produced.clone();
    }
    let mut boosted = ResourceSet::new();
    for (id, count) in produced.iter() {
        let scaled = (Decimal::from(count) * multiplier).floor();
        boosted.set(id.clone(), scaled.to_i64().unwrap_or(i64::MAX));
    }
    boosted
}

/// Parses one user-entered quantity. Quantities are whole non-negative
/// units entered as decimal digits; blank or unparseable input counts as
/// zero. The whole string must parse, so "12x" is zero, not twelve.
pub fn parse_quantity(raw: &str) -> i64 {
    raw.trim()
        .parse::<u64>()
        .map_or(0, |v| v.min(i64::MAX as u64) as i64)
}

/// Collects entered quantities into a request, dropping non-positive ones.
fn parse_request(values: &BTreeMap<ResourceId, String>) -> ResourceSet {
    let mut request = ResourceSet::new();
    for (id, raw) in values {
        let count = parse_quantity(raw);
        if count > 0 {
            request.set(id.clone(), count);
        }
    }
    request
}

/// Like [`parse_request`], but pre-divides each desired quantity by the
/// yield multiplier with ceiling division, so that the bonus, reapplied on
/// production, meets or exceeds the entered ask.
fn parse_scaled_request(
    values: &BTreeMap<ResourceId, String>,
    multiplier: Decimal,
) -> ResourceSet {
    let mut request = ResourceSet::new();
    for (id, raw) in values {
        let count = parse_quantity(raw);
        if count > 0 {
            let scaled = if multiplier == Decimal::ONE {
                count
            } else {
                (Decimal::from(count) / multiplier)
                    .ceil()
                    .to_i64()
                    .unwrap_or(i64::MAX)
            };
            request.set(id.clone(), scaled);
        }
    }
    request
}

/// Outcome of a forward calculation: what the site makes from a supply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ForwardResult {
    /// Total produced output, yield bonus applied.
    pub produced: ResourceSet,
    /// Supplied resources no formula consumed.
    pub leftover: ResourceSet,
}

/// Outcome of a reverse calculation: what a desired yield costs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReverseResult {
    /// Inputs required to cover the satisfiable part of the ask.
    pub required: ResourceSet,
    /// Desired outputs no formula could satisfy.
    pub leftover: ResourceSet,
}

/// Forward conversion: supplied resources are fed through the site's
/// formulas in list order, each formula consuming from what the previous
/// ones left. The yield bonus applies once, to the summed output.
///
/// An extractive site ignores the supply entirely and returns its fixed
/// outputs scaled by the yield multiplier.
pub fn convert_from(
    site: &Site,
    group: Option<&Group>,
    effects: &[ActiveEffect],
    rates: &YieldRates,
    supplied: &BTreeMap<ResourceId, String>,
) -> Result<ForwardResult, CalcError> {
    let multiplier = yield_multiplier(site.category, group, effects, site.bonus_tier_unlocked, rates);

    if site.category == SiteCategory::Extractive {
        return Ok(ForwardResult {
            produced: apply_yield(&site.fixed_outputs, multiplier).normalized(),
            leftover: ResourceSet::new(),
        });
    }
    if site.formulas.is_empty() {
        return Err(CalcError::NoFormulas);
    }

    let request = parse_request(supplied);
    if request.is_empty() {
        return Err(CalcError::EmptyRequest);
    }

    let mut remaining = request;
    let mut produced = ResourceSet::new();
    for formula in &site.formulas {
        let resolution = resolve_cycles(formula, Direction::Forward, &remaining);
        remaining = remaining.merge(&resolution.consumed, -1);
        produced = produced.merge(&resolution.produced, 1);
    }

    Ok(ForwardResult {
        produced: apply_yield(&produced, multiplier).normalized(),
        leftover: remaining.normalized(),
    })
}

/// Reverse conversion: desired output quantities are matched against the
/// formulas in list order, returning the inputs required to cover them.
/// Desired counts are pre-divided by the yield multiplier (ceiling), since
/// the bonus will be earned again when the site actually produces.
pub fn convert_to(
    site: &Site,
    group: Option<&Group>,
    effects: &[ActiveEffect],
    rates: &YieldRates,
    desired: &BTreeMap<ResourceId, String>,
) -> Result<ReverseResult, CalcError> {
    if site.category == SiteCategory::Processing && site.formulas.is_empty() {
        return Err(CalcError::NoFormulas);
    }

    let multiplier = yield_multiplier(site.category, group, effects, site.bonus_tier_unlocked, rates);
    let request = parse_scaled_request(desired, multiplier);
    if request.is_empty() {
        return Err(CalcError::EmptyRequest);
    }

    let mut remaining = request;
    let mut required = ResourceSet::new();
    for formula in &site.formulas {
        let resolution = resolve_cycles(formula, Direction::Reverse, &remaining);
        remaining = remaining.merge(&resolution.produced, -1);
        required = required.merge(&resolution.consumed, 1);
    }

    Ok(ReverseResult {
        required: required.normalized(),
        leftover: remaining.normalized(),
    })
}

/// A single-site calculation session: the selected site, its owning group,
/// the active effects, and the pending entries of both panels.
///
/// The panels are alternatives, not a joint query: running one direction
/// clears the opposite panel's pending values. A site without formulas
/// fails before anything is cleared.
#[derive(Clone, Debug)]
pub struct SiteSession {
    site: Site,
    group: Option<Group>,
    effects: Vec<ActiveEffect>,
    rates: YieldRates,
    supply: BTreeMap<ResourceId, String>,
    demand: BTreeMap<ResourceId, String>,
}

impl SiteSession {
    /// Opens a session for one scanned site.
    pub fn new(site: Site, group: Option<Group>, effects: Vec<ActiveEffect>, rates: YieldRates) -> Self {
        Self {
            site,
            group,
            effects,
            rates,
            supply: BTreeMap::new(),
            demand: BTreeMap::new(),
        }
    }

    /// The session's site.
    pub fn site(&self) -> &Site {
        &self.site
    }

    /// The owning group, when the site has one.
    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    /// Pending supply-panel entries.
    pub fn supply(&self) -> &BTreeMap<ResourceId, String> {
        &self.supply
    }

    /// Pending demand-panel entries.
    pub fn demand(&self) -> &BTreeMap<ResourceId, String> {
        &self.demand
    }

    /// Stores a supply-panel entry verbatim; parsing happens on calculation.
    pub fn set_supply(&mut self, id: ResourceId, value: impl Into<String>) {
        self.supply.insert(id, value.into());
    }

    /// Stores a demand-panel entry verbatim.
    pub fn set_demand(&mut self, id: ResourceId, value: impl Into<String>) {
        self.demand.insert(id, value.into());
    }

    /// Runs the forward calculation from the supply panel, clearing the
    /// demand panel once the site is known to have formulas.
    pub fn calculate_from(&mut self) -> Result<ForwardResult, CalcError> {
        if self.site.category == SiteCategory::Processing && self.site.formulas.is_empty() {
            return Err(CalcError::NoFormulas);
        }
        self.demand.clear();
        convert_from(
            &self.site,
            self.group.as_ref(),
            &self.effects,
            &self.rates,
            &self.supply,
        )
    }

    /// Runs the reverse calculation from the demand panel, clearing the
    /// supply panel once the site is known to have formulas.
    pub fn calculate_to(&mut self) -> Result<ReverseResult, CalcError> {
        if self.site.category == SiteCategory::Processing && self.site.formulas.is_empty() {
            return Err(CalcError::NoFormulas);
        }
        self.supply.clear();
        convert_to(
            &self.site,
            self.group.as_ref(),
            &self.effects,
            &self.rates,
            &self.demand,
        )
    }
}

/// Largest useful quantity to enter for `resource` on the supply side: the
/// summed input amount that carries each formula exactly to its cap.
///
/// Consumed quantities take no yield bonus, so no multiplier applies here.
/// Formulas whose cap cannot bind contribute nothing, as they offer no
/// useful ceiling.
pub fn max_supply_hint(site: &Site, resource: &ResourceId) -> i64 {
    let mut total = Decimal::ZERO;
    for formula in &site.formulas {
        let per_cycle = formula.inputs.get(resource);
        if per_cycle <= 0 {
            continue;
        }
        let mut allowed_cycles: Option<Decimal> = None;
        for (cap_id, cap_count) in formula.output_cap.iter() {
            let per_output = formula.outputs.get(cap_id);
            if per_output <= 0 {
                continue;
            }
            let ratio = Decimal::from(cap_count) / Decimal::from(per_output);
            allowed_cycles = Some(match allowed_cycles {
                Some(best) if best <= ratio => best,
                _ => ratio,
            });
        }
        if let Some(cycles) = allowed_cycles {
            total += Decimal::from(per_cycle) * cycles;
        }
    }
    total.floor().to_i64().unwrap_or(0)
}

/// Largest demand quantity the site can satisfy for `resource` in one
/// pass: the best formula's output cap, yield bonus applied.
pub fn max_demand_hint(site: &Site, resource: &ResourceId, multiplier: Decimal) -> i64 {
    let mut best: i64 = 0;
    for formula in &site.formulas {
        if !formula.outputs.contains(resource) {
            continue;
        }
        let cap = formula.output_cap.get(resource);
        if cap <= 0 {
            continue;
        }
        let boosted = (Decimal::from(cap) * multiplier)
            .floor()
            .to_i64()
            .unwrap_or(0);
        best = best.max(boosted);
    }
    best
}
