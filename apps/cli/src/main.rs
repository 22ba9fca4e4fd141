#![deny(warnings)]

//! Headless CLI: loads a production scenario, runs the batch calculation,
//! and prints per-site results, merged totals, and any reverse asks.

use anyhow::{Context, Result};
use prod_batch::Batch;
use prod_core::*;
use prod_engine::{convert_to, yield_multiplier, YieldRates};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// One scanned site with its owning group and pending quantities.
///
/// Quantities are strings on purpose: they arrive exactly as a user would
/// type them and are parsed by the calculators.
#[derive(Debug, Deserialize)]
struct ScenarioEntry {
    site: Site,
    #[serde(default)]
    group: Option<Group>,
    /// Supply-side quantities for the batch forward pass.
    #[serde(default)]
    supply: BTreeMap<ResourceId, String>,
    /// Desired outputs; a non-empty map runs a reverse calculation too.
    #[serde(default)]
    desired: BTreeMap<ResourceId, String>,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    #[serde(default)]
    effects: Vec<ActiveEffect>,
    entries: Vec<ScenarioEntry>,
}

fn parse_args() -> Option<String> {
    let mut scenario: Option<String> = None;
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        if arg.as_str() == "--scenario" {
            scenario = it.next();
        }
    }
    scenario
}

fn load_scenario(path: &str) -> Result<Scenario> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let scenario = if path.ends_with(".json") {
        serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?
    } else {
        serde_yaml::from_str(&text).with_context(|| format!("parsing {path}"))?
    };
    Ok(scenario)
}

fn demo_scenario() -> Scenario {
    let mine = Site {
        id: SiteId(7),
        name: "Mine".to_string(),
        category: SiteCategory::Extractive,
        tier: 1,
        bonus_tier_unlocked: false,
        formulas: vec![],
        fixed_outputs: ResourceSet::from_counts([("ore", 10)]),
    };
    let sawmill = Site {
        id: SiteId(101),
        name: "Sawmill".to_string(),
        category: SiteCategory::Processing,
        tier: 2,
        bonus_tier_unlocked: false,
        formulas: vec![Formula {
            inputs: ResourceSet::from_counts([("wood", 2)]),
            outputs: ResourceSet::from_counts([("plank", 1)]),
            output_cap: ResourceSet::from_counts([("plank", 5)]),
        }],
        fixed_outputs: ResourceSet::new(),
    };
    let smiths = Group {
        id: GroupId(12),
        name: "Smiths".to_string(),
    };

    Scenario {
        effects: vec![ActiveEffect {
            kind: EffectKind::HigherExtractionYield,
            targets: vec![EffectTarget::Id(smiths.id)],
        }],
        entries: vec![
            ScenarioEntry {
                site: mine,
                group: Some(smiths),
                supply: BTreeMap::new(),
                desired: BTreeMap::new(),
            },
            ScenarioEntry {
                site: sawmill,
                group: None,
                supply: [(ResourceId::new("wood"), "13".to_string())].into(),
                desired: [(ResourceId::new("plank"), "3".to_string())].into(),
            },
        ],
    }
}

fn format_set(set: &ResourceSet) -> String {
    if set.is_empty() {
        return "-".to_string();
    }
    set.iter()
        .map(|(id, count)| format!("{} x{}", id.0, count))
        .collect::<Vec<_>>()
        .join(", ")
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let scenario_path = parse_args();
    info!(?scenario_path, "starting production calculator");

    let scenario = match &scenario_path {
        Some(path) => load_scenario(path)?,
        None => demo_scenario(),
    };

    for entry in &scenario.entries {
        validate_site(&entry.site)
            .with_context(|| format!("invalid site {}", entry.site.id.0))?;
        if let Some(group) = &entry.group {
            validate_group(group).with_context(|| format!("invalid group {}", group.id.0))?;
        }
    }

    let rates = YieldRates::default();
    let mut batch = Batch::new(scenario.effects.clone(), rates.clone());
    for entry in &scenario.entries {
        let added = batch
            .add_entry(entry.site.clone(), entry.group.clone())
            .with_context(|| format!("adding site {}", entry.site.id.0))?;
        if !added {
            continue;
        }
        for (resource, raw) in &entry.supply {
            batch.set_entry_input(entry.site.id, resource.clone(), raw.clone());
        }
    }

    let report = batch.recompute();
    for entry in batch.entries() {
        let multiplier = yield_multiplier(
            entry.site().category,
            entry.group(),
            &scenario.effects,
            entry.site().bonus_tier_unlocked,
            &rates,
        );
        println!(
            "Site {} ({}) | yield x{} | produced: {} | leftover: {}",
            entry.site().id.0,
            entry.site().name,
            multiplier,
            format_set(entry.produced()),
            format_set(entry.leftover()),
        );
    }
    println!(
        "Batch OK | sites: {} | produced: {} | leftover: {}",
        batch.len(),
        format_set(&report.totals.produced),
        format_set(&report.totals.leftover),
    );

    for entry in &scenario.entries {
        if entry.desired.is_empty() {
            continue;
        }
        let ask = convert_to(
            &entry.site,
            entry.group.as_ref(),
            &scenario.effects,
            &rates,
            &entry.desired,
        )
        .with_context(|| format!("reverse ask for site {}", entry.site.id.0))?;
        println!(
            "Ask {} ({}) | want: {} | need: {} | unmet: {}",
            entry.site.id.0,
            entry.site.name,
            format_set(&to_request_echo(&entry.desired)),
            format_set(&ask.required),
            format_set(&ask.leftover),
        );
    }

    Ok(())
}

/// Echo of the raw ask for display, parsed the same way the engine parses.
fn to_request_echo(desired: &BTreeMap<ResourceId, String>) -> ResourceSet {
    let mut echo = ResourceSet::new();
    for (id, raw) in desired {
        let count = prod_engine::parse_quantity(raw);
        if count > 0 {
            echo.set(id.clone(), count);
        }
    }
    echo
}
