use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;

fn build_site(n_formulas: usize) -> prod_core::Site {
    let mut formulas = Vec::with_capacity(n_formulas);
    for i in 0..n_formulas {
        formulas.push(prod_core::Formula {
            inputs: prod_core::ResourceSet::from_counts([("wood", 2 + i as i64)]),
            outputs: prod_core::ResourceSet::from_counts([(format!("part{i}"), 1)]),
            output_cap: prod_core::ResourceSet::from_counts([(format!("part{i}"), 40)]),
        });
    }
    prod_core::Site {
        id: prod_core::SiteId(1),
        name: "Workshop".into(),
        category: prod_core::SiteCategory::Processing,
        tier: 3,
        bonus_tier_unlocked: true,
        formulas,
        fixed_outputs: prod_core::ResourceSet::new(),
    }
}

fn bench_forward(c: &mut Criterion) {
    let site = build_site(8);
    let supplied: BTreeMap<prod_core::ResourceId, String> =
        [(prod_core::ResourceId::new("wood"), "500".to_string())].into();
    let rates = prod_engine::YieldRates::default();
    c.bench_function("convert_from 8 formulas", |b| {
        b.iter(|| {
            let _ = black_box(prod_engine::convert_from(
                &site, None, &[], &rates, &supplied,
            ));
        })
    });
}

fn bench_reverse(c: &mut Criterion) {
    let site = build_site(8);
    let desired: BTreeMap<prod_core::ResourceId, String> = (0..8)
        .map(|i| (prod_core::ResourceId::new(format!("part{i}")), "40".to_string()))
        .collect();
    let rates = prod_engine::YieldRates::default();
    c.bench_function("convert_to 8 formulas", |b| {
        b.iter(|| {
            let _ = black_box(prod_engine::convert_to(
                &site, None, &[], &rates, &desired,
            ));
        })
    });
}

criterion_group!(benches, bench_forward, bench_reverse);
criterion_main!(benches);
