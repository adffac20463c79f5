// Synthetic switchback experiment data for integration tests
//
// Intervals alternate between arms; each interval gets a batch of price
// calculations, some of which convert into orders. The generator is seeded,
// so every test sees the same rows for the same scenario.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use switchback::events::{ClusterId, EventRow, EventTables};

#[derive(Debug, Clone)]
pub struct Scenario {
    pub seed: u64,
    pub intervals_per_arm: u32,
    pub calcprices_per_interval: u32,
    pub conversion_control: f64,
    pub conversion_treatment: f64,
    /// Pre-period intervals labelled "Before"
    pub before_intervals: u32,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            seed: 42,
            intervals_per_arm: 8,
            calcprices_per_interval: 40,
            conversion_control: 0.30,
            conversion_treatment: 0.30,
            before_intervals: 2,
        }
    }
}

fn interval(i: u32) -> ClusterId {
    let (h, m) = (i / 2, (i % 2) * 30);
    let (h2, m2) = ((i + 1) / 2, ((i + 1) % 2) * 30);
    ClusterId::new(
        format!("2024-05-01T{h:02}:{m:02}:00Z"),
        format!("2024-05-01T{h2:02}:{m2:02}:00Z"),
    )
}

/// Generate `calcprices`, `orders` and `full` tables
pub fn generate(scenario: &Scenario) -> EventTables {
    let mut rng = StdRng::seed_from_u64(scenario.seed);
    let mut calcprices = Vec::new();
    let mut orders = Vec::new();
    let mut full = Vec::new();

    let mut arms: Vec<&str> = vec!["Before"; scenario.before_intervals as usize];
    for _ in 0..scenario.intervals_per_arm {
        arms.push("Control");
        arms.push("A");
    }

    for (i, arm) in arms.into_iter().enumerate() {
        let cluster = interval(i as u32);
        let conversion = if arm == "A" {
            scenario.conversion_treatment
        } else {
            scenario.conversion_control
        };

        for k in 0..scenario.calcprices_per_interval {
            let calcprice_uuid = format!("cp-{i}-{k}");
            let surge = [1.0, 1.2, 1.6, 2.3][rng.gen_range(0..4)];
            let minprice = 3.0;
            let recprice = minprice * surge + rng.gen_range(0.0..2.0);

            calcprices.push(
                EventRow::new(arm, cluster.clone())
                    .with_text("calcprice_uuid", &calcprice_uuid)
                    .with_number("surge", surge)
                    .with_number("dynamic_surge", surge)
                    .with_number("original_dynamic_surge_updated", surge)
                    .with_number("minprice_usd", minprice)
                    .with_number("price_base_usd", recprice * 0.9)
                    .with_number("recprice_usd", recprice),
            );

            if rng.gen::<f64>() >= conversion {
                continue;
            }

            let with_tender = rng.gen_bool(0.4);
            let start_price_bid = with_tender && rng.gen_bool(0.5);
            let accepted = rng.gen_bool(0.8);
            let done = accepted && rng.gen_bool(0.9);
            let price_start = if rng.gen_bool(0.3) { minprice } else { recprice };
            let price_highrate = recprice * 1.1;
            let distance = rng.gen_range(0.5..30.0);

            let order = EventRow::new(arm, cluster.clone())
                .with_text("order_uuid", format!("o-{i}-{k}"))
                .with_text("calcprice_uuid", &calcprice_uuid)
                .with_number("distance_in_km", distance)
                .with_number("tenders_count", if with_tender { 1.0 } else { 0.0 })
                .with_flag("is_order_with_tender", with_tender)
                .with_flag("is_order_start_price_bid", start_price_bid)
                .with_flag("is_order_accepted", accepted)
                .with_flag("is_order_accepted_start_price_bid", accepted && start_price_bid)
                .with_flag("is_order_done", done)
                .with_flag("is_order_done_start_price_bid", done && start_price_bid)
                .with_flag("is_order_good", price_start >= price_highrate)
                .with_number("price_start_usd", price_start)
                .with_number("price_highrate_usd", price_highrate)
                .with_number("price_tender_usd", if with_tender { price_start * 1.05 } else { 0.0 })
                .with_number("price_done_usd", if done { price_start } else { 0.0 })
                .with_number("rides_price_start_usd", if done { price_start } else { 0.0 })
                .with_number("rides_price_highrate_usd", if done { price_highrate } else { 0.0 });

            full.push(
                order
                    .clone()
                    .with_number("surge", surge)
                    .with_number("original_dynamic_surge_updated", surge)
                    .with_number("minprice_usd", minprice),
            );
            orders.push(order);
        }
    }

    let mut tables = EventTables::new();
    tables.insert("calcprices", calcprices);
    tables.insert("orders", orders);
    tables.insert("full", full);
    tables
}

/// Serialize generated tables into a temporary JSON file
pub fn write_input(dir: &tempfile::TempDir, tables: &EventTables) -> std::path::PathBuf {
    let path = dir.path().join("events.json");
    let json = serde_json::to_string(tables).expect("serialize tables");
    std::fs::write(&path, json).expect("write input");
    path
}
