//! Environmental impact estimates shown on the dashboard.

use serde::Serialize;

/// Per-item savings from reusing a garment instead of buying new.
const CO2_PER_ITEM_KG: f64 = 8.5;
const WATER_PER_ITEM_L: f64 = 2700.0;
const WASTE_PER_ITEM_KG: f64 = 0.5;

/// Estimated savings for a number of exchanged items.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Impact {
    /// Kilograms of CO₂e, one decimal.
    pub co2_saved_kg: f64,
    /// Litres of water, nearest whole litre.
    pub water_saved_l: u64,
    /// Kilograms of waste diverted from landfill, one decimal.
    pub waste_diverted_kg: f64,
}

/// Map an item count to environmental metrics. Pure; no failure modes.
pub fn estimate_impact(item_count: u64) -> Impact {
    let items = item_count as f64;
    Impact {
        co2_saved_kg: round_tenth(items * CO2_PER_ITEM_KG),
        water_saved_l: (items * WATER_PER_ITEM_L).round() as u64,
        waste_diverted_kg: round_tenth(items * WASTE_PER_ITEM_KG),
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
