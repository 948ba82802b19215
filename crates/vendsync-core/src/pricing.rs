//! Tiered reward pricing.
//!
//! A reward range is a list of [`RewardTier`]s over half-open price bands.
//! The first band containing the input price decides the markup; the marked-up
//! price is rounded up to the next multiple of 100. Prices outside every band
//! pass through untouched.
//!
//! Bands are not checked for overlap when a range is stored, so the order the
//! caller passes them in is the tie-break. [`find_overlaps`] exists so callers
//! can report suspicious ranges.

use crate::models::{HarvestedLine, ParsedRow, RewardTier};

const ROUNDING_STEP: f64 = 100.0;

/// Compute the published price for `input` under `tiers`.
pub fn compute_output_price(input: f64, tiers: &[RewardTier]) -> f64 {
    match tiers.iter().find(|tier| tier.contains(input)) {
        Some(tier) => {
            let markup = if tier.is_percent {
                input * tier.reward / 100.0
            } else {
                tier.reward
            };
            round_up(input + markup)
        }
        None => input,
    }
}

/// Round up to the next multiple of [`ROUNDING_STEP`].
fn round_up(raw: f64) -> f64 {
    (raw / ROUNDING_STEP).ceil() * ROUNDING_STEP
}

/// Index pairs `(i, j)`, `i < j`, of tiers whose bands intersect.
pub fn find_overlaps(tiers: &[RewardTier]) -> Vec<(usize, usize)> {
    let mut overlaps = Vec::new();
    for (i, a) in tiers.iter().enumerate() {
        for (j, b) in tiers.iter().enumerate().skip(i + 1) {
            if a.from < b.to && b.from < a.to {
                overlaps.push((i, j));
            }
        }
    }
    overlaps
}

/// Turn a run's parsed rows into priced staging lines for `target_id`.
pub fn price_rows(target_id: i64, rows: Vec<ParsedRow>, tiers: &[RewardTier]) -> Vec<HarvestedLine> {
    rows.into_iter()
        .map(|row| HarvestedLine {
            target_id,
            origin: row.origin,
            output_price: Some(compute_output_price(row.input_price, tiers)),
            input_price: row.input_price,
            title: row.title,
            link: row.link,
            shipment: row.shipment,
            warranty: row.warranty,
            pics: row.pics,
            preview: row.preview,
            optional: row.optional,
            published: row.published,
        })
        .collect()
}
