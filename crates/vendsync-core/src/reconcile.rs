//! Diff between the staging area and the published hub, and commit of
//! accepted prices.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{DiffItem, DiffReport, DiffStatus, HarvestedLine, HubEntry, PriceChange};
use crate::traits::{HarvestStore, HubStore};

/// Classify a staged price against a hub price.
pub fn classify(parsing_price: Option<f64>, hub_price: Option<f64>) -> DiffStatus {
    let Some(parsing) = parsing_price else {
        return DiffStatus::OnlyHub;
    };
    match hub_price {
        Some(hub) if hub == parsing => DiffStatus::Equal,
        Some(hub) if hub > parsing => DiffStatus::HubHigher,
        _ => DiffStatus::ParsingHigher,
    }
}

/// Build the report of one path from its hub entries and the staged lines of
/// the targets those entries were published from.
///
/// Every entry gets exactly one item. With `only` set, entries outside the
/// listed origins are left out, and listed origins that are staged but have
/// no entry under the path are reported as `only_parsing`.
pub fn diff_path(
    path_id: i64,
    entries: &[HubEntry],
    staged: &[HarvestedLine],
    only: Option<&[i64]>,
) -> DiffReport {
    let by_key: HashMap<(i64, i64), &HarvestedLine> = staged
        .iter()
        .rev()
        .map(|line| ((line.target_id, line.origin), line))
        .collect();
    let wanted: Option<HashSet<i64>> = only.map(|origins| origins.iter().copied().collect());

    let mut items: Vec<DiffItem> = entries
        .iter()
        .filter(|entry| wanted.as_ref().is_none_or(|w| w.contains(&entry.origin)))
        .map(|entry| {
            let line = by_key.get(&(entry.vsl_id, entry.origin)).copied();
            DiffItem {
                origin: entry.origin,
                title: entry.title.clone(),
                status: classify(line.map(HarvestedLine::parsing_price), entry.output_price),
                target_id: Some(entry.vsl_id),
                parsing_input_price: line.map(|l| l.input_price),
                parsing_output_price: line.and_then(|l| l.output_price),
                hub_input_price: entry.input_price,
                hub_output_price: entry.output_price,
                parsed_at: entry.parsed_at,
                hub_updated_at: entry.updated_at,
            }
        })
        .collect();

    if let Some(origins) = only {
        let in_hub: HashSet<i64> = entries.iter().map(|e| e.origin).collect();
        let parsed_at: HashMap<i64, Option<DateTime<Utc>>> =
            entries.iter().map(|e| (e.vsl_id, e.parsed_at)).collect();
        let mut reported = HashSet::new();

        for &origin in origins {
            if in_hub.contains(&origin) || !reported.insert(origin) {
                continue;
            }
            if let Some(line) = staged.iter().find(|l| l.origin == origin) {
                items.push(DiffItem {
                    origin,
                    title: line.title.clone(),
                    status: DiffStatus::OnlyParsing,
                    target_id: Some(line.target_id),
                    parsing_input_price: Some(line.input_price),
                    parsing_output_price: line.output_price,
                    hub_input_price: None,
                    hub_output_price: None,
                    parsed_at: parsed_at.get(&line.target_id).copied().flatten(),
                    hub_updated_at: None,
                });
            }
        }
    }

    // Total order so a NaN price cannot scramble the stable sort.
    items.sort_by(|a, b| a.sort_price().total_cmp(&b.sort_price()));

    DiffReport { path_id, items }
}

/// Price changes an operator accepts by committing diff reports as-is.
///
/// Items without a staged price, and `equal` items, produce no change. When an
/// origin appears more than once the last item wins.
pub fn changes_from_reports(reports: &[DiffReport]) -> Vec<PriceChange> {
    let mut changes: BTreeMap<i64, PriceChange> = BTreeMap::new();
    for item in reports.iter().flat_map(|r| r.items.iter()) {
        if item.status == DiffStatus::Equal {
            continue;
        }
        let (Some(input), Some(output)) = (
            item.parsing_input_price,
            item.parsing_output_price.or(item.parsing_input_price),
        ) else {
            continue;
        };
        changes.insert(
            item.origin,
            PriceChange {
                origin: item.origin,
                input_price: input,
                output_price: output,
                warranty: None,
            },
        );
    }
    changes.into_values().collect()
}

/// Computes diffs and applies accepted prices.
#[derive(Clone)]
pub struct ReconcileService<P, S>
where
    P: HubStore,
    S: HarvestStore,
{
    hub: P,
    staging: S,
}

impl<P, S> ReconcileService<P, S>
where
    P: HubStore,
    S: HarvestStore,
{
    pub fn new(hub: P, staging: S) -> Self {
        Self { hub, staging }
    }

    /// One report per requested path, in request order.
    pub async fn diff(
        &self,
        path_ids: &[i64],
        origins: Option<&[i64]>,
    ) -> Result<Vec<DiffReport>, AppError> {
        let mut reports = Vec::with_capacity(path_ids.len());
        for &path_id in path_ids {
            if !self.hub.path_exists(path_id).await? {
                return Err(AppError::TargetNotFound(format!("hub path {path_id}")));
            }

            let entries = self.hub.entries_under_path(path_id).await?;
            let mut target_ids: Vec<i64> = entries.iter().map(|e| e.vsl_id).collect();
            target_ids.sort_unstable();
            target_ids.dedup();

            let staged = if target_ids.is_empty() {
                Vec::new()
            } else {
                self.staging.get_many(&target_ids).await?
            };

            let report = diff_path(path_id, &entries, &staged, origins);
            tracing::info!(
                path_id,
                entries = entries.len(),
                staged = staged.len(),
                items = report.items.len(),
                "Diff computed"
            );
            reports.push(report);
        }
        Ok(reports)
    }

    /// Write accepted prices into the hub. Returns whether any entry changed.
    pub async fn commit(&self, changes: &[PriceChange]) -> Result<bool, AppError> {
        if changes.is_empty() {
            return Ok(false);
        }
        let affected = self.hub.update_prices(changes).await?;
        tracing::info!(changes = changes.len(), affected, "Prices committed");
        Ok(affected > 0)
    }

    pub async fn commit_reports(&self, reports: &[DiffReport]) -> Result<bool, AppError> {
        self.commit(&changes_from_reports(reports)).await
    }
}
