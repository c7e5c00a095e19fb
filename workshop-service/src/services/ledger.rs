//! Cost ledger: append-only material and labor records, and their totals.
//!
//! Totals are always recomputed from history, never kept as a running sum.
//! Per data kind there is one authoritative source:
//!
//! 1. dedicated rows (material usage entries, structured labor records);
//! 2. only when a request has none of those, figures from legacy combined
//!    tracking records.
//!
//! Within a row an explicitly stored total wins over a derived one
//! (quantity x live catalog price, hours x rate).

use crate::collaborators::InventoryCatalog;
use crate::error::{Result, WorkshopError};
use crate::models::{
    LedgerTotals, LedgerView, LegacyCombinedRecord, MaterialUsageEntry, NewLaborEntry,
    NewMaterialUsage, Principal, ServiceRequest, StoredAmount, TotalsSource, TrackingDetail,
    TrackingRecord,
};
use crate::services::pricing::round_money;
use crate::services::store::ServiceStore;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Live unit price per item, `None` when the catalog no longer knows it.
pub type PriceSheet = HashMap<String, Option<Decimal>>;

#[derive(Clone)]
pub struct CostLedger {
    store: Arc<dyn ServiceStore>,
    catalog: Arc<dyn InventoryCatalog>,
}

impl CostLedger {
    pub fn new(store: Arc<dyn ServiceStore>, catalog: Arc<dyn InventoryCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Book material. The unit price is not stored; it is read at totals time.
    #[instrument(skip(self, request, input, actor), fields(request_id = %request.request_id, item_ref = %input.item_ref))]
    pub async fn add_material(
        &self,
        request: &ServiceRequest,
        input: &NewMaterialUsage,
        actor: &Principal,
    ) -> Result<MaterialUsageEntry> {
        input.validate()?;

        if self.catalog.unit_price(&input.item_ref).await?.is_none() {
            return Err(WorkshopError::NotFound(format!(
                "Inventory item {} not found",
                input.item_ref
            )));
        }

        let entry = MaterialUsageEntry {
            entry_id: Uuid::new_v4(),
            request_id: request.request_id,
            item_ref: input.item_ref.clone(),
            quantity: StoredAmount::from(input.quantity),
            total: None,
            actor_id: actor.principal_id.clone(),
            recorded_utc: Utc::now(),
        };

        self.store.append_material(&entry).await?;

        info!(
            entry_id = %entry.entry_id,
            quantity = %input.quantity,
            "Material usage recorded"
        );

        Ok(entry)
    }

    /// Book labor. Cost is `hours x rate`, rounded once here and stored.
    #[instrument(skip(self, request, input, actor), fields(request_id = %request.request_id))]
    pub async fn add_labor(
        &self,
        request: &ServiceRequest,
        input: &NewLaborEntry,
        actor: &Principal,
    ) -> Result<TrackingRecord> {
        input.validate()?;

        let cost = input
            .hours
            .checked_mul(input.rate_per_hour)
            .map(round_money)
            .ok_or_else(|| {
                WorkshopError::Validation(format!(
                    "Labor cost {} x {} is out of range",
                    input.hours, input.rate_per_hour
                ))
            })?;
        let record = TrackingRecord {
            tracking_id: Uuid::new_v4(),
            request_id: request.request_id,
            note: input.description.clone(),
            detail: TrackingDetail::Labor {
                hours: Some(input.hours.into()),
                rate_per_hour: Some(input.rate_per_hour.into()),
                cost: Some(cost.into()),
            },
            status_at_entry: request.status,
            actor_id: actor.principal_id.clone(),
            recorded_utc: Utc::now(),
        };

        self.store.append_tracking(&record).await?;

        info!(tracking_id = %record.tracking_id, cost = %cost, "Labor recorded");

        Ok(record)
    }

    /// Replay a historical combined-cost record into the tracking history.
    #[instrument(skip(self, legacy))]
    pub async fn import_legacy(
        &self,
        request_id: Uuid,
        legacy: LegacyCombinedRecord,
    ) -> Result<TrackingRecord> {
        let record = TrackingRecord {
            tracking_id: Uuid::new_v4(),
            request_id,
            note: legacy.note,
            detail: TrackingDetail::LegacyCombined {
                labor_cost: legacy.labor_cost,
                materials_cost: legacy.materials_cost,
            },
            status_at_entry: legacy.status_at_entry,
            actor_id: legacy.actor_id,
            recorded_utc: legacy.recorded_utc,
        };

        self.store.append_tracking(&record).await?;

        info!(tracking_id = %record.tracking_id, "Legacy tracking record imported");

        Ok(record)
    }

    pub async fn view(&self, request_id: Uuid) -> Result<LedgerView> {
        let mut materials = self.store.list_materials(request_id).await?;
        let mut tracking = self.store.list_tracking(request_id).await?;
        materials.sort_by_key(|entry| entry.recorded_utc);
        tracking.sort_by_key(|record| record.recorded_utc);

        Ok(LedgerView {
            request_id,
            materials,
            tracking,
        })
    }

    /// Aggregate totals for a request. Reads only; repeated calls without
    /// intervening writes (or catalog price changes) give identical results.
    #[instrument(skip(self))]
    pub async fn compute_totals(&self, request_id: Uuid) -> Result<LedgerTotals> {
        let materials = self.store.list_materials(request_id).await?;
        let tracking = self.store.list_tracking(request_id).await?;
        let prices = self.live_prices(&materials).await?;

        Ok(resolve_totals(&materials, &tracking, &prices))
    }

    async fn live_prices(&self, materials: &[MaterialUsageEntry]) -> Result<PriceSheet> {
        let mut prices = PriceSheet::new();
        for entry in materials.iter().filter(|entry| entry.total.is_none()) {
            if !prices.contains_key(&entry.item_ref) {
                let price = self.catalog.unit_price(&entry.item_ref).await?;
                prices.insert(entry.item_ref.clone(), price);
            }
        }
        Ok(prices)
    }
}

/// Number of records that contribute to totals.
pub fn ledger_revision(materials: &[MaterialUsageEntry], tracking: &[TrackingRecord]) -> u64 {
    (materials.len() + tracking.iter().filter(|r| r.is_costed()).count()) as u64
}

/// Pure totals resolution over already loaded records.
pub fn resolve_totals(
    materials: &[MaterialUsageEntry],
    tracking: &[TrackingRecord],
    prices: &PriceSheet,
) -> LedgerTotals {
    let (materials_total, materials_source) = if !materials.is_empty() {
        let lines = materials
            .iter()
            .map(|entry| (entry.entry_id, material_line_cost(entry, prices)));
        (checked_total(lines), TotalsSource::Entries)
    } else {
        legacy_figure(tracking, LegacyField::Materials)
    };

    let has_labor_rows = tracking
        .iter()
        .any(|r| matches!(r.detail, TrackingDetail::Labor { .. }));

    let (labor_total, labor_source) = if has_labor_rows {
        let lines = tracking
            .iter()
            .filter_map(|record| labor_line_cost(record).map(|cost| (record.tracking_id, cost)));
        (checked_total(lines), TotalsSource::Entries)
    } else {
        legacy_figure(tracking, LegacyField::Labor)
    };

    LedgerTotals {
        materials_total,
        labor_total,
        materials_source,
        labor_source,
        revision: ledger_revision(materials, tracking),
    }
}

fn material_line_cost(entry: &MaterialUsageEntry, prices: &PriceSheet) -> Decimal {
    if let Some(total) = &entry.total {
        return round_money(total.resolve("total", entry.entry_id));
    }

    let quantity = entry.quantity.resolve("quantity", entry.entry_id);
    match prices.get(&entry.item_ref).copied().flatten() {
        Some(unit_price) => checked_line(quantity, unit_price, entry.entry_id),
        None => {
            warn!(
                entry_id = %entry.entry_id,
                item_ref = %entry.item_ref,
                "Inventory item missing from catalog, counting line as zero"
            );
            Decimal::ZERO
        }
    }
}

fn labor_line_cost(record: &TrackingRecord) -> Option<Decimal> {
    let TrackingDetail::Labor {
        hours,
        rate_per_hour,
        cost,
    } = &record.detail
    else {
        return None;
    };

    if let Some(cost) = cost {
        return Some(round_money(cost.resolve("cost", record.tracking_id)));
    }

    match (hours, rate_per_hour) {
        (Some(hours), Some(rate)) => Some(checked_line(
            hours.resolve("hours", record.tracking_id),
            rate.resolve("rate_per_hour", record.tracking_id),
            record.tracking_id,
        )),
        _ => {
            warn!(
                tracking_id = %record.tracking_id,
                "Labor record has neither cost nor hours and rate, counting as zero"
            );
            Some(Decimal::ZERO)
        }
    }
}

#[derive(Clone, Copy)]
enum LegacyField {
    Labor,
    Materials,
}

fn legacy_figure(tracking: &[TrackingRecord], field: LegacyField) -> (Decimal, TotalsSource) {
    let figures: Vec<(Uuid, Decimal)> = tracking
        .iter()
        .filter_map(|record| {
            let TrackingDetail::LegacyCombined {
                labor_cost,
                materials_cost,
            } = &record.detail
            else {
                return None;
            };
            let (amount, name) = match field {
                LegacyField::Labor => (labor_cost, "labor_cost"),
                LegacyField::Materials => (materials_cost, "materials_cost"),
            };
            amount.as_ref().map(|amount| {
                (
                    record.tracking_id,
                    round_money(amount.resolve(name, record.tracking_id)),
                )
            })
        })
        .collect();

    if figures.is_empty() {
        (Decimal::ZERO, TotalsSource::Empty)
    } else {
        (checked_total(figures), TotalsSource::Legacy)
    }
}

/// `quantity x price` rounded, or zero when the product does not fit.
fn checked_line(quantity: Decimal, unit_price: Decimal, record_id: Uuid) -> Decimal {
    match quantity.checked_mul(unit_price) {
        Some(cost) => round_money(cost),
        None => {
            warn!(
                record_id = %record_id,
                quantity = %quantity,
                unit_price = %unit_price,
                "Line cost out of range, counting as zero"
            );
            Decimal::ZERO
        }
    }
}

/// Sum of line costs. A line that would overflow the running total is
/// left out.
fn checked_total(lines: impl IntoIterator<Item = (Uuid, Decimal)>) -> Decimal {
    lines.into_iter().fold(Decimal::ZERO, |total, (record_id, cost)| {
        total.checked_add(cost).unwrap_or_else(|| {
            warn!(
                record_id = %record_id,
                cost = %cost,
                "Line cost overflows the total, counting as zero"
            );
            total
        })
    })
}
