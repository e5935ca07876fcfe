//! Stock availability
//!
//! All-or-nothing checks run before any order line is created.

use jiff::Timestamp;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    channels::Channel,
    products::VariantId,
    store::{StoreError, StoreTransaction},
    warehouse::{
        InsufficientStock, InsufficientStockData, LineQuantity, StockError, WarehouseId,
        warehouses_for_country,
    },
};

/// Check regular stock and preorder thresholds for every line at once.
///
/// # Errors
///
/// Returns [`StockError::InsufficientStock`] listing every line that cannot be
/// supplied, or [`StockError::Store`] if stock cannot be read.
pub fn check_stock_and_preorder_quantity_bulk<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    lines: &[LineQuantity<'_>],
    country_code: &str,
    channel: &Channel,
    warehouse_filter: Option<WarehouseId>,
    point_in_time: Timestamp,
) -> Result<(), StockError> {
    let (preorder_lines, stock_lines): (Vec<_>, Vec<_>) = lines
        .iter()
        .copied()
        .partition(|line| line.variant.is_preorder_active(point_in_time));

    let mut items =
        check_stock_quantity_bulk(tx, &stock_lines, country_code, channel, warehouse_filter)?;
    items.extend(check_preorder_threshold_bulk(tx, &preorder_lines)?);

    if items.is_empty() {
        return Ok(());
    }

    Err(InsufficientStock { items }.into())
}

/// Shortages of regular stock across the channel's warehouses for the country.
///
/// Lines of the same variant are checked against their combined quantity.
/// Variants without any stock fall short even when they do not track
/// inventory.
///
/// # Errors
///
/// Returns a [`StoreError`] if stock cannot be read.
pub fn check_stock_quantity_bulk<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    lines: &[LineQuantity<'_>],
    country_code: &str,
    channel: &Channel,
    warehouse_filter: Option<WarehouseId>,
) -> Result<Vec<InsufficientStockData>, StoreError> {
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let warehouse_ids: FxHashSet<WarehouseId> =
        warehouses_for_country(tx, channel.id, country_code, warehouse_filter)?
            .into_iter()
            .map(|warehouse| warehouse.id)
            .collect();

    let variant_ids: Vec<VariantId> = lines.iter().map(|line| line.variant.id).collect();
    let requested = requested_per_variant(lines);

    let mut available: FxHashMap<VariantId, u32> = FxHashMap::default();
    for stock in tx.stocks_for_update(&variant_ids)? {
        if !warehouse_ids.contains(&stock.warehouse_id) {
            continue;
        }

        let sum = available.entry(stock.variant_id).or_default();
        *sum = sum.saturating_add(stock.available_quantity());
    }

    let mut items = Vec::new();
    for line in lines {
        if line.quantity == 0 {
            continue;
        }

        let Some(available_quantity) = available.get(&line.variant.id).copied() else {
            items.push(InsufficientStockData {
                variant_id: line.variant.id,
                order_line_id: line.order_line_id,
                warehouse_id: warehouse_filter,
                available_quantity: Some(0),
            });
            continue;
        };

        let quantity = requested.get(&line.variant.id).copied().unwrap_or(line.quantity);
        if line.variant.track_inventory && quantity > available_quantity {
            items.push(InsufficientStockData {
                variant_id: line.variant.id,
                order_line_id: line.order_line_id,
                warehouse_id: warehouse_filter,
                available_quantity: Some(available_quantity),
            });
        }
    }

    Ok(items)
}

fn requested_per_variant(lines: &[LineQuantity<'_>]) -> FxHashMap<VariantId, u32> {
    let mut requested: FxHashMap<VariantId, u32> = FxHashMap::default();

    for line in lines {
        let sum = requested.entry(line.variant.id).or_default();
        *sum = sum.saturating_add(line.quantity);
    }

    requested
}

/// Shortages against the per-channel and global preorder thresholds.
///
/// Lines of the same variant are checked against their combined quantity.
///
/// # Errors
///
/// Returns a [`StoreError`] if preorder allocations cannot be read.
pub fn check_preorder_threshold_bulk<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    lines: &[LineQuantity<'_>],
) -> Result<Vec<InsufficientStockData>, StoreError> {
    let requested = requested_per_variant(lines);
    let mut items = Vec::new();

    for line in lines {
        let quantity = requested.get(&line.variant.id).copied().unwrap_or(line.quantity);

        if let Some(threshold) = line.channel_listing.preorder_quantity_threshold {
            let allocated: u32 = tx
                .preorder_allocations(&[line.channel_listing.id])?
                .iter()
                .map(|allocation| allocation.quantity)
                .sum();
            let available_quantity = threshold.saturating_sub(allocated);

            if quantity > available_quantity {
                items.push(InsufficientStockData {
                    variant_id: line.variant.id,
                    order_line_id: line.order_line_id,
                    warehouse_id: None,
                    available_quantity: Some(available_quantity),
                });
                continue;
            }
        }

        if let Some(threshold) = line.variant.preorder_global_threshold {
            let listing_ids: Vec<_> = tx
                .variant_channel_listings(line.variant.id)?
                .iter()
                .map(|listing| listing.id)
                .collect();
            let allocated: u32 = tx
                .preorder_allocations(&listing_ids)?
                .iter()
                .map(|allocation| allocation.quantity)
                .sum();
            let available_quantity = threshold.saturating_sub(allocated);

            if quantity > available_quantity {
                items.push(InsufficientStockData {
                    variant_id: line.variant.id,
                    order_line_id: line.order_line_id,
                    warehouse_id: None,
                    available_quantity: Some(available_quantity),
                });
            }
        }
    }

    Ok(items)
}
