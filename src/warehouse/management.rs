//! Stock allocation
//!
//! Draws order line quantities from warehouse stock inside the transaction
//! that creates the order lines.

use std::sync::Arc;

use jiff::Timestamp;
use tracing::{debug, warn};

use crate::{
    channels::{AllocationStrategy, Channel},
    orders::events::OrderEvents,
    products::VariantId,
    store::StoreTransaction,
    warehouse::{
        Allocation, AllocationId, InsufficientStock, InsufficientStockData, LineQuantity,
        PreorderAllocation, PreorderAllocationId, Stock, StockError, WarehouseId,
        availability::check_preorder_threshold_bulk, warehouses_for_country,
    },
};

/// Allocate regular stock for order lines.
///
/// Lines whose variant does not track inventory or is on active preorder are
/// skipped. Stocks are drawn in the channel's [`AllocationStrategy`] order,
/// each giving as many units as it has available. Stocks that run out are
/// reported through `events` once the transaction commits.
///
/// # Errors
///
/// Returns [`StockError::InsufficientStock`] if any line cannot be fully
/// allocated; nothing is written in that case.
pub fn allocate_stocks<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    lines: &[LineQuantity<'_>],
    country_code: &str,
    channel: &Channel,
    warehouse_filter: Option<WarehouseId>,
    point_in_time: Timestamp,
    events: &Arc<dyn OrderEvents>,
) -> Result<Vec<Allocation>, StockError> {
    let lines: Vec<_> = lines
        .iter()
        .filter(|line| {
            line.variant.track_inventory && !line.variant.is_preorder_active(point_in_time)
        })
        .collect();

    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let warehouses = warehouses_for_country(tx, channel.id, country_code, warehouse_filter)?;
    let variant_ids: Vec<VariantId> = lines.iter().map(|line| line.variant.id).collect();

    let mut stocks: Vec<(usize, Stock)> = tx
        .stocks_for_update(&variant_ids)?
        .into_iter()
        .filter_map(|stock| {
            warehouses
                .iter()
                .position(|warehouse| warehouse.id == stock.warehouse_id)
                .map(|position| (position, stock))
        })
        .collect();

    sort_stocks(&mut stocks, channel.allocation_strategy);

    let mut allocations = Vec::new();
    let mut touched = vec![false; stocks.len()];
    let mut items = Vec::new();

    for line in lines {
        let Some(order_line_id) = line.order_line_id else {
            continue;
        };

        let mut remaining = line.quantity;

        for ((_, stock), touched) in stocks
            .iter_mut()
            .zip(touched.iter_mut())
            .filter(|((_, stock), _)| stock.variant_id == line.variant.id)
        {
            if remaining == 0 {
                break;
            }

            let quantity = remaining.min(stock.available_quantity());
            if quantity == 0 {
                continue;
            }

            stock.quantity_allocated += quantity;
            remaining -= quantity;
            *touched = true;

            allocations.push(Allocation {
                id: AllocationId::new(),
                order_line_id,
                stock_id: stock.id,
                quantity_allocated: quantity,
            });
        }

        if remaining > 0 {
            items.push(InsufficientStockData {
                variant_id: line.variant.id,
                order_line_id: Some(order_line_id),
                warehouse_id: warehouse_filter,
                available_quantity: Some(line.quantity - remaining),
            });
        }
    }

    if !items.is_empty() {
        warn!(lines = items.len(), "insufficient stock while allocating");

        return Err(InsufficientStock { items }.into());
    }

    for ((_, stock), touched) in stocks.into_iter().zip(touched) {
        if !touched {
            continue;
        }

        if stock.available_quantity() == 0 {
            let events = Arc::clone(events);
            let out_of_stock = stock.clone();
            tx.on_commit(Box::new(move || {
                events.product_variant_out_of_stock(&out_of_stock);
            }));
        }

        tx.save_stock(stock)?;
    }

    debug!(allocations = allocations.len(), "stock allocated");

    tx.insert_allocations(allocations.clone())?;

    Ok(allocations)
}

fn sort_stocks(stocks: &mut [(usize, Stock)], strategy: AllocationStrategy) {
    match strategy {
        AllocationStrategy::PrioritizeSortingOrder => {
            stocks.sort_by_key(|(position, _)| *position);
        }
        AllocationStrategy::PrioritizeHighStock => {
            stocks.sort_by(|(a_position, a), (b_position, b)| {
                b.available_quantity()
                    .cmp(&a.available_quantity())
                    .then(a_position.cmp(b_position))
            });
        }
    }
}

/// Allocate preorder quantities for order lines on active preorder.
///
/// # Errors
///
/// Returns [`StockError::InsufficientStock`] if a preorder threshold would be
/// exceeded.
pub fn allocate_preorders<T: StoreTransaction + ?Sized>(
    tx: &mut T,
    lines: &[LineQuantity<'_>],
    point_in_time: Timestamp,
) -> Result<Vec<PreorderAllocation>, StockError> {
    let lines: Vec<_> = lines
        .iter()
        .copied()
        .filter(|line| line.variant.is_preorder_active(point_in_time))
        .collect();

    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let items = check_preorder_threshold_bulk(tx, &lines)?;
    if !items.is_empty() {
        return Err(InsufficientStock { items }.into());
    }

    let allocations: Vec<PreorderAllocation> = lines
        .iter()
        .filter_map(|line| {
            line.order_line_id.map(|order_line_id| PreorderAllocation {
                id: PreorderAllocationId::new(),
                order_line_id,
                variant_channel_listing_id: line.channel_listing.id,
                quantity: line.quantity,
            })
        })
        .collect();

    tx.insert_preorder_allocations(allocations.clone())?;

    Ok(allocations)
}

#[cfg(test)]
mod tests {
    use rusty_money::{Money, iso::USD};
    use smallvec::smallvec;
    use testresult::TestResult;

    use crate::{
        channels::{Address, ChannelId},
        orders::{
            OrderLineId,
            events::{MockOrderEvents, OrderEvents},
        },
        products::{ProductId, ProductVariant, VariantChannelListing, VariantChannelListingId},
        store::{MemoryStore, Store, StoreTransaction},
        warehouse::{ClickAndCollectOption, StockId, Warehouse},
    };

    use super::*;

    struct Fixture {
        store: MemoryStore,
        channel: Channel,
        variant: ProductVariant,
        listing: VariantChannelListing,
        stock_ids: Vec<StockId>,
    }

    fn fixture(stock_quantities: &[u32], strategy: AllocationStrategy) -> Fixture {
        let channel = Channel {
            id: ChannelId::new(),
            slug: "default".to_string(),
            name: "Default".to_string(),
            currency: USD,
            default_country: "US".to_string(),
            is_active: true,
            allocation_strategy: strategy,
        };
        let variant = ProductVariant {
            id: VariantId::new(),
            product_id: ProductId::new(),
            sku: None,
            name: "Default".to_string(),
            track_inventory: true,
            is_shipping_required: true,
            is_gift_card: false,
            is_preorder: false,
            preorder_end_date: None,
            preorder_global_threshold: None,
        };
        let listing = VariantChannelListing {
            id: VariantChannelListingId::new(),
            variant_id: variant.id,
            channel_id: channel.id,
            price: Some(Money::from_minor(1000, USD)),
            cost_price: None,
            preorder_quantity_threshold: None,
        };

        let mut stock_ids = Vec::new();
        let store = MemoryStore::new();
        store.seed(|tables| {
            for (sort_order, quantity) in (0_u32..).zip(stock_quantities) {
                let warehouse = Warehouse {
                    id: WarehouseId::new(),
                    name: format!("Warehouse {sort_order}"),
                    address: Address::default(),
                    click_and_collect_option: ClickAndCollectOption::Disabled,
                    is_private: true,
                    channel_ids: vec![channel.id],
                    countries: smallvec!["US".to_string()],
                    sort_order,
                };
                let stock = Stock {
                    id: StockId::new(),
                    warehouse_id: warehouse.id,
                    variant_id: variant.id,
                    quantity: *quantity,
                    quantity_allocated: 0,
                };
                stock_ids.push(stock.id);
                tables.stocks.push(stock);
                tables.warehouses.push(warehouse);
            }
        });

        Fixture {
            store,
            channel,
            variant,
            listing,
            stock_ids,
        }
    }

    fn line(fixture: &Fixture, quantity: u32) -> LineQuantity<'_> {
        LineQuantity {
            order_line_id: Some(OrderLineId::new()),
            variant: &fixture.variant,
            channel_listing: &fixture.listing,
            quantity,
        }
    }

    fn quiet_events() -> Arc<dyn OrderEvents> {
        let mut events = MockOrderEvents::new();
        events.expect_product_variant_out_of_stock().return_const(());

        Arc::new(events)
    }

    #[test]
    fn allocations_follow_sorting_order() -> TestResult {
        let fixture = fixture(&[2, 5], AllocationStrategy::PrioritizeSortingOrder);
        let mut tx = fixture.store.begin()?;

        let allocations = allocate_stocks(
            &mut tx,
            &[line(&fixture, 4)],
            "US",
            &fixture.channel,
            None,
            Timestamp::now(),
            &quiet_events(),
        )?;
        tx.commit()?;

        let allocated: Vec<_> = allocations
            .iter()
            .map(|allocation| (allocation.stock_id, allocation.quantity_allocated))
            .collect();
        let expected: Vec<_> = fixture.stock_ids.iter().map(|id| (*id, 2)).collect();

        assert_eq!(allocated, expected);

        let tables = fixture.store.snapshot();
        let allocated_total: u32 = tables.stocks.iter().map(|stock| stock.quantity_allocated).sum();
        assert_eq!(allocated_total, 4);
        assert_eq!(tables.allocations.len(), 2);

        Ok(())
    }

    #[test]
    fn high_stock_strategy_prefers_fuller_warehouse() -> TestResult {
        let fixture = fixture(&[2, 5], AllocationStrategy::PrioritizeHighStock);
        let mut tx = fixture.store.begin()?;

        let allocations = allocate_stocks(
            &mut tx,
            &[line(&fixture, 4)],
            "US",
            &fixture.channel,
            None,
            Timestamp::now(),
            &quiet_events(),
        )?;

        assert_eq!(allocations.len(), 1);
        assert_eq!(
            allocations.first().map(|allocation| allocation.stock_id),
            fixture.stock_ids.get(1).copied()
        );

        Ok(())
    }

    #[test]
    fn shortage_writes_nothing() -> TestResult {
        let fixture = fixture(&[2], AllocationStrategy::PrioritizeSortingOrder);
        let mut tx = fixture.store.begin()?;

        let result = allocate_stocks(
            &mut tx,
            &[line(&fixture, 3)],
            "US",
            &fixture.channel,
            None,
            Timestamp::now(),
            &quiet_events(),
        );

        assert!(matches!(result, Err(StockError::InsufficientStock(_))));
        let stocks = tx.stocks_for_update(&[fixture.variant.id])?;
        assert_eq!(stocks.first().map(|stock| stock.quantity_allocated), Some(0));

        Ok(())
    }

    #[test]
    fn exhausted_stock_is_reported_after_commit() -> TestResult {
        let fixture = fixture(&[2], AllocationStrategy::PrioritizeSortingOrder);
        let mut events = MockOrderEvents::new();
        events
            .expect_product_variant_out_of_stock()
            .times(1)
            .return_const(());
        let events: Arc<dyn OrderEvents> = Arc::new(events);

        let mut tx = fixture.store.begin()?;
        allocate_stocks(
            &mut tx,
            &[line(&fixture, 2)],
            "US",
            &fixture.channel,
            None,
            Timestamp::now(),
            &events,
        )?;
        tx.commit()?;

        Ok(())
    }

    #[test]
    fn untracked_variants_are_not_allocated() -> TestResult {
        let mut fixture = fixture(&[1], AllocationStrategy::PrioritizeSortingOrder);
        fixture.variant.track_inventory = false;
        let mut tx = fixture.store.begin()?;

        let allocations = allocate_stocks(
            &mut tx,
            &[line(&fixture, 10)],
            "US",
            &fixture.channel,
            None,
            Timestamp::now(),
            &quiet_events(),
        )?;

        assert!(allocations.is_empty());

        Ok(())
    }

    #[test]
    fn preorders_are_allocated_against_listing() -> TestResult {
        let mut fixture = fixture(&[], AllocationStrategy::PrioritizeSortingOrder);
        fixture.variant.is_preorder = true;
        fixture.listing.preorder_quantity_threshold = Some(3);
        let mut tx = fixture.store.begin()?;

        let allocations = allocate_preorders(&mut tx, &[line(&fixture, 3)], Timestamp::now())?;
        assert_eq!(allocations.len(), 1);

        let over = allocate_preorders(&mut tx, &[line(&fixture, 1)], Timestamp::now());
        assert!(matches!(over, Err(StockError::InsufficientStock(_))));

        Ok(())
    }
}
