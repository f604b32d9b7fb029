//! Certificate Exchange Server
//!
//! A demonstration exchange server that runs the certificate matching engine
//! against a simulated market, with real-time metrics and monitoring.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use rec_exchange_engine::exchange::{
    CategoryPath, DeviceTypeRegistry, DeviceVintage, LocationRegistry, Order, OrderBook, OrderId,
    Product,
};
use rec_exchange_engine::metrics::MetricsReporter;
use rec_exchange_engine::utils::{format_price, format_volume, time::Clock};
use rec_exchange_engine::ExchangeMetrics;

const DEVICE_TYPES: &[&str] = &[
    "Solar/Photovoltaic/RoofMounted",
    "Solar/Photovoltaic/GroundMounted",
    "Solar/Concentration",
    "Wind/Onshore",
    "Wind/Offshore",
    "Hydro/RunOfRiver",
    "Marine/Tidal",
];

const LOCATIONS: &[&str] = &[
    "Germany/Bavaria",
    "Germany/Saxony",
    "France/Brittany",
    "Spain/Andalusia",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Starting Certificate Exchange Server...");

    let devices = Arc::new(DeviceTypeRegistry::from_paths(DEVICE_TYPES)?);
    let locations = Arc::new(LocationRegistry::from_paths(LOCATIONS)?);

    let book = Arc::new(OrderBook::new(devices, locations));
    let metrics = Arc::new(ExchangeMetrics::new());

    // Start metrics reporting
    let reporter = MetricsReporter::new(Arc::clone(&metrics), Duration::from_secs(5));
    tokio::spawn(async move {
        reporter.run().await;
    });

    // Expiry scheduler: the book never watches the clock itself
    {
        let book = Arc::clone(&book);
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(1));
            loop {
                tick.tick().await;
                let expired = metrics.time_expire(|| book.expire(Clock::now()));
                if !expired.is_empty() {
                    metrics.increment_orders_expired(expired.len() as u64);
                }
            }
        });
    }

    // Market activity simulation
    {
        let book = Arc::clone(&book);
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            simulate_market_activity(book, metrics).await;
        });
    }

    // Server statistics reporting
    {
        let book = Arc::clone(&book);
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(10));
            loop {
                tick.tick().await;

                let stats = book.get_stats();
                metrics.set_resting_asks(stats.ask_orders as u64);
                metrics.set_resting_bids(stats.bid_orders as u64);
                if let Some(ask) = stats.best_ask {
                    metrics.set_best_ask(ask);
                }
                if let Some(bid) = stats.best_bid {
                    metrics.set_best_bid(bid);
                }
                if let Some(spread) = book.spread() {
                    metrics.set_spread(spread);
                }

                info!(
                    "Book | Asks: {} | Bids: {} | Best ask: {:?} | Best bid: {:?} | Trades: {} | Volume: {}",
                    stats.ask_orders,
                    stats.bid_orders,
                    stats.best_ask.map(|p| format_price(p, 0.01)),
                    stats.best_bid.map(|p| format_price(p, 0.01)),
                    stats.total_trades,
                    format_volume(stats.total_volume)
                );
            }
        });
    }

    // Start Prometheus metrics exporter
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server().await {
            error!("Failed to start metrics server: {}", e);
        }
    });

    info!("Exchange server is running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutting down exchange server...");

    let stats = book.get_stats();
    info!(
        "Final stats: {} resting orders, {} trades, {} traded",
        stats.ask_orders + stats.bid_orders,
        stats.total_trades,
        format_volume(stats.total_volume)
    );

    Ok(())
}

/// Simulate a certificate market: sellers list production, buyers hunt for
/// profiles, some orders get cancelled, short-lived asks expire.
async fn simulate_market_activity(book: Arc<OrderBook>, metrics: Arc<ExchangeMetrics>) {
    let mut tick = interval(Duration::from_millis(20));
    let mut counter: u64 = 0;
    let mut open_asks: Vec<OrderId> = Vec::new();

    // Initial liquidity: a seller per device type, staggered vintages
    for (i, device_type) in DEVICE_TYPES.iter().enumerate() {
        let product = Product::any()
            .with_device_types(vec![parse_path(device_type)])
            .with_locations(vec![parse_path(LOCATIONS[i % LOCATIONS.len()])])
            .with_vintage(DeviceVintage::new(2015 + (i as i32 % 6)));

        match Order::new_ask(format!("seed-seller-{}", i), 9500 + (i as u64 * 120), 500, product, Clock::now())
        {
            Ok(ask) => match metrics.time_submit(|| book.submit(ask)) {
                Ok(result) => {
                    metrics.increment_orders_submitted();
                    open_asks.push(result.order.id);
                }
                Err(e) => warn!("Failed to seed ask: {}", e),
            },
            Err(e) => warn!("Failed to build seed ask: {}", e),
        }
    }

    info!("Initial liquidity added: {} asks", open_asks.len());

    loop {
        tick.tick().await;
        counter += 1;

        match counter % 10 {
            // Fresh asks (30% of activity), occasionally short-lived
            0..=2 => {
                let device_type = DEVICE_TYPES[(counter as usize / 3) % DEVICE_TYPES.len()];
                let product = Product::any()
                    .with_device_types(vec![parse_path(device_type)])
                    .with_locations(vec![parse_path(
                        LOCATIONS[counter as usize % LOCATIONS.len()],
                    )])
                    .with_vintage(DeviceVintage::new(2015 + (counter as i32 % 7)));

                let price = 9000 + (counter % 50) * 25;
                let volume = 50 + (counter % 10) * 20;
                let seller = format!("seller-{}", counter % 17);

                let ask = match Order::new_ask(seller, price, volume, product, Clock::now()) {
                    Ok(ask) => {
                        if counter % 7 == 0 {
                            ask.with_expiry(Clock::now() + chrono::Duration::seconds(30))
                        } else {
                            ask
                        }
                    }
                    Err(e) => {
                        warn!("Failed to build ask: {}", e);
                        continue;
                    }
                };

                match metrics.time_submit(|| book.submit(ask)) {
                    Ok(result) => {
                        metrics.increment_orders_submitted();
                        record_trades(&metrics, &result.trades);
                        if !result.order.status.is_terminal() {
                            open_asks.push(result.order.id);
                        }
                    }
                    Err(e) => warn!("Ask rejected: {}", e),
                }
            }

            // Bids hunting for a profile (50% of activity)
            3..=7 => {
                let filter = bid_filter(counter);
                let price = 9200 + (counter % 60) * 25;
                let volume = 40 + (counter % 8) * 30;
                let buyer = format!("buyer-{}", counter % 23);

                let bid = Order::new_bid(buyer, price, volume, filter, Clock::now());
                match metrics.time_submit(|| book.submit(bid)) {
                    Ok(result) => {
                        metrics.increment_orders_submitted();
                        record_trades(&metrics, &result.trades);
                    }
                    Err(e) => warn!("Bid rejected: {}", e),
                }
            }

            // Cancellations (20% of activity)
            _ => {
                if open_asks.len() > 32 {
                    let victim = open_asks.remove((counter as usize) % open_asks.len());
                    // Cancels of already filled or expired asks fail; that
                    // rejection is part of normal market noise here
                    if metrics.time_cancel(|| book.cancel(&victim)).is_ok() {
                        metrics.increment_orders_cancelled();
                    }
                }
            }
        }
    }
}

/// Rotate through filter shapes: broad category, exact leaf, located,
/// vintage-capped, or fully unconstrained
fn bid_filter(counter: u64) -> Product {
    match counter % 5 {
        0 => Product::any().with_device_types(vec![parse_path("Solar")]),
        1 => Product::any().with_device_types(vec![parse_path("Wind/Offshore")]),
        2 => Product::any()
            .with_device_types(vec![parse_path("Wind"), parse_path("Hydro")])
            .with_locations(vec![parse_path("Germany")]),
        3 => Product::any()
            .with_device_types(vec![parse_path("Solar")])
            .with_vintage(DeviceVintage::new(2018)),
        _ => Product::any(),
    }
}

fn record_trades(metrics: &ExchangeMetrics, trades: &[rec_exchange_engine::Trade]) {
    for trade in trades {
        metrics.increment_trades_executed(trade.volume, trade.price * trade.volume);
    }
}

fn parse_path(raw: &str) -> CategoryPath {
    raw.parse().expect("static category paths are well-formed")
}

/// Start Prometheus metrics exporter
async fn start_metrics_server() -> Result<(), Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::SocketAddr;

    let addr: SocketAddr = "0.0.0.0:9090".parse()?;

    let builder = PrometheusBuilder::new().with_http_listener(addr);
    builder.install()?;

    info!("Prometheus metrics available at http://{}/metrics", addr);

    Ok(())
}
