pub mod analytics;

pub use analytics::{
    date_stats, high_demand_dates, market_position, price_alerts, rate_changes, DateStats,
    HighDemandDate, PriceAlert, RateChange,
};
