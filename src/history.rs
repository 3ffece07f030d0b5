//! Response aggregation and the bounded exchange history.

#[path = "history/exchange.rs"]
mod exchange;

#[path = "history/aggregator.rs"]
mod aggregator;

pub use aggregator::ResponseAggregator;
pub use exchange::{Exchange, ExchangeHistory, HistoryCapacity, DEFAULT_HISTORY_CAPACITY};
