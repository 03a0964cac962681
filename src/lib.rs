pub mod config;
pub mod db;
pub mod device;
pub mod engine;
pub mod models;
pub mod month_scores;
pub mod report;
pub mod source;
pub mod staging;
pub mod window;

pub use engine::{aggregate, count_nightmares, summarize, AggregationResult, Summary};
pub use window::{filter_by_window, resolve_window, Calendar, EngineError, Interval, TimeWindow};
