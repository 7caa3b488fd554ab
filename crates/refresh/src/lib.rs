pub mod cache;
pub mod forecast;
pub mod orchestrator;
pub mod scheduler;
pub mod timestamp;

pub use cache::{CacheEntry, FreshnessCache};
pub use forecast::{aggregate_forecast, FORECAST_PRIORITY};
pub use orchestrator::{CityRefresh, Orchestrator, OrchestratorSettings};
pub use scheduler::{RefreshScheduler, SchedulerState, TickSummary};
pub use timestamp::resolve_observed_at;
