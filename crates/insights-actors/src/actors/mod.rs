//! Every entity actor in the system, one module per kind.
//!
//! Operations are inherent methods on `ActorRef<ThatActor>`, so callers
//! address an actor by key and call it like a local handle:
//!
//! ```ignore
//! let hourly = runtime.actor::<HourlyMetricsActor>(&keys::hourly_metrics(app, now));
//! hourly.increment_page_views().await?;
//! ```

pub mod application;
pub mod conversion;
pub mod daily;
pub mod event;
pub mod funnel;
pub mod funnel_analytics;
pub mod funnel_summary;
pub mod goal;
pub mod hourly;
pub mod page_view;
pub mod realtime;
pub mod retention;
pub mod session;
pub mod visitor;

use tracing::warn;

pub use application::ApplicationActor;
pub use conversion::ConversionActor;
pub use daily::{roll_up_hour, DailyMetricsActor};
pub use event::EventActor;
pub use funnel::FunnelActor;
pub use funnel_analytics::FunnelAnalyticsActor;
pub use funnel_summary::FunnelSummaryActor;
pub use goal::GoalActor;
pub use hourly::HourlyMetricsActor;
pub use page_view::PageViewActor;
pub use realtime::{RealTimeCoordinatorActor, RealTimeShardActor};
pub use retention::RetentionCohortActor;
pub use session::SessionActor;
pub use visitor::VisitorActor;

/// Log a failed side-effect call and carry on. The primary write has already
/// happened, so the caller's operation still succeeds.
pub(crate) fn best_effort(result: anyhow::Result<()>, from: &str, what: &'static str) {
    if let Err(e) = result {
        warn!(from, what, error = %e, "side effect failed");
    }
}
