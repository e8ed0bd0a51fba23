// Typed publish/subscribe channel between monitors, orchestrators and outer surfaces

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventHandler, SubscriptionId};
pub use types::{GitOperation, MonitorId, PipelineEvent, StageResult, StartRequest};
