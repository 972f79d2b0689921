pub mod events;
pub mod metadata;
pub mod session;
pub mod stats;

pub use events::{EventBus, SubscriptionId, WorkoutEvent};
pub use metadata::{RepRecord, WorkoutMetadata, WorkoutSummary};
pub use session::{Workout, WorkoutStatus};
pub use stats::WorkoutStats;
