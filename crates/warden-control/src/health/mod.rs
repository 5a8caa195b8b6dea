//! Health scoring and the heartbeat pipeline.

pub mod heartbeat;
pub mod score;


pub use heartbeat::{HeartbeatConfig, HeartbeatOutcome, HeartbeatService};
pub use score::{
    ScoringConfig, calculate_health_score, determine_health_trend, get_health_category,
    should_transition_status,
};
