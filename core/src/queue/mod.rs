//! Capability lanes: tagged job payloads, the transport seam, and the dispatcher
//! that maps task priority onto lane order.

mod dispatcher;
mod local;
mod payload;
mod retry;
mod transport;

pub use dispatcher::{QueueDispatcher, RetryStrategyBuilder};
pub use local::LocalTransport;
pub use payload::{BackendJob, FrontendJob, InfrastructureJob, JobPayload, SecurityJob, TestJob};
pub use retry::{ExponentialBackoff, RetryConfig, RetryStrategy};
pub use transport::{
    EnqueueOutcome, Job, JobHandler, JobState, JobStatus, JobTransport, LaneOptions, LaneStats,
};
