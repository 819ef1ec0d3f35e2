//! checkhost Aggregator API
//!
//! The telemetry surface checks use to report measurements and service
//! checks. Every emission is buffered by the sender and only handed to the
//! aggregation pipeline when the check calls [`Sender::commit`].
//!
//! ```text
//!   check code ──► Sender (CheckSender) ──commit──► flume channel ──► pipeline
//!                     │ buffer
//!                     └─ MetricSample / ServiceCheck in emission order
//! ```
//!
//! [`testing::MockSender`] records calls instead of forwarding them, so check
//! behavior can be asserted without a live pipeline.

pub mod check_sender;
pub mod manager;
pub mod metrics;
pub mod sender;
pub mod testing;

pub use check_sender::{commit_channel, CheckSender, CommitBatch};
pub use manager::{SenderManager, SenderProvider};
pub use sender::{Emission, MetricSample, MetricType, Sender, ServiceCheck, ServiceCheckStatus};
