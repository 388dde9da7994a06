//! Process-internal scheduling for the replay flow.

pub mod retransmission_job;

pub use retransmission_job::{JobRunOutcome, RetransmissionJob};
