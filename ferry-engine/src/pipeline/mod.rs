//! Eight-stage deployment pipeline
//!
//! [`PipelineSession`] is the pure wizard state; [`PipelineDriver`] runs each
//! stage's external calls and feeds the results into it.

pub mod driver;
pub mod session;

pub use driver::PipelineDriver;
pub use session::{PipelineSession, stage_from_number};
