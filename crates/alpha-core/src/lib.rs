//! alpha-dash core model
//!
//! Plain data types shared by the dashboard service and its clients:
//! overlap grades, token records, ROI analyses and analysis jobs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analysis;
pub mod grade;
pub mod job;
pub mod time;
pub mod token;

pub use analysis::{AnalysisParams, AnalysisRequest, AnalysisResult, TraderRecord};
pub use grade::Grade;
pub use job::{AnalysisJob, JobStatus};
pub use token::TokenRecord;
