pub mod anomaly;
pub mod check;
pub mod confidence;
pub mod config;
pub mod document;
pub mod error;
pub mod gate;
pub mod io;
pub mod learning;
pub mod paths;
pub mod pattern;
pub mod phase;
pub mod score;
pub mod threshold;
pub mod workflow;

pub use error::{QgateError, Result};
