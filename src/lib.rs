pub mod config;
pub mod error;
pub mod pipeline;
pub mod pose;
pub mod rep;
pub mod workout;
