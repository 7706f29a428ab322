pub mod calibration;
pub mod competition;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluate;
pub mod fixture;
pub mod form;
pub mod pipeline;
pub mod probs;
pub mod providers;
pub mod scorer;
pub mod signal;
pub mod store;
pub mod synthetic;
