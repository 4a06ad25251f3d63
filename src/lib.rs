pub mod alternatives;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod lifecycle;
pub mod nl;
pub mod output;
pub mod params;
pub mod plan;
pub mod report;
pub mod server;
pub mod session;
pub mod solver;
