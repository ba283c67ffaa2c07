pub mod app;
pub mod catalogue;
pub mod cli;
pub mod config;
pub mod consumer;
pub mod dedup;
pub mod extract;
pub mod fetch;
pub mod filter;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod registry;
pub mod rules;
pub mod utils;
