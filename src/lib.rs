#![forbid(unsafe_code)]

pub mod activate;
pub mod agents;
pub mod cli;
pub mod config;
pub mod environment;
pub mod envfile;
pub mod error;
pub mod images;
pub mod links;
pub mod materialize;
pub mod orchestrator;
pub mod preflight;
pub mod process;
pub mod stage;
pub mod utils;
