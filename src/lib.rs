pub mod audit;
pub mod cli;
pub mod config;
pub mod context;
pub mod flags;
pub mod gate;
pub mod ledger;
pub mod logging;
pub mod memory;
pub mod orchestrator;
pub mod protocol;
pub mod reasoner;
pub mod reliability;
pub mod response;
pub mod server;
pub mod service;
pub mod types;
