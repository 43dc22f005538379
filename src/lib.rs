pub mod aggregate;
pub mod changes;
pub mod cli;
pub mod config;
pub mod diff;
pub mod error;
pub mod github;
pub mod logging;
pub mod model;
pub mod parsers;
pub mod pipeline;
pub mod report;
