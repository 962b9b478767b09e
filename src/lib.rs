pub mod archive;
pub mod config;
pub mod fetch;
pub mod hooks;
pub mod pipeline;
pub mod process;

pub use config::PipelineConfig;
pub use pipeline::{generate_ssl_data, Pipeline, RunSummary};
