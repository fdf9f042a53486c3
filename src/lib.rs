pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod error;
pub mod feature_store;
pub mod fixture_features;
pub mod pipeline;
pub mod player_features;
pub mod raw_store;
pub mod records;
pub mod schema;
pub mod training;

pub use error::PipelineError;
pub use schema::field_schema;
