pub mod config;
pub mod datetime;
pub mod extract;
pub mod fetch;
pub mod filter;
pub mod ics;
pub mod model;
pub mod pipeline;
pub mod reduce;
pub mod store;
pub mod text;
