pub mod activity;
pub mod archetype;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod population;
pub mod scheduler;
pub mod session;
pub mod sync;
pub mod users;
