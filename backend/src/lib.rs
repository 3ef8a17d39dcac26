pub mod capability;
pub mod config;
pub mod db;
pub mod metrics;
pub mod reconciler;
pub mod release;
pub mod webhook;
