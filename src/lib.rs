//! Library root for the `story_tier` crate
//! Login-gated viewership tier prediction for Hindi news stories

// Core error handling
pub mod api_errors;
pub mod errors;

// Story vocabulary & encoding
pub mod encoder;
pub mod story;
pub mod vocabulary;

// Models & ensemble
pub mod classifier;
pub mod ensemble;
pub mod model_cache;
pub mod predictor;
pub mod tier;

// Session gate & audit
pub mod audit;
pub mod auth;
pub mod secrets;
pub mod session_context;

// Configuration & CLI
pub mod cli;
pub mod config;
pub mod logging;

// Web server interface
pub mod app_state;
pub mod render;
pub mod web;
