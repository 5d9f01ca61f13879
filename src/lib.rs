//! sponsorgraph: referral graph maintenance
//!
//! Layers, innermost first:
//! - `domain`: graph model, commission engine, analyzer, sponsor resolver (pure)
//! - `application`: integrity, repair, rename and order services over a store
//! - `infrastructure`: the `GraphStore` boundary, its implementations, DI
//! - `cli`: argument parsing, command dispatch, terminal output

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
