//! paritest-core: grading engine, value model, and verdicts.
//!
//! This crate defines the question model, the input generator, the
//! equivalence and feature checks, and the verdicts they produce. Running
//! code and parsing source are left to implementations of the traits in
//! [`traits`] and [`features`].

pub mod checker;
pub mod config;
pub mod engine;
pub mod equivalence;
pub mod error;
pub mod features;
pub mod generator;
pub mod model;
pub mod parser;
pub mod report;
pub mod results;
pub mod traits;
pub mod value;
