// src/lib.rs

pub mod aggregate;
pub mod binning;
pub mod classify;
pub mod config;
pub mod discovery;
pub mod hexgrid;
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod scoring;
pub mod tags;
pub mod utils;
