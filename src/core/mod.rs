//! Core types shared across the client

pub mod config;
pub mod error;
pub mod value;
