//! # Engine Module
//!
//! Database implementation, bottom-up:
//! - Identifiers and bitsets (`types`)
//! - Type registry (`registry`)
//! - Column storage and tables (`storage`, `database`)
//! - Categories (`category`)
//! - Entity directory, blueprints, and the world context (`entity`,
//!   `blueprint`, `world`)
//! - Deferred op buffers (`ops`)
//! - Filters and datasets (`filter`, `query`)
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod config;
pub mod registry;
pub mod borrow;
pub mod storage;
pub mod database;
pub mod category;
pub mod entity;
pub mod blueprint;
pub mod ops;
pub mod filter;
pub mod query;
pub mod world;
