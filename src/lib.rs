//! Presence Matter Bridge library.
//!
//! Reads an LD2410 presence radar over a serial link and reports occupancy
//! and ambient light as Matter attributes.

#![recursion_limit = "256"]

pub mod bridge;
pub mod config;
pub mod error;
pub mod instance_lock;
pub mod join;
pub mod matter;
pub mod sensor;
