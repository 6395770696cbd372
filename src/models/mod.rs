//! Domain model module declarations.

pub mod output;
pub mod plan;
pub mod session;
