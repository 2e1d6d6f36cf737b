//! Integration tests across `bridge-bus` and `bridge-core`.

pub mod cross_talk;
pub mod flows;
pub mod support;
