pub mod common;
pub mod strip;
