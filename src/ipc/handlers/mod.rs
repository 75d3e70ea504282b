pub mod core;
pub mod grid;
