//! Long-running loops driven by the app.

pub mod logic;
