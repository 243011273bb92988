pub mod config;
pub mod cost;
pub mod regression;
pub mod size;

pub use config::*;
pub use cost::*;
pub use regression::*;
pub use size::*;
