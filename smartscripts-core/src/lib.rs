pub mod api;
pub mod review;

pub use api::*;
pub use review::*;
