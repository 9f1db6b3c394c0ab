pub mod error;
pub mod pointcloud;
pub mod remap;

pub use error::{RelabelError, Result};
