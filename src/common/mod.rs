pub mod frame;
pub mod geometry;

pub use frame::Frame;
pub use geometry::{BoundingBox, Point};
