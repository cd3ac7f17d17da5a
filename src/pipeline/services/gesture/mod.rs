pub mod pose;
pub mod tracker;

pub use pose::{aim_ray, is_finger_gun, AimRay};
pub use tracker::{GestureEvent, GesturePhase, GestureState, GestureTracker};
