use crate::common::Point;
use crate::pipeline::types::{HandLandmark, HandObservation};

/// Finger-gun test on a single frame's landmarks.
///
/// The index finger must point forward (tip closer to the camera than its
/// PIP joint, or above it as a fallback), the thumb must stand off the palm
/// (raised above its MCP joint, or offset sideways by more than
/// `thumb_offset_threshold`), and the middle, ring and little fingers must
/// not be extended on both the depth and the vertical axis.
pub fn is_finger_gun(hand: &HandObservation, thumb_offset_threshold: f32) -> bool {
    let lm = |which| hand.landmark(which);

    let index_tip = lm(HandLandmark::IndexTip);
    let index_pip = lm(HandLandmark::IndexPip);
    let index_extended = index_tip.z < index_pip.z || index_tip.y < index_pip.y;

    let thumb_tip = lm(HandLandmark::ThumbTip);
    let thumb_mcp = lm(HandLandmark::ThumbMcp);
    let thumb_up = thumb_tip.y < thumb_mcp.y
        || (thumb_tip.x - thumb_mcp.x).abs() > thumb_offset_threshold;

    let curled = |tip: HandLandmark, pip: HandLandmark| {
        let (tip, pip) = (lm(tip), lm(pip));
        tip.z >= pip.z || tip.y >= pip.y
    };
    let others_curled = curled(HandLandmark::MiddleTip, HandLandmark::MiddlePip)
        && curled(HandLandmark::RingTip, HandLandmark::RingPip)
        && curled(HandLandmark::PinkyTip, HandLandmark::PinkyPip);

    index_extended && thumb_up && others_curled
}

/// Where the index finger points, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimRay {
    pub origin: Point,
    /// Unit vector from the PIP joint through the tip; zero when the two
    /// coincide.
    pub direction: (f32, f32),
}

pub fn aim_ray(hand: &HandObservation, width: u32, height: u32) -> AimRay {
    let (w, h) = (width as f32, height as f32);
    let tip = hand.landmark(HandLandmark::IndexTip);
    let pip = hand.landmark(HandLandmark::IndexPip);

    let (tip_x, tip_y) = (tip.x * w, tip.y * h);
    let (dx, dy) = (tip_x - pip.x * w, tip_y - pip.y * h);
    let length = (dx * dx + dy * dy).sqrt();
    let direction = if length > 0.0 {
        (dx / length, dy / length)
    } else {
        (0.0, 0.0)
    };

    AimRay {
        origin: Point::new(tip_x, tip_y),
        direction,
    }
}
