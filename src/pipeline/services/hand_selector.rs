use crate::common::BoundingBox;
use crate::config::HandSelectionConfig;
use crate::pipeline::types::HandObservation;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedHand<'a> {
    pub index: usize,
    pub observation: &'a HandObservation,
    /// Padded landmark extents in normalized frame coordinates.
    pub bbox: BoundingBox,
}

/// Picks the closest hand, taken to be the one with the largest padded
/// bounding box.
#[derive(Debug, Clone)]
pub struct HandSelector {
    padding: f32,
}

impl HandSelector {
    pub fn new(config: &HandSelectionConfig) -> Self {
        Self {
            padding: config.padding,
        }
    }

    /// Strictly largest area wins; on equal areas the earliest hand in
    /// `hands` is kept.
    pub fn select<'a>(&self, hands: &'a [HandObservation]) -> Option<SelectedHand<'a>> {
        let mut selected: Option<SelectedHand<'a>> = None;
        for (index, observation) in hands.iter().enumerate() {
            let bbox = observation.bounding_box(self.padding);
            let larger = selected.map_or(true, |s| bbox.area() > s.bbox.area());
            if larger {
                selected = Some(SelectedHand {
                    index,
                    observation,
                    bbox,
                });
            }
        }
        selected
    }
}
