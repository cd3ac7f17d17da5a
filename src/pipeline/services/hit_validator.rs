use tracing::{debug, info};

use crate::common::{BoundingBox, Frame};
use crate::config::{HitValidationConfig, TargetRule};
use crate::pipeline::services::image::TeamClassifier;
use crate::pipeline::types::{HitEvent, HitVerdict, PersonDetection, TeamLabel};

/// Decides whether a shot landed on a legitimate target.
pub struct HitValidator {
    shooter_id: String,
    self_overlap_threshold: f32,
    target_rule: TargetRule,
    classifier: TeamClassifier,
}

impl HitValidator {
    pub fn new(
        shooter_id: impl Into<String>,
        config: &HitValidationConfig,
        classifier: TeamClassifier,
    ) -> Self {
        Self {
            shooter_id: shooter_id.into(),
            self_overlap_threshold: config.self_overlap_threshold,
            target_rule: config.target_rule,
            classifier,
        }
    }

    /// Person boxes that are not the shooter's own arm: a box is dropped when
    /// it covers more than the configured fraction of `shooter_hand`.
    pub fn eligible<'a>(
        &self,
        persons: &'a [PersonDetection],
        shooter_hand: &BoundingBox,
    ) -> impl Iterator<Item = &'a PersonDetection> + 'a {
        let hand = *shooter_hand;
        let threshold = self.self_overlap_threshold;
        persons
            .iter()
            .filter(move |p| p.bbox.overlap_ratio(&hand) <= threshold)
    }

    /// `persons` is the frame's detections in detector output order. When
    /// several eligible boxes contain the crosshair the first one is taken;
    /// detectors make no spatial ordering promise, so this tie-break is
    /// arbitrary but stable.
    pub fn validate(
        &self,
        frame: &Frame,
        persons: &[PersonDetection],
        shooter_hand: &BoundingBox,
        shooter_team: TeamLabel,
    ) -> HitEvent {
        let crosshair = frame.crosshair();
        let target = self
            .eligible(persons, shooter_hand)
            .find(|p| p.bbox.contains(crosshair));

        let Some(target) = target else {
            debug!(
                "Shot by {} missed: no eligible person under crosshair ({} detected)",
                self.shooter_id,
                persons.len()
            );
            return HitEvent::miss(&self.shooter_id);
        };

        let team = self.classifier.classify(frame, &target.bbox);
        let verdict = self.judge(team, shooter_team);
        info!(
            "Shot by {} on {} target at {:?}: {:?}",
            self.shooter_id, team, target.bbox, verdict
        );
        HitEvent::on_target(&self.shooter_id, team, target.bbox, verdict)
    }

    fn judge(&self, team: TeamLabel, shooter_team: TeamLabel) -> HitVerdict {
        if !team.is_classified() {
            return HitVerdict::Unclassified;
        }
        let allowed = match self.target_rule {
            TargetRule::OpposingTeam => team != shooter_team,
            TargetRule::DesignatedTeam { team: designated } => team == designated,
        };
        if allowed {
            HitVerdict::Hit
        } else {
            HitVerdict::WrongTeam
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TeamClassifierConfig;
    use chrono::Utc;
    use image::{Rgb, RgbImage};
    use uuid::Uuid;

    const YELLOW: Rgb<u8> = Rgb([250, 220, 20]);
    const GREEN: Rgb<u8> = Rgb([30, 200, 40]);

    /// 200x200 frame, yellow left of x=100 and green from x=100 on.
    fn split_frame() -> Frame {
        let mut image = RgbImage::new(200, 200);
        for (x, _, px) in image.enumerate_pixels_mut() {
            *px = if x < 100 { YELLOW } else { GREEN };
        }
        Frame::new(Uuid::new_v4(), image, Utc::now())
    }

    fn validator(target_rule: TargetRule) -> HitValidator {
        HitValidator::new(
            "shooter",
            &HitValidationConfig {
                self_overlap_threshold: 0.3,
                target_rule,
            },
            TeamClassifier::new(TeamClassifierConfig::default()),
        )
    }

    fn person(x1: f32, y1: f32, x2: f32, y2: f32) -> PersonDetection {
        PersonDetection::new(BoundingBox::new(x1, y1, x2, y2), 0.9)
    }

    // 20x20 hand box just right of and below the crosshair
    const HAND: BoundingBox = BoundingBox {
        x1: 100.0,
        y1: 150.0,
        x2: 120.0,
        y2: 170.0,
    };

    #[test]
    fn overlap_at_threshold_is_kept_and_above_is_excluded() {
        let validator = validator(TargetRule::OpposingTeam);
        // 6 of the hand's 20 columns: exactly 0.3
        let at = person(0.0, 0.0, 106.0, 200.0);
        // 8 of 20 columns: 0.4
        let above = person(0.0, 0.0, 108.0, 200.0);
        let persons = [at, above];
        let eligible: Vec<_> = validator.eligible(&persons, &HAND).collect();
        assert_eq!(eligible, vec![&at]);
    }

    #[test]
    fn excluded_box_cannot_be_hit() {
        let validator = validator(TargetRule::OpposingTeam);
        let frame = split_frame();
        let own_arm = person(90.0, 90.0, 130.0, 200.0);
        let event = validator.validate(&frame, &[own_arm], &HAND, TeamLabel::TeamA);
        assert_eq!(event.verdict, HitVerdict::Miss);
        assert!(!event.valid);
        assert_eq!(event.target_team, None);
    }

    #[test]
    fn no_box_under_crosshair_is_a_miss() {
        let validator = validator(TargetRule::OpposingTeam);
        let frame = split_frame();
        let event = validator.validate(
            &frame,
            &[person(0.0, 0.0, 50.0, 50.0), person(150.0, 0.0, 200.0, 90.0)],
            &HAND,
            TeamLabel::TeamA,
        );
        assert_eq!(event.verdict, HitVerdict::Miss);
        assert_eq!(event.shooter_id, "shooter");
    }

    #[test]
    fn first_box_in_detector_order_wins_ties() {
        let validator = validator(TargetRule::OpposingTeam);
        let frame = split_frame();
        let hand = BoundingBox::new(0.0, 190.0, 10.0, 200.0);
        let mostly_yellow = person(0.0, 0.0, 101.0, 180.0);
        let mostly_green = person(99.0, 0.0, 200.0, 180.0);

        let event = validator.validate(
            &frame,
            &[mostly_yellow, mostly_green],
            &hand,
            TeamLabel::TeamA,
        );
        assert_eq!(event.target_team, Some(TeamLabel::TeamA));
        assert_eq!(event.verdict, HitVerdict::WrongTeam);

        let event = validator.validate(
            &frame,
            &[mostly_green, mostly_yellow],
            &hand,
            TeamLabel::TeamA,
        );
        assert_eq!(event.target_team, Some(TeamLabel::TeamB));
        assert_eq!(event.verdict, HitVerdict::Hit);
        assert!(event.valid);
        assert_eq!(event.target_box, Some(mostly_green.bbox));
    }

    #[test]
    fn designated_team_rule_only_accepts_that_team() {
        let validator = validator(TargetRule::DesignatedTeam {
            team: TeamLabel::TeamA,
        });
        let frame = split_frame();
        let hand = BoundingBox::new(0.0, 190.0, 10.0, 200.0);
        let yellow = person(0.0, 0.0, 101.0, 180.0);
        let green = person(99.0, 0.0, 200.0, 180.0);

        // same team as the shooter, but it is the designated one
        let event = validator.validate(&frame, &[yellow], &hand, TeamLabel::TeamA);
        assert!(event.valid);
        let event = validator.validate(&frame, &[green], &hand, TeamLabel::TeamA);
        assert_eq!(event.verdict, HitVerdict::WrongTeam);
    }

    #[test]
    fn unclassified_target_is_not_a_valid_hit() {
        let validator = validator(TargetRule::OpposingTeam);
        let frame = Frame::new(
            Uuid::new_v4(),
            RgbImage::from_pixel(200, 200, Rgb([80, 80, 80])),
            Utc::now(),
        );
        let event = validator.validate(
            &frame,
            &[person(50.0, 0.0, 150.0, 180.0)],
            &BoundingBox::new(0.0, 190.0, 10.0, 200.0),
            TeamLabel::TeamA,
        );
        assert_eq!(event.verdict, HitVerdict::Unclassified);
        assert_eq!(event.target_team, Some(TeamLabel::Unclassified));
        assert!(!event.valid);
    }
}
