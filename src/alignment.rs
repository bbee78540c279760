//! Alignment and similarity scoring between two poses.
//!
//! All functions are pure: the same inputs always give the same outputs, and
//! no input set is modified.

use serde::{Deserialize, Serialize};

use crate::pose::{Landmark, LandmarkIndex, LandmarkSet, BODY_START, LANDMARK_COUNT};

/// Smallest scale an [`AlignmentTransform`] may carry.
pub const MIN_SCALE: f32 = 0.1;

/// Source heights below this are treated as degenerate by [`auto_align`].
const MIN_SOURCE_HEIGHT: f32 = 0.01;

/// Uniform scale about the image center (0.5, 0.5), then translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentTransform {
    pub offset_x: f32,
    pub offset_y: f32,
    pub scale: f32,
}

impl AlignmentTransform {
    /// Scale is clamped to [`MIN_SCALE`].
    pub fn new(offset_x: f32, offset_y: f32, scale: f32) -> Self {
        Self {
            offset_x,
            offset_y,
            scale: scale.max(MIN_SCALE),
        }
    }

    pub fn identity() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    pub fn apply(&self, landmark: &Landmark) -> Landmark {
        Landmark {
            x: (landmark.x - 0.5) * self.scale + 0.5 + self.offset_x,
            y: (landmark.y - 0.5) * self.scale + 0.5 + self.offset_y,
            z: landmark.z * self.scale,
            visibility: landmark.visibility,
        }
    }
}

impl Default for AlignmentTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Projects `set` through `transform` into a new set.
pub fn normalize(set: &LandmarkSet, transform: &AlignmentTransform) -> LandmarkSet {
    set.map(|l| transform.apply(l))
}

/// Which landmarks count toward a score and how much slack each one gets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreOptions {
    /// Skip face landmarks (indices 0..11)
    pub exclude_face: bool,
    /// Per-landmark distance that is free before it starts costing score
    pub deadzone: f32,
}

impl ScoreOptions {
    /// Live comparison: body only, no slack.
    pub const BODY_ONLY: Self = Self {
        exclude_face: true,
        deadzone: 0.0,
    };

    /// Whole-pose match with a generous per-landmark deadzone.
    pub const FULL_MATCH: Self = Self {
        exclude_face: false,
        deadzone: 0.35,
    };
}

/// Similarity score in 0..=100 (100 = identical).
///
/// Averages per-landmark Euclidean distance over (x, y, z), after subtracting
/// `deadzone` (floored at zero), and maps it to `100 - avg * 100`. Either pose
/// missing scores 0.
pub fn similarity(a: Option<&LandmarkSet>, b: Option<&LandmarkSet>, options: ScoreOptions) -> f32 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };

    let start = if options.exclude_face { BODY_START } else { 0 };
    let pairs = a.landmarks()[start..].iter().zip(&b.landmarks()[start..]);

    let mut total = 0.0f32;
    let mut count = 0usize;
    for (la, lb) in pairs {
        let mut distance = la.distance(lb);
        if options.deadzone > 0.0 {
            distance = (distance - options.deadzone).max(0.0);
        }
        total += distance;
        count += 1;
    }
    debug_assert_eq!(count, LANDMARK_COUNT - start);

    let avg = total / count as f32;
    (100.0 - avg * 100.0).clamp(0.0, 100.0)
}

/// Transform that maps `source` onto `target`: nose onto nose, and
/// nose-to-ankle height onto nose-to-ankle height.
///
/// Scale is the height ratio target/source (1.0 when the source height is
/// under 0.01). The offset is taken after scaling, so applying the result with
/// [`normalize`] lands the source nose on the target nose.
pub fn auto_align(source: &LandmarkSet, target: &LandmarkSet) -> AlignmentTransform {
    let source_nose = source.get(LandmarkIndex::Nose);
    let target_nose = target.get(LandmarkIndex::Nose);

    let source_height = body_height(source);
    let target_height = body_height(target);

    let scale = if source_height > MIN_SOURCE_HEIGHT {
        (target_height / source_height).max(MIN_SCALE)
    } else {
        1.0
    };

    let scaled_nose_x = (source_nose.x - 0.5) * scale + 0.5;
    let scaled_nose_y = (source_nose.y - 0.5) * scale + 0.5;

    AlignmentTransform::new(target_nose.x - scaled_nose_x, target_nose.y - scaled_nose_y, scale)
}

/// Vertical nose-to-ankle distance.
fn body_height(set: &LandmarkSet) -> f32 {
    let ankle_y = (set.get(LandmarkIndex::LeftAnkle).y + set.get(LandmarkIndex::RightAnkle).y) / 2.0;
    (ankle_y - set.get(LandmarkIndex::Nose).y).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    /// Deterministic, non-trivial pose: a standing figure with per-index jitter.
    fn sample_pose() -> LandmarkSet {
        let landmarks: [Landmark; LANDMARK_COUNT] = std::array::from_fn(|i| {
            let t = i as f32 / LANDMARK_COUNT as f32;
            Landmark::new(0.4 + 0.2 * ((i * 7) % 5) as f32 / 5.0, 0.15 + 0.7 * t, 0.01 * i as f32, 0.9)
        });
        LandmarkSet::new(landmarks)
    }

    fn shifted(set: &LandmarkSet, dx: f32) -> LandmarkSet {
        set.map(|l| Landmark { x: l.x + dx, ..*l })
    }

    #[test]
    fn test_normalize_identity() {
        let pose = sample_pose();
        let out = normalize(&pose, &AlignmentTransform::identity());
        for (a, b) in pose.iter().zip(out.iter()) {
            assert!((a.x - b.x).abs() < 1e-6);
            assert!((a.y - b.y).abs() < 1e-6);
            assert!((a.z - b.z).abs() < 1e-6);
            assert_eq!(a.visibility, b.visibility);
        }
    }

    #[test]
    fn test_normalize_scales_about_center() {
        let pose = LandmarkSet::new([Landmark::new(0.7, 0.3, 0.2, 0.5); LANDMARK_COUNT]);
        let out = normalize(&pose, &AlignmentTransform::new(0.05, -0.1, 2.0));
        let lm = out.get(LandmarkIndex::Nose);
        assert!((lm.x - (0.9 + 0.05)).abs() < EPS);
        assert!((lm.y - (0.1 - 0.1)).abs() < EPS);
        assert!((lm.z - 0.4).abs() < EPS);
        assert_eq!(lm.visibility, 0.5);
    }

    #[test]
    fn test_transform_scale_clamped() {
        let t = AlignmentTransform::new(0.0, 0.0, 0.0);
        assert_eq!(t.scale, MIN_SCALE);
        let t = AlignmentTransform::new(0.0, 0.0, -3.0);
        assert_eq!(t.scale, MIN_SCALE);
    }

    #[test]
    fn test_self_similarity_is_perfect() {
        let pose = sample_pose();
        let opts = ScoreOptions {
            exclude_face: false,
            deadzone: 0.0,
        };
        assert_eq!(similarity(Some(&pose), Some(&pose), opts), 100.0);
        assert_eq!(similarity(Some(&pose), Some(&pose), ScoreOptions::BODY_ONLY), 100.0);
    }

    #[test]
    fn test_similarity_absent_scores_zero() {
        let pose = sample_pose();
        assert_eq!(similarity(None, Some(&pose), ScoreOptions::BODY_ONLY), 0.0);
        assert_eq!(similarity(Some(&pose), None, ScoreOptions::BODY_ONLY), 0.0);
        assert_eq!(similarity(None, None, ScoreOptions::FULL_MATCH), 0.0);
    }

    #[test]
    fn test_similarity_symmetric() {
        let a = sample_pose();
        let b = shifted(&a, 0.07).map(|l| Landmark { y: l.y * 0.9, ..*l });
        for opts in [ScoreOptions::BODY_ONLY, ScoreOptions::FULL_MATCH] {
            let ab = similarity(Some(&a), Some(&b), opts);
            let ba = similarity(Some(&b), Some(&a), opts);
            assert!((ab - ba).abs() < 1e-5);
        }
    }

    #[test]
    fn test_similarity_uniform_shift() {
        let a = sample_pose();
        let b = shifted(&a, 0.2);
        let score = similarity(Some(&a), Some(&b), ScoreOptions::BODY_ONLY);
        assert!((score - 80.0).abs() < 0.01, "score = {score}");
    }

    #[test]
    fn test_similarity_clamped_at_zero() {
        let a = sample_pose();
        let b = shifted(&a, 3.0);
        assert_eq!(similarity(Some(&a), Some(&b), ScoreOptions::BODY_ONLY), 0.0);
    }

    #[test]
    fn test_exclude_face_ignores_face_landmarks() {
        let a = sample_pose();
        let mut landmarks = *a.landmarks();
        for lm in landmarks.iter_mut().take(BODY_START) {
            lm.x += 0.5;
        }
        let b = LandmarkSet::new(landmarks);
        assert_eq!(similarity(Some(&a), Some(&b), ScoreOptions::BODY_ONLY), 100.0);
        let full = ScoreOptions {
            exclude_face: false,
            deadzone: 0.0,
        };
        assert!(similarity(Some(&a), Some(&b), full) < 100.0);
    }

    #[test]
    fn test_deadzone_never_lowers_score() {
        let a = sample_pose();
        let b = shifted(&a, 0.12).map(|l| Landmark { z: l.z + 0.05, ..*l });
        let mut previous = 0.0;
        for step in 0..10 {
            let opts = ScoreOptions {
                exclude_face: false,
                deadzone: step as f32 * 0.02,
            };
            let score = similarity(Some(&a), Some(&b), opts);
            assert!(score >= previous, "deadzone {} lowered score", opts.deadzone);
            previous = score;
        }
    }

    #[test]
    fn test_deadzone_absorbs_small_offsets() {
        let a = sample_pose();
        let b = shifted(&a, 0.3);
        assert_eq!(similarity(Some(&a), Some(&b), ScoreOptions::FULL_MATCH), 100.0);
    }

    #[test]
    fn test_auto_align_self_is_identity() {
        let pose = sample_pose();
        let t = auto_align(&pose, &pose);
        assert!(t.offset_x.abs() < EPS);
        assert!(t.offset_y.abs() < EPS);
        assert!((t.scale - 1.0).abs() < EPS);
    }

    #[test]
    fn test_auto_align_maps_nose_and_height() {
        let source = sample_pose();
        let target = normalize(&source, &AlignmentTransform::new(0.1, -0.05, 0.8));
        let t = auto_align(&source, &target);
        assert!((t.scale - 0.8).abs() < EPS);

        let aligned = normalize(&source, &t);
        let nose = aligned.get(LandmarkIndex::Nose);
        let target_nose = target.get(LandmarkIndex::Nose);
        assert!((nose.x - target_nose.x).abs() < EPS);
        assert!((nose.y - target_nose.y).abs() < EPS);
    }

    #[test]
    fn test_auto_align_degenerate_source_height() {
        // every point at the same height: nose-to-ankle distance is zero
        let source = LandmarkSet::new([Landmark::new(0.4, 0.5, 0.0, 1.0); LANDMARK_COUNT]);
        let target = sample_pose();
        let t = auto_align(&source, &target);
        assert_eq!(t.scale, 1.0);
        let target_nose = target.get(LandmarkIndex::Nose);
        assert!((t.offset_x - (target_nose.x - 0.4)).abs() < EPS);
        assert!((t.offset_y - (target_nose.y - 0.5)).abs() < EPS);
    }
}
