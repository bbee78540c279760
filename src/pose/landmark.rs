use nalgebra::Vector3;

/// 全身姿勢のランドマーク数
pub const LANDMARK_COUNT: usize = 33;

/// 体の最初のランドマーク（これより前は顔の点）
pub const BODY_START: usize = LandmarkIndex::LeftShoulder as usize;

/// BlazePose の 33 ランドマークインデックス（モデル出力順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub const COUNT: usize = LANDMARK_COUNT;
}

/// 単一ランドマーク（正規化画像座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 奥行き推定値（`x` と同じスケール）
    pub z: f32,
    /// 可視性スコア (0.0〜1.0)
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    pub fn position(&self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn distance(&self, other: &Landmark) -> f32 {
        (self.position() - other.position()).norm()
    }

    /// ピクセル座標に変換
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f32) as i32;
        let py = (self.y * height as f32) as i32;
        (px, py)
    }
}

impl Default for Landmark {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            visibility: 0.0,
        }
    }
}

/// 検出された1人分の姿勢（固定順の [`LANDMARK_COUNT`] 点）
///
/// 生成後は変更しない。変換は新しいセットを作る。
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    landmarks: [Landmark; LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn new(landmarks: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { landmarks }
    }

    /// スライスから生成（長さがちょうど33でなければ `None`）
    pub fn from_slice(landmarks: &[Landmark]) -> Option<Self> {
        let landmarks: [Landmark; LANDMARK_COUNT] = landmarks.try_into().ok()?;
        Some(Self { landmarks })
    }

    pub fn get(&self, index: LandmarkIndex) -> &Landmark {
        &self.landmarks[index as usize]
    }

    pub fn landmarks(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.landmarks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.iter()
    }

    /// 全ランドマークに `f` を適用した新しいセットを返す
    pub fn map(&self, f: impl Fn(&Landmark) -> Landmark) -> Self {
        Self {
            landmarks: std::array::from_fn(|i| f(&self.landmarks[i])),
        }
    }

    pub fn average_visibility(&self) -> f32 {
        let sum: f32 = self.landmarks.iter().map(|l| l.visibility).sum();
        sum / LANDMARK_COUNT as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_starts_at_shoulders() {
        assert_eq!(BODY_START, 11);
        assert_eq!(LandmarkIndex::RightFootIndex as usize, LandmarkIndex::COUNT - 1);
    }

    #[test]
    fn test_from_slice_requires_exact_count() {
        let short = vec![Landmark::default(); 32];
        assert!(LandmarkSet::from_slice(&short).is_none());

        let long = vec![Landmark::default(); 34];
        assert!(LandmarkSet::from_slice(&long).is_none());

        let exact = vec![Landmark::new(0.1, 0.2, 0.0, 1.0); 33];
        let set = LandmarkSet::from_slice(&exact).unwrap();
        assert_eq!(set.get(LandmarkIndex::Nose).y, 0.2);
    }

    #[test]
    fn test_landmark_distance() {
        let a = Landmark::new(0.0, 0.0, 0.0, 1.0);
        let b = Landmark::new(0.3, 0.4, 0.0, 1.0);
        assert!((a.distance(&b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_landmark_to_pixel() {
        let lm = Landmark::new(0.5, 0.25, 0.0, 1.0);
        assert_eq!(lm.to_pixel(320, 240), (160, 60));
    }

    #[test]
    fn test_map_leaves_source_untouched() {
        let set = LandmarkSet::new([Landmark::new(0.5, 0.5, 0.0, 0.8); LANDMARK_COUNT]);
        let shifted = set.map(|l| Landmark { x: l.x + 0.1, ..*l });
        assert_eq!(set.get(LandmarkIndex::Nose).x, 0.5);
        assert!((shifted.get(LandmarkIndex::Nose).x - 0.6).abs() < 1e-6);
        assert!((set.average_visibility() - 0.8).abs() < 1e-6);
    }
}
