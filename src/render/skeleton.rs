use image::Rgb;

use crate::pose::LandmarkIndex;

use LandmarkIndex::*;

/// 33点モデルの骨格接続 (始点, 終点)
pub const SKELETON_CONNECTIONS: [(LandmarkIndex, LandmarkIndex); 35] = [
    // 顔
    (Nose, LeftEyeInner),
    (LeftEyeInner, LeftEye),
    (LeftEye, LeftEyeOuter),
    (LeftEyeOuter, LeftEar),
    (Nose, RightEyeInner),
    (RightEyeInner, RightEye),
    (RightEye, RightEyeOuter),
    (RightEyeOuter, RightEar),
    (MouthLeft, MouthRight),
    // 腕と手
    (LeftShoulder, RightShoulder),
    (LeftShoulder, LeftElbow),
    (LeftElbow, LeftWrist),
    (LeftWrist, LeftPinky),
    (LeftWrist, LeftIndex),
    (LeftWrist, LeftThumb),
    (LeftPinky, LeftIndex),
    (RightShoulder, RightElbow),
    (RightElbow, RightWrist),
    (RightWrist, RightPinky),
    (RightWrist, RightIndex),
    (RightWrist, RightThumb),
    (RightPinky, RightIndex),
    // 胴体
    (LeftShoulder, LeftHip),
    (RightShoulder, RightHip),
    (LeftHip, RightHip),
    // 脚と足
    (LeftHip, LeftKnee),
    (RightHip, RightKnee),
    (LeftKnee, LeftAnkle),
    (RightKnee, RightAnkle),
    (LeftAnkle, LeftHeel),
    (RightAnkle, RightHeel),
    (LeftHeel, LeftFootIndex),
    (RightHeel, RightFootIndex),
    (LeftAnkle, LeftFootIndex),
    (RightAnkle, RightFootIndex),
];

/// ライブ姿勢の描画色
pub const LIVE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// 参照姿勢の描画色
pub const REFERENCE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// スコアバーの色: 良好 / 中程度 / 不一致
pub const SCORE_GOOD_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const SCORE_FAIR_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const SCORE_POOR_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

pub const SCORE_GOOD: f32 = 80.0;
pub const SCORE_FAIR: f32 = 60.0;

pub fn score_color(score: f32) -> Rgb<u8> {
    if score >= SCORE_GOOD {
        SCORE_GOOD_COLOR
    } else if score >= SCORE_FAIR {
        SCORE_FAIR_COLOR
    } else {
        SCORE_POOR_COLOR
    }
}
