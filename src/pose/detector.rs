use anyhow::{Context, Result};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::extractor::LandmarkExtractor;
use super::landmark::{Landmark, LandmarkSet, LANDMARK_COUNT};
use super::preprocess::preprocess_for_blazepose;
use crate::config::ModelConfig;

/// モデル出力の1ランドマークあたりの値数 (x, y, z, visibility, presence)
const VALUES_PER_LANDMARK: usize = 5;

/// ONNX Runtime 上で動く BlazePose 全身ランドマーク検出器
pub struct PoseDetector {
    session: Session,
    input_size: u32,
    min_presence: f32,
    input_name: String,
    landmarks_output: String,
    presence_output: String,
}

impl PoseDetector {
    /// `config` で指定された ONNX モデルを読み込んで初期化
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let session = build_session(&config.path)?;
        Ok(Self {
            session,
            input_size: config.input_size,
            min_presence: config.min_presence,
            input_name: config.input_name.clone(),
            landmarks_output: config.landmarks_output.clone(),
            presence_output: config.presence_output.clone(),
        })
    }
}

fn build_session<P: AsRef<Path>>(model_path: P) -> Result<Session> {
    let path = model_path.as_ref();
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(path)
        .with_context(|| format!("Failed to load ONNX model {}", path.display()))?;
    Ok(session)
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

impl LandmarkExtractor for PoseDetector {
    /// 入力: 任意サイズの RGB フレーム
    /// 出力: フレーム基準で正規化した33ランドマーク
    /// (presence が `min_presence` 未満なら `None`)
    fn extract(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>> {
        let input = preprocess_for_blazepose(image, self.input_size);
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .context("Inference failed")?;

        // 姿勢フラグ: [1, 1]
        let presence: ndarray::ArrayViewD<f32> = outputs[self.presence_output.as_str()]
            .try_extract_array()
            .context("Failed to extract presence tensor")?;
        let presence = presence.iter().next().copied().unwrap_or(0.0);
        if presence < self.min_presence {
            return Ok(None);
        }

        // ランドマーク: [1, 195] = 39点 x (x, y, z, visibility, presence)、入力画素単位
        let output: ndarray::ArrayViewD<f32> = outputs[self.landmarks_output.as_str()]
            .try_extract_array()
            .context("Failed to extract landmark tensor")?;
        let values: Vec<f32> = output.iter().copied().collect();

        let size = self.input_size as f32;
        let landmarks: Vec<Landmark> = values
            .chunks_exact(VALUES_PER_LANDMARK)
            .take(LANDMARK_COUNT)
            .map(|v| Landmark::new(v[0] / size, v[1] / size, v[2] / size, sigmoid(v[3])))
            .collect();
        let set = LandmarkSet::from_slice(&landmarks).ok_or_else(|| {
            anyhow::anyhow!(
                "landmark output too short: {} values, expected at least {}",
                values.len(),
                LANDMARK_COUNT * VALUES_PER_LANDMARK
            )
        })?;
        tracing::trace!("presence {:.2}, mean visibility {:.2}", presence, set.average_visibility());

        Ok(Some(set))
    }
}
