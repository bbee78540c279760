use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// ポーズサーバーの待ち受けアドレス
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub exercise: ExerciseConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// フレーム待ちの最大時間（経過後に停止要求を再確認）
    #[serde(default = "default_pop_timeout_ms")]
    pub pop_timeout_ms: u64,
    /// 処理失敗後の待機時間
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// 比較中のエクササイズを完了とみなすスコア
    #[serde(default = "default_completion_threshold")]
    pub completion_threshold: f32,
    /// 描画済みフレームのJPEG品質 (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExerciseConfig {
    /// エクササイズテーブルのSQLiteファイル
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// レコードストア再接続までのポーリング回数
    #[serde(default = "default_reconnect_every")]
    pub reconnect_every: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReferenceConfig {
    /// 参照画像ディレクトリ（カテゴリごとに1枚）
    #[serde(default = "default_reference_directory")]
    pub directory: String,
    #[serde(default = "default_reference_extension")]
    pub extension: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// BlazePose 全身ランドマークモデル (ONNX)
    #[serde(default = "default_model_path")]
    pub path: String,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// 姿勢なしと判定する presence スコアの閾値
    #[serde(default = "default_min_presence")]
    pub min_presence: f32,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_landmarks_output")]
    pub landmarks_output: String,
    #[serde(default = "default_presence_output")]
    pub presence_output: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: String,
    /// `tracing_subscriber::EnvFilter` の指定（`RUST_LOG` が優先）
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_listen_addr() -> String { "0.0.0.0:5000".to_string() }
fn default_pop_timeout_ms() -> u64 { 1000 }
fn default_error_backoff_ms() -> u64 { 100 }
fn default_completion_threshold() -> f32 { 80.0 }
fn default_jpeg_quality() -> u8 { crate::codec::DEFAULT_JPEG_QUALITY }
fn default_database_path() -> String { "yogavision.db".to_string() }
fn default_reconnect_every() -> u32 { crate::exercise::coordinator::DEFAULT_RECONNECT_EVERY }
fn default_reference_directory() -> String { "std_poses".to_string() }
fn default_reference_extension() -> String { "jpg".to_string() }
fn default_model_path() -> String { "models/pose_landmark_full.onnx".to_string() }
fn default_input_size() -> u32 { 256 }
fn default_min_presence() -> f32 { 0.5 }
fn default_input_name() -> String { "input_1".to_string() }
fn default_landmarks_output() -> String { "Identity".to_string() }
fn default_presence_output() -> String { "Identity_1".to_string() }
fn default_log_directory() -> String { "logs".to_string() }
fn default_log_filter() -> String { "info".to_string() }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pop_timeout_ms: default_pop_timeout_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            completion_threshold: default_completion_threshold(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl PipelineConfig {
    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for ExerciseConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            reconnect_every: default_reconnect_every(),
        }
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            directory: default_reference_directory(),
            extension: default_reference_extension(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            input_size: default_input_size(),
            min_presence: default_min_presence(),
            input_name: default_input_name(),
            landmarks_output: default_landmarks_output(),
            presence_output: default_presence_output(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            filter: default_log_filter(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            pipeline: PipelineConfig::default(),
            exercise: ExerciseConfig::default(),
            reference: ReferenceConfig::default(),
            model: ModelConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// ファイルがなければデフォルト値。パースできないファイルはエラー
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:5000");
        assert_eq!(config.pipeline.pop_timeout(), Duration::from_secs(1));
        assert_eq!(config.pipeline.completion_threshold, 80.0);
        assert_eq!(config.pipeline.jpeg_quality, 60);
        assert_eq!(config.exercise.reconnect_every, 5);
        assert_eq!(config.model.input_size, 256);
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            listen_addr = "127.0.0.1:7000"

            [pipeline]
            completion_threshold = 90.0

            [reference]
            directory = "/srv/poses"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:7000");
        assert_eq!(config.pipeline.completion_threshold, 90.0);
        assert_eq!(config.pipeline.error_backoff_ms, 100);
        assert_eq!(config.reference.directory, "/srv/poses");
        assert_eq!(config.reference.extension, "jpg");
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let config = Config::load_or_default(&missing).unwrap();
        assert_eq!(config.exercise.database_path, "yogavision.db");

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "listen_addr = [").unwrap();
        assert!(matches!(Config::load_or_default(&bad), Err(ConfigError::Parse { .. })));

        let good = dir.path().join("good.toml");
        fs::write(&good, "[logging]\nfilter = \"debug\"\n").unwrap();
        assert_eq!(Config::load(&good).unwrap().logging.filter, "debug");
    }
}
