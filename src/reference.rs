//! Caches the reference pose for the active exercise.

use std::path::PathBuf;
use std::time::Instant;

use image::RgbImage;

use crate::error::ReferenceError;
use crate::exercise::ExerciseKey;
use crate::pose::{LandmarkExtractor, LandmarkSet};

/// Where reference images come from.
pub trait ReferenceSource {
    fn fetch(&self, key: &ExerciseKey) -> Result<RgbImage, ReferenceError>;
}

/// Reference images stored as `{directory}/{key}.{extension}`.
pub struct DirectorySource {
    directory: PathBuf,
    extension: String,
}

impl DirectorySource {
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.into(),
        }
    }

    pub fn path_for(&self, key: &ExerciseKey) -> PathBuf {
        self.directory.join(format!("{}.{}", key.as_str(), self.extension))
    }
}

impl ReferenceSource for DirectorySource {
    fn fetch(&self, key: &ExerciseKey) -> Result<RgbImage, ReferenceError> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Err(ReferenceError::Missing(path));
        }
        match image::open(&path) {
            Ok(img) => Ok(img.to_rgb8()),
            Err(source) => Err(ReferenceError::Unreadable { path, source }),
        }
    }
}

/// Reference landmarks extracted for one exercise.
#[derive(Debug, Clone)]
pub struct ReferencePose {
    pub exercise_key: ExerciseKey,
    pub landmarks: LandmarkSet,
    pub loaded_at: Instant,
}

/// What is cached for the current key. A missing image, an unreadable one
/// or one without a detectable pose is remembered as `Absent` until the next
/// `invalidate`, so it is not re-read every frame.
#[derive(Debug, Clone)]
enum Cached {
    Found(ReferencePose),
    Absent(ExerciseKey),
}

impl Cached {
    fn key(&self) -> &ExerciseKey {
        match self {
            Cached::Found(pose) => &pose.exercise_key,
            Cached::Absent(key) => key,
        }
    }
}

/// Holds at most one reference pose, replaced wholesale on key change.
pub struct ReferenceStore<S> {
    source: S,
    cached: Option<Cached>,
    reloads: u64,
}

impl<S: ReferenceSource> ReferenceStore<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cached: None,
            reloads: 0,
        }
    }

    /// Reference landmarks for `key`, extracting them on a cache miss.
    ///
    /// `None` when the image is missing, unreadable, or has no pose; the caller
    /// skips comparison in that case.
    pub fn load<E>(&mut self, key: &ExerciseKey, extractor: &mut E) -> Option<LandmarkSet>
    where
        E: LandmarkExtractor + ?Sized,
    {
        match &self.cached {
            Some(Cached::Found(pose)) if &pose.exercise_key == key => return Some(pose.landmarks.clone()),
            Some(Cached::Absent(cached)) if cached == key => return None,
            _ => {}
        }

        self.reloads += 1;
        let image = match self.source.fetch(key) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("reference for '{}' unavailable: {}", key, e);
                self.cached = Some(Cached::Absent(key.clone()));
                return None;
            }
        };

        match extractor.extract(&image) {
            Ok(Some(landmarks)) => {
                tracing::info!("reference pose loaded for '{}'", key);
                self.cached = Some(Cached::Found(ReferencePose {
                    exercise_key: key.clone(),
                    landmarks: landmarks.clone(),
                    loaded_at: Instant::now(),
                }));
                Some(landmarks)
            }
            Ok(None) => {
                tracing::warn!("no pose detected in reference image for '{}'", key);
                self.cached = Some(Cached::Absent(key.clone()));
                None
            }
            Err(e) => {
                tracing::warn!("reference extraction for '{}' failed: {:#}", key, e);
                self.cached = None;
                None
            }
        }
    }

    /// Drops the cached pose; the next `load` extracts again.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// `invalidate` followed by `load`.
    pub fn reload<E>(&mut self, key: &ExerciseKey, extractor: &mut E) -> Option<LandmarkSet>
    where
        E: LandmarkExtractor + ?Sized,
    {
        self.invalidate();
        self.load(key, extractor)
    }

    pub fn current(&self) -> Option<&ReferencePose> {
        match &self.cached {
            Some(Cached::Found(pose)) => Some(pose),
            _ => None,
        }
    }

    pub fn cached_key(&self) -> Option<&ExerciseKey> {
        self.cached.as_ref().map(Cached::key)
    }

    /// Number of times the source was consulted.
    pub fn reloads(&self) -> u64 {
        self.reloads
    }
}
