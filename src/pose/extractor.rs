use anyhow::Result;
use image::RgbImage;

use super::landmark::LandmarkSet;

/// 画像から姿勢を抽出する
///
/// `Ok(None)` は人物が見つからなかったことを表す。エラーはモデル自体の失敗のみ。
pub trait LandmarkExtractor {
    fn extract(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>>;
}

impl<E: LandmarkExtractor + ?Sized> LandmarkExtractor for Box<E> {
    fn extract(&mut self, image: &RgbImage) -> Result<Option<LandmarkSet>> {
        (**self).extract(image)
    }
}
