use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

/// RGB フレームをランドマークモデルの入力テンソルに変換
///
/// - `size`x`size` にリサイズ（引き伸ばし。正規化座標がそのまま元フレームに対応する）
/// - [1, size, size, 3] の f32 テンソル、値域 0.0-1.0
pub fn preprocess_for_blazepose(frame: &RgbImage, size: u32) -> Array4<f32> {
    let resized = imageops::resize(frame, size, size, FilterType::Triangle);

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, side, side, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, y, x, 0]] = pixel[0] as f32 / 255.0;
        tensor[[0, y, x, 1]] = pixel[1] as f32 / 255.0;
        tensor[[0, y, x, 2]] = pixel[2] as f32 / 255.0;
    }
    tensor
}
