use image::{Rgb, RgbImage};

use crate::pose::LandmarkSet;
use crate::render::skeleton::{score_color, SKELETON_CONNECTIONS};

const LANDMARK_RADIUS: i32 = 2;
const SCORE_BAR_HEIGHT: u32 = 6;

/// `pose` の骨格線とランドマーク点を `color` で描画
///
/// 画像外の点は折り返さずにクリップする。
pub fn draw_pose(image: &mut RgbImage, pose: &LandmarkSet, color: Rgb<u8>) {
    let (w, h) = image.dimensions();

    for (start_idx, end_idx) in SKELETON_CONNECTIONS.iter() {
        let (x1, y1) = pose.get(*start_idx).to_pixel(w, h);
        let (x2, y2) = pose.get(*end_idx).to_pixel(w, h);
        draw_line(image, x1, y1, x2, y2, color);
    }

    for lm in pose.iter() {
        let (px, py) = lm.to_pixel(w, h);
        draw_circle(image, px, py, LANDMARK_RADIUS, color);
    }
}

/// 上端に幅 `score`% のバーを一致度に応じた色で描画
pub fn draw_score_bar(image: &mut RgbImage, score: f32) {
    let (w, h) = image.dimensions();
    let filled = ((score.clamp(0.0, 100.0) / 100.0) * w as f32).round() as u32;
    let color = score_color(score);
    for y in 0..SCORE_BAR_HEIGHT.min(h) {
        for x in 0..filled.min(w) {
            image.put_pixel(x, y, color);
        }
    }
}

/// Bresenham 直線
fn draw_line(image: &mut RgbImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgb<u8>) {
    // 飽和した遠方の端点 (i32::MIN/MAX) は以下の計算でオーバーフローする
    let (w, h) = image.dimensions();
    let limit = 2 * (w + h);
    if [x0, y0, x1, y1].iter().any(|v| v.unsigned_abs() > limit) {
        return;
    }

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut x = x0;
    let mut y = y0;

    loop {
        set_pixel(image, x, y, color);

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// 塗りつぶし円
fn draw_circle(image: &mut RgbImage, cx: i32, cy: i32, radius: i32, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    let reach = radius.unsigned_abs();
    if cx.unsigned_abs() > w + reach || cy.unsigned_abs() > h + reach {
        return;
    }
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                set_pixel(image, cx + dx, cy + dy, color);
            }
        }
    }
}

fn set_pixel(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}
