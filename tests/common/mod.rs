#![allow(dead_code)]

use facefind::{Embedding, FaceEmbedder};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::path::Path;

/// Stand-in for the ONNX model: every non-black pixel is one face whose
/// embedding is its color scaled to [0, 1].
#[derive(Default)]
pub struct PixelFaces {
    pub calls: usize,
}

impl FaceEmbedder for PixelFaces {
    fn embed(&mut self, image: &DynamicImage) -> anyhow::Result<Vec<Embedding>> {
        self.calls += 1;
        Ok(image
            .to_rgb8()
            .pixels()
            .filter(|p| p.0 != [0, 0, 0])
            .map(|p| {
                Embedding::from(p.0.iter().map(|&c| c as f32 / 255.0).collect::<Vec<_>>())
            })
            .collect())
    }
}

pub const ALICE: [u8; 3] = [200, 40, 40];
pub const ALICE_AGAIN: [u8; 3] = [210, 45, 35];
pub const BOB: [u8; 3] = [20, 40, 220];

/// Write a one-row PNG (whatever the extension) with one pixel per face.
pub fn write_faces(path: &Path, faces: &[[u8; 3]]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut img = RgbImage::new(faces.len().max(1) as u32, 1);
    for (x, face) in faces.iter().enumerate() {
        img.put_pixel(x as u32, 0, Rgb(*face));
    }
    img.save_with_format(path, ImageFormat::Png).unwrap();
}

/// Write a valid 1x1 PNG whose header claims `width` x `height` pixels.
pub fn write_oversized_png(path: &Path, width: u32, height: u32) {
    write_faces(path, &[ALICE]);
    let mut bytes = std::fs::read(path).unwrap();
    // signature(8) length(4) "IHDR"(4) width(4) height(4) ... crc over type+data
    bytes[16..20].copy_from_slice(&width.to_be_bytes());
    bytes[20..24].copy_from_slice(&height.to_be_bytes());
    let crc = crc32(&bytes[12..29]);
    bytes[29..33].copy_from_slice(&crc.to_be_bytes());
    std::fs::write(path, bytes).unwrap();
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
        }
    }
    !crc
}
