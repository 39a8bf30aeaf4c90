use crate::yunet;
use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::{Array1, Array4};
use ort::{session::Session, value::Value};

/// YuNet is exported with a fixed square input.
pub const DETECTOR_INPUT_SIZE: u32 = 640;

/// SFace input side length.
pub const FACE_SIZE: u32 = 112;

// ArcFace reference eye positions for a 112x112 crop
const REF_LEFT_EYE: (f32, f32) = (38.2946, 51.6963);
const REF_RIGHT_EYE: (f32, f32) = (73.5318, 51.5014);

/// A face found by the detector, in source image pixels.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // eyes, nose tip, mouth corners as x,y pairs; eyes in image order
}

impl Detection {
    pub fn left_eye(&self) -> (f32, f32) {
        (self.landmarks[0], self.landmarks[1])
    }

    pub fn right_eye(&self) -> (f32, f32) {
        (self.landmarks[2], self.landmarks[3])
    }
}

/// Euclidean distance under which two SFace embeddings are taken to be the
/// same person (the recognizer's published L2 threshold).
pub const DEFAULT_L2_THRESHOLD: f32 = 1.128;

/// L2-normalized face embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Array1<f32>,
}

impl Embedding {
    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    /// Euclidean distance. Callers compare embeddings of equal dimension.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.vector
            .iter()
            .zip(other.vector.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.to_vec()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self {
            vector: Array1::from(values),
        }
    }
}

/// Placement of the source image on the square detector canvas.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Letterbox {
    /// Resize `img` to fit a `side`x`side` canvas, centered, aspect ratio kept.
    /// Returns `None` when the image would collapse to zero pixels.
    fn fit(img: &DynamicImage, side: u32) -> Option<(RgbImage, Letterbox)> {
        let (width, height) = img.dimensions();
        let longest = width.max(height);
        if longest == 0 {
            return None;
        }
        let scale = side as f32 / longest as f32;
        let new_width = (width as f32 * scale) as u32;
        let new_height = (height as f32 * scale) as u32;
        if new_width == 0 || new_height == 0 {
            return None;
        }

        let resized = img
            .resize_exact(new_width, new_height, FilterType::Triangle)
            .to_rgb8();
        let offset_x = (side - new_width) / 2;
        let offset_y = (side - new_height) / 2;
        let mut canvas = RgbImage::new(side, side);
        image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

        Some((
            canvas,
            Letterbox {
                scale,
                offset_x: offset_x as f32,
                offset_y: offset_y as f32,
            },
        ))
    }

    /// Map a canvas-normalized point back to source pixels.
    fn restore(&self, x: f32, y: f32, side: f32) -> (f32, f32) {
        (
            (x * side - self.offset_x) / self.scale,
            (y * side - self.offset_y) / self.scale,
        )
    }

    fn restore_detection(&self, raw: yunet::RawDetection, side: f32) -> Detection {
        let (x, y) = self.restore(raw.bbox[0], raw.bbox[1], side);
        let w = raw.bbox[2] * side / self.scale;
        let h = raw.bbox[3] * side / self.scale;

        let mut landmarks = [0.0f32; 10];
        for (point, out) in raw
            .landmarks
            .chunks_exact(2)
            .zip(landmarks.chunks_exact_mut(2))
        {
            let (lx, ly) = self.restore(point[0], point[1], side);
            out[0] = lx;
            out[1] = ly;
        }

        Detection {
            bbox: [x, y, w, h],
            score: raw.score,
            landmarks,
        }
    }
}

/// Planar CHW tensor data in BGR channel order, values in [0, 255].
fn bgr_planes(rgb: &RgbImage) -> Vec<f32> {
    let pixel_count = (rgb.width() * rgb.height()) as usize;
    let mut data = vec![0.0f32; 3 * pixel_count];
    let (b_plane, rest) = data.split_at_mut(pixel_count);
    let (g_plane, r_plane) = rest.split_at_mut(pixel_count);

    for (i, px) in rgb.pixels().enumerate() {
        r_plane[i] = px[0] as f32;
        g_plane[i] = px[1] as f32;
        b_plane[i] = px[2] as f32;
    }
    data
}

/// Detect every face in `img`, ordered by descending score.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let Some((canvas, letterbox)) = Letterbox::fit(img, DETECTOR_INPUT_SIZE) else {
        log::debug!("image too small for detection: {:?}", img.dimensions());
        return Ok(Vec::new());
    };

    let side = DETECTOR_INPUT_SIZE as usize;
    let input = Array4::from_shape_vec((1, 3, side, side), bgr_planes(&canvas))?;
    let input_tensor = Value::from_array(input)?;
    let outputs = session.run(ort::inputs![input_tensor])?;

    let mut tensors: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        tensors.push((shape.iter().copied().collect(), data.to_vec()));
    }

    let levels = yunet::parse_outputs(&tensors, side).context("parsing detector output")?;
    let detections: Vec<Detection> = yunet::decode(&levels, side, score_threshold)
        .into_iter()
        .map(|raw| letterbox.restore_detection(raw, side as f32))
        .collect();

    Ok(nms(&detections, nms_threshold))
}

/// Non-maximum suppression. The result is sorted by descending score.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(sorted.len());
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| compute_iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    let union = a[2] * a[3] + b[2] * b[3] - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// Rotation + uniform scale + translation taking source pixels to crop pixels:
///
/// ```text
/// x' =  a*x + b*y + tx
/// y' = -b*x + a*y + ty
/// ```
#[derive(Debug, Clone, Copy)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Level the eyes and place their midpoint where SFace expects it.
    fn from_eyes(left: (f32, f32), right: (f32, f32), size: u32) -> Option<Self> {
        let dx = right.0 - left.0;
        let dy = right.1 - left.1;
        let eye_dist = (dx * dx + dy * dy).sqrt();
        if !eye_dist.is_finite() || eye_dist < f32::EPSILON {
            return None;
        }

        let unit = size as f32 / FACE_SIZE as f32;
        let ref_dx = REF_RIGHT_EYE.0 - REF_LEFT_EYE.0;
        let ref_dy = REF_RIGHT_EYE.1 - REF_LEFT_EYE.1;
        let scale = unit * (ref_dx * ref_dx + ref_dy * ref_dy).sqrt() / eye_dist;

        let angle = dy.atan2(dx);
        let a = scale * angle.cos();
        let b = scale * angle.sin();

        let center = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
        let target = (
            (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * unit,
            (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * unit,
        );

        Some(Self {
            a,
            b,
            tx: target.0 - (a * center.0 + b * center.1),
            ty: target.1 - (-b * center.0 + a * center.1),
        })
    }

    #[cfg(test)]
    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.b * y + self.tx,
            -self.b * x + self.a * y + self.ty,
        )
    }

    fn invert(&self, x: f32, y: f32) -> (f32, f32) {
        let det = self.a * self.a + self.b * self.b;
        let u = x - self.tx;
        let v = y - self.ty;
        ((self.a * u - self.b * v) / det, (self.b * u + self.a * v) / det)
    }
}

fn sample_bilinear(src: &RgbImage, x: f32, y: f32) -> Option<Rgb<u8>> {
    let (w, h) = src.dimensions();
    if x < 0.0 || y < 0.0 || x >= w as f32 || y >= h as f32 {
        return None;
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let weights = [
        (src.get_pixel(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (src.get_pixel(x1, y0), fx * (1.0 - fy)),
        (src.get_pixel(x0, y1), (1.0 - fx) * fy),
        (src.get_pixel(x1, y1), fx * fy),
    ];

    let mut out = [0u8; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let v: f32 = weights.iter().map(|(p, w)| p[c] as f32 * w).sum();
        *value = v.round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgb(out))
}

/// Crop `detection` out of `img` as an eye-aligned `size`x`size` face.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<RgbImage> {
    let transform = Similarity::from_eyes(detection.left_eye(), detection.right_eye(), size)
        .context("degenerate eye landmarks")?;
    Ok(warp(&img.to_rgb8(), &transform, size))
}

fn warp(src: &RgbImage, transform: &Similarity, size: u32) -> RgbImage {
    let mut output = RgbImage::new(size, size);
    for (out_x, out_y, px) in output.enumerate_pixels_mut() {
        let (in_x, in_y) = transform.invert(out_x as f32, out_y as f32);
        if let Some(sampled) = sample_bilinear(src, in_x, in_y) {
            *px = sampled;
        }
    }
    output
}

/// Run SFace over an aligned crop and L2-normalize the result.
pub fn encode_face(session: &mut Session, face: &RgbImage) -> Result<Embedding> {
    let resized;
    let face = if face.dimensions() == (FACE_SIZE, FACE_SIZE) {
        face
    } else {
        resized = image::imageops::resize(face, FACE_SIZE, FACE_SIZE, FilterType::Triangle);
        &resized
    };

    let side = FACE_SIZE as usize;
    let input = Array4::from_shape_vec((1, 3, side, side), bgr_planes(face))?;
    let input_tensor = Value::from_array(input)?;
    let outputs = session.run(ort::inputs![input_tensor])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    // [1, 128] for SFace
    let dim = match shape.len() {
        2 => shape[1] as usize,
        _ => data.len(),
    };
    if dim == 0 || dim > data.len() {
        anyhow::bail!("unexpected recognizer output shape {:?}", shape);
    }

    let mut values = data[..dim].to_vec();
    let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|x| *x /= norm);
    }
    Ok(Embedding::from(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4], score: f32) -> Detection {
        Detection {
            bbox,
            score,
            landmarks: [0.0; 10],
        }
    }

    #[test]
    fn test_iou() {
        let a = [10.0, 10.0, 20.0, 20.0];
        let b = [15.0, 15.0, 20.0, 20.0];
        let iou = compute_iou(&a, &b);
        assert!(iou > 0.0 && iou < 1.0);

        let c = [100.0, 100.0, 10.0, 10.0];
        assert_eq!(compute_iou(&a, &c), 0.0);
        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_best_and_orders_by_score() {
        let detections = vec![
            det([12.0, 12.0, 20.0, 20.0], 0.8),
            det([100.0, 100.0, 20.0, 20.0], 0.85),
            det([10.0, 10.0, 20.0, 20.0], 0.9),
        ];

        let kept = nms(&detections, 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.85);
    }

    #[test]
    fn test_embedding_distance() {
        let a = Embedding::from(vec![0.0, 0.0, 0.0]);
        let b = Embedding::from(vec![3.0, 4.0, 0.0]);
        assert_eq!(a.distance(&a), 0.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.distance(&b), b.distance(&a));
        assert_eq!(b.dim(), 3);
    }

    #[test]
    fn test_similarity_maps_eyes_to_reference() {
        let left = (140.0, 210.0);
        let right = (220.0, 190.0);
        let t = Similarity::from_eyes(left, right, FACE_SIZE).unwrap();

        let (lx, ly) = t.apply(left.0, left.1);
        let (rx, ry) = t.apply(right.0, right.1);
        // eyes end up level, centered on the reference midpoint
        assert!((ly - ry).abs() < 1e-3);
        assert!(((lx + rx) / 2.0 - (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0).abs() < 1e-3);

        let (x, y) = t.invert(lx, ly);
        assert!((x - left.0).abs() < 1e-3 && (y - left.1).abs() < 1e-3);
    }

    #[test]
    fn test_similarity_rejects_coincident_eyes() {
        assert!(Similarity::from_eyes((5.0, 5.0), (5.0, 5.0), FACE_SIZE).is_none());
    }

    #[test]
    fn test_letterbox_restores_coordinates() {
        let img = DynamicImage::new_rgb8(320, 160);
        let (canvas, lb) = Letterbox::fit(&img, DETECTOR_INPUT_SIZE).unwrap();
        assert_eq!(canvas.dimensions(), (640, 640));

        // image spans canvas rows 160..480, so the canvas center is the image center
        let (x, y) = lb.restore(0.5, 0.5, 640.0);
        assert!((x - 160.0).abs() < 1e-3);
        assert!((y - 80.0).abs() < 1e-3);
    }

    #[test]
    fn test_letterbox_rejects_degenerate_image() {
        let img = DynamicImage::new_rgb8(2000, 1);
        assert!(Letterbox::fit(&img, DETECTOR_INPUT_SIZE).is_none());
    }

    #[test]
    fn test_bgr_planes_order() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([1, 2, 3]));
        img.put_pixel(1, 0, Rgb([4, 5, 6]));
        assert_eq!(bgr_planes(&img), vec![3.0, 6.0, 2.0, 5.0, 1.0, 4.0]);
    }
}
