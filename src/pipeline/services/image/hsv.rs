use image::{GrayImage, Luma, Rgb, RgbImage};

/// Converts an RGB pixel to 8-bit HSV in OpenCV convention: hue `0..=179`
/// (degrees halved), saturation and value `0..=255`.
pub fn rgb_to_hsv(px: &Rgb<u8>) -> [u8; 3] {
    let [r, g, b] = px.0;
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    let mut hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    [
        ((hue / 2.0).round() as u16 % 180) as u8,
        saturation.round() as u8,
        max as u8,
    ]
}

/// Inclusive per-channel range test. A lower hue above the upper hue selects
/// the wrapped interval through 0 (reds).
pub fn in_range(hsv: [u8; 3], lower: [u8; 3], upper: [u8; 3]) -> bool {
    let hue_ok = if lower[0] <= upper[0] {
        lower[0] <= hsv[0] && hsv[0] <= upper[0]
    } else {
        hsv[0] >= lower[0] || hsv[0] <= upper[0]
    };
    hue_ok
        && lower[1] <= hsv[1]
        && hsv[1] <= upper[1]
        && lower[2] <= hsv[2]
        && hsv[2] <= upper[2]
}

/// Binary mask (0 or 255) of the pixels of `region` that fall in range.
pub fn threshold(region: &RgbImage, lower: [u8; 3], upper: [u8; 3]) -> GrayImage {
    let mut mask = GrayImage::new(region.width(), region.height());
    for (x, y, px) in region.enumerate_pixels() {
        if in_range(rgb_to_hsv(px), lower, upper) {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_primaries_like_opencv() {
        assert_eq!(rgb_to_hsv(&Rgb([255, 0, 0])), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(&Rgb([0, 255, 0])), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(&Rgb([0, 0, 255])), [120, 255, 255]);
        assert_eq!(rgb_to_hsv(&Rgb([255, 255, 0])), [30, 255, 255]);
        assert_eq!(rgb_to_hsv(&Rgb([128, 128, 128])), [0, 0, 128]);
        assert_eq!(rgb_to_hsv(&Rgb([0, 0, 0])), [0, 0, 0]);
    }

    #[test]
    fn hue_range_can_wrap_through_red() {
        let lower = [170, 100, 100];
        let upper = [10, 255, 255];
        assert!(in_range([175, 200, 200], lower, upper));
        assert!(in_range([5, 200, 200], lower, upper));
        assert!(!in_range([60, 200, 200], lower, upper));
    }

    #[test]
    fn threshold_marks_matching_pixels() {
        let mut region = RgbImage::from_pixel(4, 1, Rgb([0, 0, 255]));
        region.put_pixel(1, 0, Rgb([255, 255, 0]));
        let mask = threshold(&region, [20, 100, 100], [35, 255, 255]);
        let lit: Vec<u8> = mask.pixels().map(|p| p[0]).collect();
        assert_eq!(lit, vec![0, 255, 0, 0]);
    }
}
