use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology;

// Binary morphology on 0/255 masks with a square `size` x `size`
// structuring element, which is the L-infinity ball of radius `size / 2`.

fn radius(size: u32) -> u8 {
    (size / 2).min(u8::MAX as u32) as u8
}

pub fn erode(mask: &GrayImage, size: u32) -> GrayImage {
    morphology::erode(mask, Norm::LInf, radius(size))
}

pub fn dilate(mask: &GrayImage, size: u32) -> GrayImage {
    morphology::dilate(mask, Norm::LInf, radius(size))
}

/// Erode then dilate: removes specks smaller than the kernel.
pub fn open(mask: &GrayImage, size: u32) -> GrayImage {
    morphology::open(mask, Norm::LInf, radius(size))
}

/// Dilate then erode: fills gaps smaller than the kernel.
pub fn close(mask: &GrayImage, size: u32) -> GrayImage {
    morphology::close(mask, Norm::LInf, radius(size))
}

pub fn count_set(mask: &GrayImage) -> u32 {
    mask.pixels().filter(|p| p[0] > 0).count() as u32
}
