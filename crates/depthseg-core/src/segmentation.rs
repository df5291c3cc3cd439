//! Segmentation decoding — class-index tensor to colored and binary masks.

use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::Array2;
use thiserror::Error;

/// Per-pixel class indices, `shape`×`shape`, row-major.
pub type SegmentationTensor = Array2<i32>;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("segmentation layer has {actual} values, expected {expected} ({shape}x{shape})")]
    ShapeMismatch {
        shape: usize,
        expected: usize,
        actual: usize,
    },
    #[error("class index {index} at ({x}, {y}) is outside the {classes}-class palette")]
    ClassOutOfRange {
        index: i32,
        x: usize,
        y: usize,
        classes: usize,
    },
    #[error("expected a {expected} payload, got {found}")]
    WrongPayload {
        expected: &'static str,
        found: &'static str,
    },
    #[error("palette must define at least one class")]
    EmptyPalette,
    #[error("segmentation shape {0}x{0} does not fit in memory")]
    ShapeTooLarge(usize),
}

/// Reshape a flat network output layer into a square tensor.
pub fn tensor_from_layer(
    layer: &[i32],
    shape: usize,
) -> Result<SegmentationTensor, DecodeError> {
    let expected = shape
        .checked_mul(shape)
        .ok_or(DecodeError::ShapeTooLarge(shape))?;
    if layer.len() != expected {
        return Err(DecodeError::ShapeMismatch {
            shape,
            expected,
            actual: layer.len(),
        });
    }
    Array2::from_shape_vec((shape, shape), layer.to_vec()).map_err(|_| {
        DecodeError::ShapeMismatch {
            shape,
            expected,
            actual: layer.len(),
        }
    })
}

/// Lookup tables indexed by class: display color and mask multiplier.
#[derive(Debug, Clone)]
pub struct ClassPalette {
    colors: Vec<Rgb<u8>>,
    multipliers: Vec<u8>,
}

impl ClassPalette {
    /// Background black / person green, with the person class as foreground.
    pub fn person() -> Self {
        Self {
            colors: vec![Rgb([0, 0, 0]), Rgb([0, 255, 0])],
            multipliers: vec![0, 1],
        }
    }

    /// Build a palette of `(color, multiplier)` entries, one per class.
    pub fn new(entries: Vec<(Rgb<u8>, u8)>) -> Result<Self, DecodeError> {
        if entries.is_empty() {
            return Err(DecodeError::EmptyPalette);
        }
        let (colors, multipliers) = entries.into_iter().unzip();
        Ok(Self { colors, multipliers })
    }

    pub fn classes(&self) -> usize {
        self.colors.len()
    }

    fn slot(&self, index: i32, x: usize, y: usize) -> Result<usize, DecodeError> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.colors.len())
            .ok_or(DecodeError::ClassOutOfRange {
                index,
                x,
                y,
                classes: self.classes(),
            })
    }
}

/// Expands class indices through a [`ClassPalette`].
pub struct SegmentationDecoder {
    palette: ClassPalette,
}

impl SegmentationDecoder {
    pub fn new(palette: ClassPalette) -> Self {
        Self { palette }
    }

    /// Color each pixel by its class.
    pub fn decode_color(&self, tensor: &SegmentationTensor) -> Result<RgbImage, DecodeError> {
        let (rows, cols) = tensor.dim();
        let mut out = RgbImage::new(cols as u32, rows as u32);
        for ((y, x), &class) in tensor.indexed_iter() {
            let slot = self.palette.slot(class, x, y)?;
            out.put_pixel(x as u32, y as u32, self.palette.colors[slot]);
        }
        Ok(out)
    }

    /// Per-pixel multiplier mask (1 for foreground classes, 0 otherwise).
    pub fn decode_multiplier(&self, tensor: &SegmentationTensor) -> Result<GrayImage, DecodeError> {
        let (rows, cols) = tensor.dim();
        let mut out = GrayImage::new(cols as u32, rows as u32);
        for ((y, x), &class) in tensor.indexed_iter() {
            let slot = self.palette.slot(class, x, y)?;
            out.put_pixel(x as u32, y as u32, Luma([self.palette.multipliers[slot]]));
        }
        Ok(out)
    }
}

impl Default for SegmentationDecoder {
    fn default() -> Self {
        Self::new(ClassPalette::person())
    }
}
