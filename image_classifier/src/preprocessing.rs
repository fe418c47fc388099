use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array, Ix4};
use thiserror::Error;

pub const RESIZE_SHORTER_SIDE: u32 = 256;
pub const CROP_SIZE: u32 = 224;
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Model input, always shaped `(1, 3, CROP_SIZE, CROP_SIZE)`.
pub type ImageTensor = Array<f32, Ix4>;

/// Resized long sides above this are cut down to the crop window before resizing.
const MAX_RESIZED_SIDE: u64 = 1024;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Failed to read image format: {0}")]
    Format(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Unsupported image dimensions {width}x{height}")]
    Dimensions { width: u32, height: u32 },
}

/// Decoding runs under the reader's default `image::Limits`, which cap the allocation.
pub fn decode_image(image_data: &[u8]) -> Result<DynamicImage, PreprocessError> {
    let image_reader =
        image::ImageReader::new(std::io::Cursor::new(image_data)).with_guessed_format()?;
    Ok(image_reader.decode()?)
}

fn center_crop_offset(dim: u64, crop: u64) -> u64 {
    (dim.saturating_sub(crop) as f64 / 2.0).round_ties_even() as u64
}

/// Part of the longer side that is resized, and where the crop sits inside it.
#[derive(Debug, PartialEq, Eq)]
struct LongSideWindow {
    start: u32,
    len: u32,
    resized_len: u32,
    offset: u32,
}

/// The shorter side becomes `RESIZE_SHORTER_SIDE` and the longer side is truncated like
/// torchvision does. When the resized long side would exceed `MAX_RESIZED_SIDE`, only the
/// source pixels under the centred crop (plus the filter support) are kept.
fn long_side_window(long: u32, short: u32) -> Option<LongSideWindow> {
    if short == 0 {
        return None;
    }
    let crop = u64::from(CROP_SIZE);
    let resized_long = u64::from(RESIZE_SHORTER_SIDE) * u64::from(long) / u64::from(short);
    let offset = center_crop_offset(resized_long, crop);

    if resized_long <= MAX_RESIZED_SIDE {
        return Some(LongSideWindow {
            start: 0,
            len: long,
            resized_len: u32::try_from(resized_long).ok()?,
            offset: u32::try_from(offset).ok()?,
        });
    }

    let scale = f64::from(long) / resized_long as f64;
    let margin = scale.max(1.0).ceil() + 1.0;
    let start = (offset as f64 * scale - margin).floor().max(0.0);
    let end = ((offset + crop) as f64 * scale + margin)
        .ceil()
        .min(f64::from(long));
    let len = end - start;
    let resized_len = ((len / scale).round() as u64).max(crop);
    let inner_offset = ((offset as f64 - start / scale).round().max(0.0) as u64)
        .min(resized_len - crop);

    Some(LongSideWindow {
        start: u32::try_from(start as u64).ok()?,
        len: u32::try_from(len as u64).ok()?,
        resized_len: u32::try_from(resized_len).ok()?,
        offset: u32::try_from(inner_offset).ok()?,
    })
}

fn resize_and_crop(img: &DynamicImage) -> Result<RgbImage, PreprocessError> {
    let (width, height) = img.dimensions();
    let portrait = width <= height;
    let (long, short) = if portrait {
        (height, width)
    } else {
        (width, height)
    };
    let window =
        long_side_window(long, short).ok_or(PreprocessError::Dimensions { width, height })?;
    let short_offset = center_crop_offset(u64::from(RESIZE_SHORTER_SIDE), u64::from(CROP_SIZE));
    let short_offset = u32::try_from(short_offset)
        .map_err(|_| PreprocessError::Dimensions { width, height })?;

    let kept;
    let source = if window.len == long {
        img
    } else {
        tracing::debug!(
            "Keeping {} of {} pixels along the long side before resizing",
            window.len,
            long
        );
        kept = if portrait {
            img.crop_imm(0, window.start, width, window.len)
        } else {
            img.crop_imm(window.start, 0, window.len, height)
        };
        &kept
    };

    let (new_width, new_height, x, y) = if portrait {
        (RESIZE_SHORTER_SIDE, window.resized_len, short_offset, window.offset)
    } else {
        (window.resized_len, RESIZE_SHORTER_SIDE, window.offset, short_offset)
    };
    let resized = source
        .resize_exact(new_width, new_height, FilterType::Triangle)
        .to_rgb8();
    Ok(image::imageops::crop_imm(&resized, x, y, CROP_SIZE, CROP_SIZE).to_image())
}

pub fn to_tensor(img: &DynamicImage) -> Result<ImageTensor, PreprocessError> {
    let cropped = resize_and_crop(img)?;
    let side = CROP_SIZE as usize;

    let mut input = Array::zeros((1, 3, side, side));
    for (x, y, pixel) in cropped.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        for channel in 0..3 {
            let value = pixel.0[channel] as f32 / 255.;
            input[[0, channel, y, x]] = (value - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel];
        }
    }
    Ok(input)
}

pub fn preprocess(image_data: &[u8]) -> Result<ImageTensor, PreprocessError> {
    let img = decode_image(image_data)?;
    tracing::debug!("Decoded {}x{} image", img.width(), img.height());
    to_tensor(&img)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};
    use std::io::Cursor;

    pub(crate) fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, Rgb(color));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    fn assert_constant_color(tensor: &ImageTensor, color: [u8; 3]) {
        for channel in 0..3 {
            let expected =
                (color[channel] as f32 / 255.0 - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel];
            for (y, x) in [(0, 0), (112, 112), (223, 223)] {
                let got = tensor[[0, channel, y, x]];
                assert!((got - expected).abs() < 1e-4, "channel {}: {} vs {}", channel, got, expected);
            }
        }
    }

    #[test]
    fn test_long_side_window_without_cut() {
        assert_eq!(
            long_side_window(640, 480),
            Some(LongSideWindow {
                start: 0,
                len: 640,
                resized_len: 341,
                offset: 58
            })
        );
        assert_eq!(
            long_side_window(100, 100),
            Some(LongSideWindow {
                start: 0,
                len: 100,
                resized_len: 256,
                offset: 16
            })
        );
        assert_eq!(long_side_window(40, 10).map(|w| w.resized_len), Some(1024));
    }

    #[test]
    fn test_long_side_window_cuts_extreme_aspect_ratio() {
        let window = long_side_window(65535, 1).unwrap();
        assert_eq!(
            window,
            LongSideWindow {
                start: 32765,
                len: 5,
                resized_len: 1280,
                offset: 528
            }
        );

        let window = long_side_window(1000, 10).unwrap();
        assert!(window.len < 1000);
        assert!(window.offset + CROP_SIZE <= window.resized_len);
    }

    #[test]
    fn test_long_side_window_past_u32_range() {
        // 256 * 16_777_216 overflows u32
        let window = long_side_window(16_777_216, 1).unwrap();
        assert!(window.start > 8_000_000);
        assert!(window.len < 16);
        assert!(window.resized_len as u64 <= 2 * MAX_RESIZED_SIDE);
        assert!(window.offset + CROP_SIZE <= window.resized_len);
    }

    #[test]
    fn test_long_side_window_rejects_zero_side() {
        assert_eq!(long_side_window(10, 0), None);
    }

    #[test]
    fn test_center_crop_offset() {
        assert_eq!(center_crop_offset(256, 224), 16);
        // 58.5 rounds half to even
        assert_eq!(center_crop_offset(341, 224), 58);
        assert_eq!(center_crop_offset(224, 224), 0);
    }

    #[test]
    fn test_thin_images_keep_content() {
        for (width, height) in [(1, 65535), (65535, 1), (30, 2000)] {
            let tensor = preprocess(&png_bytes(width, height, [255, 0, 128])).unwrap();
            assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
            assert_constant_color(&tensor, [255, 0, 128]);
        }
    }

    #[test]
    fn test_tensor_shape_is_fixed() {
        for (width, height) in [(100, 100), (640, 480), (31, 500), (1024, 17)] {
            let tensor = preprocess(&png_bytes(width, height, [10, 20, 30])).unwrap();
            assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        }
    }

    #[test]
    fn test_normalization_values() {
        let tensor = preprocess(&png_bytes(300, 300, [255, 0, 128])).unwrap();
        assert_constant_color(&tensor, [255, 0, 128]);
    }

    #[test]
    fn test_rgba_input_is_converted() {
        let img = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_pixel(64, 64, Rgba([0, 255, 0, 10]));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();

        let tensor = preprocess(cursor.get_ref()).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_invalid_bytes_fail_to_decode() {
        let result = preprocess(b"definitely not an image");
        assert!(matches!(result, Err(PreprocessError::Decode(_))));
    }

    #[test]
    fn test_empty_bytes_fail_to_decode() {
        assert!(preprocess(&[]).is_err());
    }
}
