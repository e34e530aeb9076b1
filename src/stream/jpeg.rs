// JPEG markers and full-image decode for candidate frames
// A candidate only counts as a frame if it decodes to a raster. Header-valid
// images with damaged or missing scan data are rejected.

use image::{ImageFormat, ImageResult};

/// Start Of Image
pub const SOI: [u8; 2] = [0xFF, 0xD8];
/// End Of Image
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Raster size of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Decode `data` as a JPEG and report its size
pub fn decode(data: &[u8]) -> ImageResult<Dimensions> {
    let raster = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?;
    Ok(Dimensions {
        width: raster.width(),
        height: raster.height(),
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::codecs::jpeg::JpegEncoder;
    use image::{ColorType, Rgb, RgbImage};

    /// Real baseline JPEG of the given size with a simple gradient
    pub fn encoded_jpeg(width: u32, height: u32) -> Vec<u8> {
        let raster = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 80)
            .encode(raster.as_raw(), width, height, ColorType::Rgb8.into())
            .unwrap();
        jpeg
    }

    /// Same image with its entropy-coded scan overwritten by stuffed 0xFF
    /// bytes, which form no valid Huffman code. Headers stay intact.
    pub fn corrupt_scan(jpeg: &[u8]) -> Vec<u8> {
        let sos = jpeg
            .windows(2)
            .position(|w| w == [0xFF, 0xDA])
            .expect("no SOS marker");
        let header_len = u16::from_be_bytes([jpeg[sos + 2], jpeg[sos + 3]]) as usize;
        let scan_start = sos + 2 + header_len;
        let scan_end = jpeg.len() - 2;

        let mut damaged = jpeg.to_vec();
        for (i, byte) in damaged[scan_start..scan_end].iter_mut().enumerate() {
            *byte = if i % 2 == 0 { 0xFF } else { 0x00 };
        }
        if (scan_end - scan_start) % 2 == 1 {
            damaged[scan_end - 1] = 0x00;
        }
        damaged
    }
}
