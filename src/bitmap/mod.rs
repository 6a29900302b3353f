//! Bottom-up BMP raster images.
//!
//! [`RasterImage`] keeps pixels unpadded in memory, row 0 being the visually
//! bottom row. Row padding to a 4-byte boundary only exists in the file
//! representation and is added or skipped by the codec.
//!
//! Supported containers are 24-bit BGR and 32-bit BGRA with the canonical
//! sRGB channel masks. Top-down, compressed and palette images are rejected.

pub mod header;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use rgb::RGB8;

use crate::error::{Error, Result};
use header::{
    ColorHeader, FileHeader, InfoHeader, BI_BITFIELDS, BI_RGB, COLOR_HEADER_SIZE,
    FILE_HEADER_SIZE, INFO_HEADER_SIZE, LCS_SRGB, SIGNATURE,
};

/// Alpha value written with every pixel of a 32-bit image.
pub const OPAQUE: u8 = 255;

/// In-memory bitmap plus the header metadata describing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    file_header: FileHeader,
    info_header: InfoHeader,
    data: Vec<u8>,
    row_stride: usize,
}

impl RasterImage {
    /// Create a zeroed image.
    ///
    /// With `has_alpha` the image is 32-bit BGRA, otherwise 24-bit BGR.
    pub fn new(width: i32, height: i32, has_alpha: bool) -> Result<Self> {
        let invalid = || Error::InvalidDimensions { width, height };
        if width <= 0 || height <= 0 {
            return Err(invalid());
        }

        let bit_count = if has_alpha { 32 } else { 24 };
        let layout = Layout::new(width, height, bit_count).ok_or_else(invalid)?;

        let header_size = if has_alpha {
            INFO_HEADER_SIZE + COLOR_HEADER_SIZE
        } else {
            INFO_HEADER_SIZE
        };
        let data_offset = FILE_HEADER_SIZE + header_size;
        // Padding is counted here although the buffer never holds it.
        let file_size = layout
            .file_payload_len()
            .and_then(|len| u32::try_from(len).ok())
            .and_then(|len| len.checked_add(data_offset))
            .ok_or_else(invalid)?;

        Ok(Self {
            file_header: FileHeader {
                file_size,
                data_offset,
                ..FileHeader::default()
            },
            info_header: InfoHeader {
                size: header_size,
                width,
                height,
                bit_count,
                compression: if has_alpha { BI_BITFIELDS } else { BI_RGB },
                ..InfoHeader::default()
            },
            data: vec![0; layout.payload_len],
            row_stride: layout.row_stride,
        })
    }

    /// Decode a bitmap file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|err| Error::io(format!("failed to open {}", path.display()), err))?;
        Self::read_from(&mut BufReader::new(file))
    }

    /// Decode a bitmap from a seekable stream positioned at the signature.
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let file_header = FileHeader::read_from(reader).map_err(read_error("file header"))?;
        if file_header.signature != SIGNATURE {
            return Err(Error::Format(format!(
                "unrecognized signature {:#06x}",
                file_header.signature
            )));
        }

        let info_header = InfoHeader::read_from(reader).map_err(read_error("info header"))?;

        if info_header.bit_count == 32 {
            if info_header.size < INFO_HEADER_SIZE + COLOR_HEADER_SIZE {
                return Err(Error::Format(
                    "32-bit bitmap lacks channel bit-masks".to_owned(),
                ));
            }
            let color_header =
                ColorHeader::read_from(reader).map_err(read_error("color header"))?;
            check_color_header(&color_header)?;
        }

        reader
            .seek(SeekFrom::Start(u64::from(file_header.data_offset)))
            .map_err(read_error("pixel data offset"))?;

        if info_header.height < 0 {
            return Err(Error::Format(
                "top-down bitmaps are not supported".to_owned(),
            ));
        }
        if info_header.width <= 0 || info_header.height == 0 {
            return Err(Error::Format(format!(
                "bitmap has no pixels ({}x{})",
                info_header.width, info_header.height
            )));
        }
        if !matches!(info_header.bit_count, 8 | 16 | 24 | 32) {
            return Err(Error::Format(format!(
                "unsupported bit depth {}",
                info_header.bit_count
            )));
        }

        let layout = Layout::new(info_header.width, info_header.height, info_header.bit_count)
            .ok_or_else(|| {
                Error::Format(format!(
                    "bitmap too large ({}x{})",
                    info_header.width, info_header.height
                ))
            })?;

        // The header is untrusted; never allocate more than the stream holds.
        let available = remaining(reader).map_err(read_error("pixel data"))?;
        let declared = layout
            .file_payload_len()
            .and_then(|len| u64::try_from(len).ok());
        if !declared.is_some_and(|declared| declared <= available) {
            return Err(Error::Format("truncated pixel data".to_owned()));
        }

        let mut data = vec![0; layout.payload_len];
        if layout.padding() == 0 {
            reader
                .read_exact(&mut data)
                .map_err(read_error("pixel data"))?;
        } else {
            let mut padding = vec![0; layout.padding()];
            for row in data.chunks_exact_mut(layout.row_stride) {
                reader.read_exact(row).map_err(read_error("pixel data"))?;
                reader
                    .read_exact(&mut padding)
                    .map_err(read_error("row padding"))?;
            }
        }

        Ok(Self {
            file_header,
            info_header,
            data,
            row_stride: layout.row_stride,
        })
    }

    /// Encode the image into a new file at `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.check_writable()?;

        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|err| Error::io(format!("failed to create {}", path.display()), err))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer
            .flush()
            .map_err(|err| Error::io(format!("failed to write {}", path.display()), err))
    }

    /// Encode the image into `writer`.
    ///
    /// Headers are recomputed from the image geometry so the payload offset
    /// and file size always describe what is written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.check_writable()?;
        self.write_unchecked(writer)
            .map_err(|err| Error::io("failed to write bitmap", err))
    }

    fn write_unchecked<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let has_alpha = self.info_header.bit_count == 32;
        let header_size = if has_alpha {
            INFO_HEADER_SIZE + COLOR_HEADER_SIZE
        } else {
            INFO_HEADER_SIZE
        };
        let padding = self.padded_row_stride() - self.row_stride;
        let payload_len = self.padded_row_stride() * self.height() as usize;
        let image_size = u32::try_from(payload_len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bitmap too large"))?;
        let data_offset = FILE_HEADER_SIZE + header_size;

        FileHeader {
            file_size: data_offset.saturating_add(image_size),
            data_offset,
            ..self.file_header
        }
        .write_to(writer)?;

        InfoHeader {
            size: header_size,
            compression: if has_alpha { BI_BITFIELDS } else { BI_RGB },
            image_size,
            ..self.info_header
        }
        .write_to(writer)?;

        if has_alpha {
            ColorHeader::default().write_to(writer)?;
        }

        if padding == 0 {
            writer.write_all(&self.data)
        } else {
            let zeros = vec![0u8; padding];
            for row in self.data.chunks_exact(self.row_stride) {
                writer.write_all(row)?;
                writer.write_all(&zeros)?;
            }
            Ok(())
        }
    }

    fn check_writable(&self) -> Result<()> {
        match self.info_header.bit_count {
            24 | 32 => Ok(()),
            other => Err(Error::Format(format!(
                "only 24-bit and 32-bit bitmaps can be written, image is {other}-bit"
            ))),
        }
    }

    /// Image width in pixels.
    pub const fn width(&self) -> u32 {
        self.info_header.width.unsigned_abs()
    }

    /// Image height in pixels.
    pub const fn height(&self) -> u32 {
        self.info_header.height.unsigned_abs()
    }

    /// Bits per pixel (24 or 32 for images built by [`RasterImage::new`]).
    pub const fn bits_per_pixel(&self) -> u16 {
        self.info_header.bit_count
    }

    /// Whether pixels carry an alpha byte.
    pub const fn has_alpha(&self) -> bool {
        self.info_header.bit_count == 32
    }

    /// Unpadded bytes per row.
    pub const fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// Bytes per row in the file, including padding.
    pub const fn padded_row_stride(&self) -> usize {
        align4(self.row_stride)
    }

    /// Raw pixel bytes, bottom row first.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Primary header as decoded or constructed.
    pub const fn file_header(&self) -> &FileHeader {
        &self.file_header
    }

    /// Geometry header as decoded or constructed.
    pub const fn info_header(&self) -> &InfoHeader {
        &self.info_header
    }

    /// Color at `(x, y)`, `y = 0` being the bottom row.
    pub fn get_pixel(&self, x: u32, y: u32) -> Result<RGB8> {
        let (offset, _) = self.pixel_offset(x, y, "pixel access")?;
        match self.data.get(offset..offset + 3) {
            Some(&[blue, green, red]) => Ok(RGB8::new(red, green, blue)),
            _ => Err(self.out_of_bounds(x, y)),
        }
    }

    /// Set the color at `(x, y)`. Alpha, when present, is forced opaque.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: RGB8) -> Result<()> {
        let (offset, channels) = self.pixel_offset(x, y, "pixel access")?;
        let bounds = self.out_of_bounds(x, y);
        match self.data.get_mut(offset..offset + channels) {
            Some([blue, green, red]) => {
                (*blue, *green, *red) = (color.b, color.g, color.r);
                Ok(())
            }
            Some([blue, green, red, alpha]) => {
                (*blue, *green, *red, *alpha) = (color.b, color.g, color.r, OPAQUE);
                Ok(())
            }
            _ => Err(bounds),
        }
    }

    /// Replace every pixel's color channels by its luma. Alpha is untouched.
    pub fn to_grayscale(&mut self) -> Result<()> {
        let channels = self.channels("grayscale conversion")?;
        for pixel in self.data.chunks_exact_mut(channels) {
            if let [blue, green, red, ..] = pixel {
                let gray = luma(*red, *green, *blue);
                (*blue, *green, *red) = (gray, gray, gray);
            }
        }
        Ok(())
    }

    fn channels(&self, operation: &'static str) -> Result<usize> {
        match self.info_header.bit_count {
            24 => Ok(3),
            32 => Ok(4),
            bits_per_pixel => Err(Error::UnsupportedFormat {
                operation,
                bits_per_pixel,
            }),
        }
    }

    fn pixel_offset(&self, x: u32, y: u32, operation: &'static str) -> Result<(usize, usize)> {
        let channels = self.channels(operation)?;
        if x >= self.width() || y >= self.height() {
            return Err(self.out_of_bounds(x, y));
        }
        let index = y as usize * self.width() as usize + x as usize;
        Ok((index * channels, channels))
    }

    const fn out_of_bounds(&self, x: u32, y: u32) -> Error {
        Error::Bounds {
            x,
            y,
            width: self.width(),
            height: self.height(),
        }
    }
}

/// Rec. 601 luma, truncated toward zero like a float-to-int cast.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops
)]
fn luma(red: u8, green: u8, blue: u8) -> u8 {
    (0.299 * f64::from(red) + 0.587 * f64::from(green) + 0.114 * f64::from(blue)) as u8
}

fn check_color_header(header: &ColorHeader) -> Result<()> {
    if !header.is_bgra() {
        return Err(Error::Format("pixel data must be in BGRA format".to_owned()));
    }
    if header.color_space != LCS_SRGB {
        return Err(Error::Format(format!(
            "color space must be sRGB, got {:#010x}",
            header.color_space
        )));
    }
    Ok(())
}

fn read_error(what: &'static str) -> impl Fn(io::Error) -> Error {
    move |err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::Format(format!("truncated {what}"))
        } else {
            Error::io(format!("failed to read {what}"), err)
        }
    }
}

/// Bytes between the current position and the end of the stream.
fn remaining<S: Seek>(stream: &mut S) -> io::Result<u64> {
    let position = stream.stream_position()?;
    let end = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(position))?;
    Ok(end.saturating_sub(position))
}

const fn align4(stride: usize) -> usize {
    (stride + 3) & !3
}

/// Row geometry derived from width, height and bit depth.
struct Layout {
    row_stride: usize,
    height: usize,
    payload_len: usize,
}

impl Layout {
    fn new(width: i32, height: i32, bit_count: u16) -> Option<Self> {
        let width = usize::try_from(width).ok()?;
        let height = usize::try_from(height).ok()?;
        let row_stride = width.checked_mul(usize::from(bit_count))? / 8;
        let payload_len = row_stride.checked_mul(height)?;
        Some(Self {
            row_stride,
            height,
            payload_len,
        })
    }

    const fn padding(&self) -> usize {
        align4(self.row_stride) - self.row_stride
    }

    fn file_payload_len(&self) -> Option<usize> {
        align4(self.row_stride).checked_mul(self.height)
    }
}
