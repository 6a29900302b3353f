//! Fixed-layout little-endian BMP header records.
//!
//! Every record is read and written field by field so the on-disk layout
//! never depends on in-memory struct packing.

use std::io::{self, Read, Write};

/// `"BM"` read as a little-endian `u16`.
pub const SIGNATURE: u16 = 0x4D42;
/// On-disk size of [`FileHeader`].
pub const FILE_HEADER_SIZE: u32 = 14;
/// On-disk size of [`InfoHeader`].
pub const INFO_HEADER_SIZE: u32 = 40;
/// On-disk size of [`ColorHeader`].
pub const COLOR_HEADER_SIZE: u32 = 84;

/// Uncompressed RGB payload.
pub const BI_RGB: u32 = 0;
/// Payload described by channel bit-masks.
pub const BI_BITFIELDS: u32 = 3;
/// `"sRGB"` color-space tag.
pub const LCS_SRGB: u32 = 0x7352_4742;

/// Primary file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Magic number, [`SIGNATURE`] for valid files.
    pub signature: u16,
    /// Total file size in bytes.
    pub file_size: u32,
    /// Reserved, zero.
    pub reserved1: u16,
    /// Reserved, zero.
    pub reserved2: u16,
    /// Byte offset of the pixel payload.
    pub data_offset: u32,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            signature: SIGNATURE,
            file_size: 0,
            reserved1: 0,
            reserved2: 0,
            data_offset: 0,
        }
    }
}

impl FileHeader {
    /// Read the header from the current position.
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            signature: read_u16(reader)?,
            file_size: read_u32(reader)?,
            reserved1: read_u16(reader)?,
            reserved2: read_u16(reader)?,
            data_offset: read_u32(reader)?,
        })
    }

    /// Write the header at the current position.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.signature.to_le_bytes())?;
        writer.write_all(&self.file_size.to_le_bytes())?;
        writer.write_all(&self.reserved1.to_le_bytes())?;
        writer.write_all(&self.reserved2.to_le_bytes())?;
        writer.write_all(&self.data_offset.to_le_bytes())
    }
}

/// Geometry and format header (`BITMAPINFOHEADER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoHeader {
    /// Size of this header plus any extension that follows it.
    pub size: u32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels; negative means top-down rows.
    pub height: i32,
    /// Color planes, always 1.
    pub planes: u16,
    /// Bits per pixel.
    pub bit_count: u16,
    /// Compression code.
    pub compression: u32,
    /// Payload size in bytes, may be zero for [`BI_RGB`].
    pub image_size: u32,
    /// Horizontal resolution in pixels per meter.
    pub x_pixels_per_meter: i32,
    /// Vertical resolution in pixels per meter.
    pub y_pixels_per_meter: i32,
    /// Palette entries used.
    pub colors_used: u32,
    /// Palette entries required.
    pub colors_important: u32,
}

impl Default for InfoHeader {
    fn default() -> Self {
        Self {
            size: 0,
            width: 0,
            height: 0,
            planes: 1,
            bit_count: 0,
            compression: BI_RGB,
            image_size: 0,
            x_pixels_per_meter: 0,
            y_pixels_per_meter: 0,
            colors_used: 0,
            colors_important: 0,
        }
    }
}

impl InfoHeader {
    /// Read the header from the current position.
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            size: read_u32(reader)?,
            width: read_i32(reader)?,
            height: read_i32(reader)?,
            planes: read_u16(reader)?,
            bit_count: read_u16(reader)?,
            compression: read_u32(reader)?,
            image_size: read_u32(reader)?,
            x_pixels_per_meter: read_i32(reader)?,
            y_pixels_per_meter: read_i32(reader)?,
            colors_used: read_u32(reader)?,
            colors_important: read_u32(reader)?,
        })
    }

    /// Write the header at the current position.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.size.to_le_bytes())?;
        writer.write_all(&self.width.to_le_bytes())?;
        writer.write_all(&self.height.to_le_bytes())?;
        writer.write_all(&self.planes.to_le_bytes())?;
        writer.write_all(&self.bit_count.to_le_bytes())?;
        writer.write_all(&self.compression.to_le_bytes())?;
        writer.write_all(&self.image_size.to_le_bytes())?;
        writer.write_all(&self.x_pixels_per_meter.to_le_bytes())?;
        writer.write_all(&self.y_pixels_per_meter.to_le_bytes())?;
        writer.write_all(&self.colors_used.to_le_bytes())?;
        writer.write_all(&self.colors_important.to_le_bytes())
    }
}

/// Channel mask extension present in 32-bit files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorHeader {
    /// Red channel bit-mask.
    pub red_mask: u32,
    /// Green channel bit-mask.
    pub green_mask: u32,
    /// Blue channel bit-mask.
    pub blue_mask: u32,
    /// Alpha channel bit-mask.
    pub alpha_mask: u32,
    /// Color-space tag.
    pub color_space: u32,
    /// Endpoints, gamma and profile fields, unused.
    pub reserved: [u32; 16],
}

impl Default for ColorHeader {
    /// The only accepted layout: BGRA byte order, sRGB.
    fn default() -> Self {
        Self {
            red_mask: 0x00FF_0000,
            green_mask: 0x0000_FF00,
            blue_mask: 0x0000_00FF,
            alpha_mask: 0xFF00_0000,
            color_space: LCS_SRGB,
            reserved: [0; 16],
        }
    }
}

impl ColorHeader {
    /// Read the header from the current position.
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut header = Self {
            red_mask: read_u32(reader)?,
            green_mask: read_u32(reader)?,
            blue_mask: read_u32(reader)?,
            alpha_mask: read_u32(reader)?,
            color_space: read_u32(reader)?,
            reserved: [0; 16],
        };
        for word in &mut header.reserved {
            *word = read_u32(reader)?;
        }
        Ok(header)
    }

    /// Write the header at the current position.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.red_mask.to_le_bytes())?;
        writer.write_all(&self.green_mask.to_le_bytes())?;
        writer.write_all(&self.blue_mask.to_le_bytes())?;
        writer.write_all(&self.alpha_mask.to_le_bytes())?;
        writer.write_all(&self.color_space.to_le_bytes())?;
        for word in &self.reserved {
            writer.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }

    /// Whether the masks describe BGRA byte order.
    pub fn is_bgra(&self) -> bool {
        let canonical = Self::default();
        self.red_mask == canonical.red_mask
            && self.green_mask == canonical.green_mask
            && self.blue_mask == canonical.blue_mask
            && self.alpha_mask == canonical.alpha_mask
    }
}

fn read_u16<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut bytes = [0u8; 2];
    reader.read_exact(&mut bytes)?;
    Ok(u16::from_le_bytes(bytes))
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_le_bytes(bytes))
}
