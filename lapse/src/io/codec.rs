//! TIFF/PNG decoding of frames and TIFF encoding of results.
//!
//! Smoothed frames are written as 64-bit float grayscale TIFF. Flow fields
//! are written as one three-page 32-bit float TIFF whose pages carry the
//! plane name (`vx`, `vy`, `reliability`) in `ImageDescription`.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::{TiffError, TiffResult};

use crate::common::Buffer2;
use crate::error::{Error, Result};
use crate::frame::{FlowField, Frame};

pub(crate) const VX_PAGE: &str = "vx";
pub(crate) const VY_PAGE: &str = "vy";
pub(crate) const RELIABILITY_PAGE: &str = "reliability";

fn path_id(path: &Path) -> String {
    path.display().to_string()
}

/// Loads a single-channel frame from a TIFF or PNG file.
pub fn load_frame(path: &Path) -> Result<Frame> {
    let id = path_id(path);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("tif") | Some("tiff") => load_tiff_frame(path, &id),
        Some("png") => load_png_frame(path, &id),
        other => Err(Error::decode(
            id,
            format!("unsupported frame file extension {other:?}"),
        )),
    }
}

fn open_tiff(path: &Path, id: &str) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path).map_err(|e| Error::from_io(id, e))?;
    // Microscopy stacks can exceed the default decoder limits.
    let decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| Error::decode(id, e))?
        .with_limits(Limits::unlimited());
    Ok(decoder)
}

fn load_tiff_frame(path: &Path, id: &str) -> Result<Frame> {
    let mut decoder = open_tiff(path, id)?;

    match decoder.colortype().map_err(|e| Error::decode(id, e))? {
        tiff::ColorType::Gray(_) => {}
        other => {
            return Err(Error::decode(
                id,
                format!("expected a single-channel image, found {other:?}"),
            ));
        }
    }

    let (width, height) = decoder.dimensions().map_err(|e| Error::decode(id, e))?;
    let pixels: Vec<f64> = match decoder.read_image().map_err(|e| Error::decode(id, e))? {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        _ => {
            return Err(Error::decode(id, "unsupported TIFF sample format"));
        }
    };

    frame_from_pixels(width as usize, height as usize, pixels, id)
}

fn load_png_frame(path: &Path, id: &str) -> Result<Frame> {
    let image = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(source) => Error::from_io(id, source),
        other => Error::decode(id, other),
    })?;

    let (width, height) = (image.width() as usize, image.height() as usize);
    let pixels: Vec<f64> = match image {
        DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(f64::from).collect(),
        DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f64::from).collect(),
        other => {
            return Err(Error::decode(
                id,
                format!("expected a single-channel image, found {:?}", other.color()),
            ));
        }
    };

    frame_from_pixels(width, height, pixels, id)
}

fn frame_from_pixels(width: usize, height: usize, pixels: Vec<f64>, id: &str) -> Result<Frame> {
    if pixels.len() != width * height {
        return Err(Error::decode(
            id,
            format!(
                "decoded {} samples for a {width}x{height} frame",
                pixels.len()
            ),
        ));
    }
    Ok(Frame::new(width, height, pixels))
}

/// Writes `frame` as a 64-bit float grayscale TIFF, replacing any existing file.
pub(crate) fn save_frame(path: &Path, frame: &Frame) -> Result<()> {
    let (width, height) = tiff_dimensions(frame.width(), frame.height(), path)?;
    write_replacing(path, |writer| {
        let mut encoder = TiffEncoder::new(writer)?;
        encoder.write_image::<colortype::Gray64Float>(width, height, frame.pixels())
    })
}

/// Writes the three flow planes into one TIFF. The bundle is written to a
/// temporary file and renamed, so readers never see a partial triple.
pub(crate) fn save_flow_field(path: &Path, field: &FlowField) -> Result<()> {
    let shape = field.shape();
    let (width, height) = tiff_dimensions(shape.width, shape.height, path)?;
    let pages = [
        (VX_PAGE, &field.vx),
        (VY_PAGE, &field.vy),
        (RELIABILITY_PAGE, &field.reliability),
    ];

    write_replacing(path, |writer| {
        let mut encoder = TiffEncoder::new(writer)?;
        for (name, plane) in pages {
            let mut image = encoder.new_image::<colortype::Gray32Float>(width, height)?;
            image.encoder().write_tag(Tag::ImageDescription, name)?;
            image.write_data(plane.pixels())?;
        }
        Ok(())
    })
}

/// Reads a flow bundle written by [`OutputDirectory`](super::OutputDirectory).
pub fn load_flow_field(path: &Path) -> Result<FlowField> {
    let id = path_id(path);
    let mut decoder = open_tiff(path, &id)?;

    let mut vx = None;
    let mut vy = None;
    let mut reliability = None;

    loop {
        let name = decoder
            .get_tag_ascii_string(Tag::ImageDescription)
            .map_err(|e| Error::decode(&id, e))?;
        let (width, height) = decoder.dimensions().map_err(|e| Error::decode(&id, e))?;
        let data = match decoder.read_image().map_err(|e| Error::decode(&id, e))? {
            DecodingResult::F32(buf) => buf,
            _ => return Err(Error::decode(&id, "flow planes must be 32-bit float")),
        };
        if data.len() != width as usize * height as usize {
            return Err(Error::decode(&id, "flow plane size does not match its dimensions"));
        }
        let plane = Buffer2::new(width as usize, height as usize, data);

        match name.trim_end_matches('\0') {
            VX_PAGE => vx = Some(plane),
            VY_PAGE => vy = Some(plane),
            RELIABILITY_PAGE => reliability = Some(plane),
            other => {
                return Err(Error::decode(&id, format!("unexpected flow page '{other}'")));
            }
        }

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(|e| Error::decode(&id, e))?;
    }

    match (vx, vy, reliability) {
        (Some(vx), Some(vy), Some(reliability))
            if vx.same_shape(&vy) && vx.same_shape(&reliability) =>
        {
            Ok(FlowField::new(vx, vy, reliability))
        }
        _ => Err(Error::decode(
            id,
            "flow bundle needs vx, vy and reliability pages of one shape",
        )),
    }
}

fn tiff_dimensions(width: usize, height: usize, path: &Path) -> Result<(u32, u32)> {
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(Error::Io {
            id: path_id(path),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot encode a {width}x{height} TIFF"),
            ),
        }),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

/// Encodes into `<path>.partial`, then renames over `path`.
fn write_replacing<F>(path: &Path, encode: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> TiffResult<()>,
{
    let id = path_id(path);
    let temp = temp_path(path);

    let result = (|| -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(&temp)?);
        encode(&mut writer).map_err(tiff_to_io)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        fs::rename(&temp, path)
    })();

    result.map_err(|source| {
        let _ = fs::remove_file(&temp);
        Error::Io { id, source }
    })
}

fn tiff_to_io(error: TiffError) -> io::Error {
    match error {
        TiffError::IoError(e) => e,
        other => io::Error::other(other.to_string()),
    }
}
