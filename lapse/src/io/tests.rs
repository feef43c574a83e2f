//! Tests for frame storage.

use std::fs::{self, File};
use std::path::Path;

use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};

use super::*;
use crate::common::Buffer2;
use crate::frame::FrameShape;

fn write_gray16_tiff(path: &Path, width: u32, height: u32, data: &[u16]) {
    let mut encoder = TiffEncoder::new(File::create(path).unwrap()).unwrap();
    encoder
        .write_image::<colortype::Gray16>(width, height, data)
        .unwrap();
}

fn sample_field() -> FlowField {
    let vx = Buffer2::from_fn(4, 3, |x, y| x as f32 - y as f32);
    let vy = Buffer2::from_fn(4, 3, |x, _| 0.5 * x as f32);
    let reliability = Buffer2::from_fn(4, 3, |x, y| (x * y) as f32 * 0.1);
    FlowField::new(vx, vy, reliability)
}

// ============================================================================
// Decoding
// ============================================================================

#[test]
fn test_load_gray16_tiff_widens_to_f64() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("raw_000.tif");
    let data: Vec<u16> = (0..12).map(|i| i * 1000).collect();
    write_gray16_tiff(&path, 4, 3, &data);

    let frame = load_frame(&path).unwrap();
    assert_eq!(frame.shape(), FrameShape::new(4, 3));
    assert_eq!(frame.get(3, 2), 11000.0);
    assert_eq!(frame.get(1, 0), 1000.0);
}

#[test]
fn test_load_gray_png() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("raw.png");
    let pixels: Vec<u8> = (0..20).collect();
    image::GrayImage::from_raw(5, 4, pixels)
        .unwrap()
        .save(&path)
        .unwrap();

    let frame = load_frame(&path).unwrap();
    assert_eq!(frame.shape(), FrameShape::new(5, 4));
    assert_eq!(frame.get(4, 3), 19.0);
}

#[test]
fn test_color_tiff_is_a_decode_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("color.tif");
    let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
    encoder
        .write_image::<colortype::RGB8>(2, 2, &[0u8; 12])
        .unwrap();

    let err = load_frame(&path).unwrap_err();
    assert!(matches!(err, Error::Decode { .. }), "got {err:?}");
}

#[test]
fn test_garbage_payload_is_a_decode_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.tiff");
    fs::write(&path, b"definitely not a tiff").unwrap();

    let err = load_frame(&path).unwrap_err();
    assert!(matches!(err, Error::Decode { .. }), "got {err:?}");
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = load_frame(&dir.path().join("absent.tif")).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "got {err:?}");
}

#[test]
fn test_unknown_extension_is_a_decode_error() {
    let err = load_frame(Path::new("frame.npy")).unwrap_err();
    assert!(matches!(err, Error::Decode { .. }));
}

// ============================================================================
// Encoding
// ============================================================================

#[test]
fn test_smoothed_frame_keeps_double_precision() {
    let dir = TempDir::new().unwrap();
    let out = OutputDirectory::create(&dir.path().join("smooth")).unwrap();
    let frame = Frame::from_fn(6, 5, |x, y| x as f64 / 3.0 + y as f64 * 1e-9);

    out.save_frame(7, &frame).unwrap();

    let path = out.smoothed_frame_path(7);
    assert!(path.ends_with("smooth_000007.tiff"));
    assert_eq!(load_frame(&path).unwrap(), frame);
}

#[test]
fn test_save_frame_overwrites() {
    let dir = TempDir::new().unwrap();
    let out = OutputDirectory::create(dir.path()).unwrap();

    out.save_frame(0, &Frame::filled(3, 3, 1.0)).unwrap();
    out.save_frame(0, &Frame::filled(4, 3, 2.0)).unwrap();

    let loaded = load_frame(&out.smoothed_frame_path(0)).unwrap();
    assert_eq!(loaded, Frame::filled(4, 3, 2.0));
}

#[test]
fn test_flow_bundle_pages() {
    let dir = TempDir::new().unwrap();
    let out = OutputDirectory::create(dir.path()).unwrap();
    let field = sample_field();

    out.save_flow_field(12, &field).unwrap();

    let path = out.flow_field_path(12);
    assert!(path.ends_with("flow_000012.tiff"));
    assert_eq!(load_flow_field(&path).unwrap(), field);

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
        .collect();
    assert!(leftovers.is_empty(), "temporary file left behind");
}

#[test]
fn test_write_failure_is_io_error() {
    let dir = TempDir::new().unwrap();
    let out = OutputDirectory::create(&dir.path().join("gone")).unwrap();
    fs::remove_dir_all(out.dir()).unwrap();

    let err = out.save_flow_field(0, &sample_field()).unwrap_err();
    assert!(
        matches!(err, Error::Io { .. } | Error::NotFound { .. }),
        "got {err:?}"
    );
}

// ============================================================================
// Sources
// ============================================================================

#[test]
fn test_frame_directory_orders_by_name() {
    let dir = TempDir::new().unwrap();
    for (name, value) in [("t02.tif", 2u16), ("t00.tif", 0), ("t01.tif", 1)] {
        write_gray16_tiff(&dir.path().join(name), 3, 3, &[value; 9]);
    }
    fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let frames = FrameDirectory::open(dir.path()).unwrap();
    assert_eq!(frames.len(), 3);
    for index in 0..3 {
        let frame = frames.load_frame(index).unwrap();
        assert_eq!(frame.get(1, 1), index as f64);
    }
    assert!(matches!(
        frames.load_frame(3),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn test_frame_directory_missing_dir() {
    let dir = TempDir::new().unwrap();
    let err = FrameDirectory::open(&dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn test_smoothed_directory_keeps_gaps() {
    let dir = TempDir::new().unwrap();
    let out = OutputDirectory::create(dir.path()).unwrap();
    out.save_frame(0, &Frame::filled(3, 3, 0.0)).unwrap();
    out.save_frame(2, &Frame::filled(3, 3, 2.0)).unwrap();

    let smoothed = SmoothedDirectory::open(dir.path()).unwrap();
    assert_eq!(smoothed.len(), 3);
    assert_eq!(smoothed.load_frame(2).unwrap().get(0, 0), 2.0);
    assert!(matches!(
        smoothed.load_frame(1),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn test_smoothed_directory_ignores_files_outside_indices() {
    let dir = TempDir::new().unwrap();
    let out = OutputDirectory::create(dir.path()).unwrap();
    for k in 0..3 {
        out.save_frame(k, &Frame::filled(3, 3, k as f64)).unwrap();
    }

    let smoothed = SmoothedDirectory::with_indices(dir.path(), 3, &[0, 2, 7]);
    assert_eq!(smoothed.len(), 3);
    assert_eq!(smoothed.load_frame(0).unwrap().get(0, 0), 0.0);
    assert_eq!(smoothed.load_frame(2).unwrap().get(0, 0), 2.0);
    assert!(matches!(
        smoothed.load_frame(1),
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        smoothed.load_frame(7),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn test_slice_source_not_found() {
    let frames = vec![Frame::filled(3, 3, 1.0)];
    assert_eq!(frames.len(), 1);
    assert!(frames.load_frame(0).is_ok());
    let err = frames.load_frame(1).unwrap_err();
    assert!(err.to_string().contains("frame[1]"));
}

#[test]
fn test_sub_sequence_reindexes() {
    let frames: Vec<Frame> = (0..6).map(|i| Frame::filled(3, 3, i as f64)).collect();
    let window = SubSequence::new(&frames, 2, 3);

    assert_eq!(window.len(), 3);
    assert_eq!(window.absolute(0), 2);
    assert_eq!(window.load_frame(0).unwrap().get(0, 0), 2.0);
    assert_eq!(window.load_frame(2).unwrap().get(0, 0), 4.0);
    assert!(matches!(window.load_frame(3), Err(Error::NotFound { .. })));
    assert_eq!(window.frame_id(1), "frame[3]");
}

#[test]
fn test_memory_sink_collects_in_index_order() {
    let sink = MemorySink::new();
    sink.save_frame(3, &Frame::filled(2, 2, 3.0)).unwrap();
    sink.save_frame(1, &Frame::filled(2, 2, 1.0)).unwrap();
    sink.save_flow_field(1, &sample_field()).unwrap();

    assert_eq!(sink.frame_indices(), vec![1, 3]);
    assert_eq!(sink.flow_indices(), vec![1]);
    assert_eq!(sink.flow_field(1).unwrap(), sample_field());
    let frames = sink.into_frames();
    assert_eq!(frames[0].get(0, 0), 1.0);
    assert_eq!(frames[1].get(0, 0), 3.0);
}
