//! Cross-format dataset loading tests.

use std::path::Path;

use stackscope_core::{FrameShape, SampleType, StackscopeError};
use stackscope_source::{open_paths, stack::write_npy, LoadOptions};

fn write_gray_png(path: &Path, size: u32, value: u8) {
    let buf = image_buffer(size, value);
    buf.save(path).unwrap();
}

fn image_buffer(size: u32, value: u8) -> image::GrayImage {
    image::GrayImage::from_pixel(size, size, image::Luma([value]))
}

#[test]
fn test_directory_of_images_loads_in_name_order() {
    let tmp = tempfile::tempdir().unwrap();
    for (name, value) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
        write_gray_png(&tmp.path().join(name), 4, value);
    }

    let source = open_paths(&[tmp.path().to_path_buf()], &LoadOptions::default()).unwrap();
    assert_eq!(source.dataset().len(), 3);
    assert_eq!(source.read_frame(0).unwrap().sample(0, 0, 0), 10.0);
    assert_eq!(source.read_frame(1).unwrap().sample(0, 0, 0), 20.0);
    assert_eq!(source.read_frame(2).unwrap().sample(0, 0, 0), 30.0);
}

#[test]
fn test_mixed_directory_keeps_majority_extension() {
    let tmp = tempfile::tempdir().unwrap();
    write_gray_png(&tmp.path().join("a.png"), 4, 1);
    write_gray_png(&tmp.path().join("b.png"), 4, 2);
    // A stray file of another type is ignored.
    std::fs::write(tmp.path().join("notes.txt"), b"calibration notes").unwrap();

    let source = open_paths(&[tmp.path().to_path_buf()], &LoadOptions::default()).unwrap();
    assert_eq!(source.dataset().len(), 2);
}

#[test]
fn test_npy_and_png_agree_on_identical_data() {
    let tmp = tempfile::tempdir().unwrap();

    // Same 2-frame 4x4 content both ways.
    let png_a = tmp.path().join("f0.png");
    let png_b = tmp.path().join("f1.png");
    write_gray_png(&png_a, 4, 17);
    write_gray_png(&png_b, 4, 230);

    let npy = tmp.path().join("stack.npy");
    let mut data = vec![17u8; 16];
    data.extend(vec![230u8; 16]);
    write_npy(&npy, "|u1", &[2, 4, 4], &data).unwrap();

    let from_pngs = open_paths(&[png_a, png_b], &LoadOptions::default()).unwrap();
    let from_npy = open_paths(&[npy], &LoadOptions::default()).unwrap();

    assert_eq!(from_pngs.dataset().shape(), from_npy.dataset().shape());
    assert_eq!(from_pngs.dataset().sample_type(), SampleType::U8);
    for index in 0..2 {
        let a = from_pngs.read_frame(index).unwrap();
        let b = from_npy.read_frame(index).unwrap();
        assert_eq!(a, b, "frame {index} differs between formats");
    }
}

#[test]
fn test_shape_mismatch_across_files_is_format_error() {
    let tmp = tempfile::tempdir().unwrap();
    let a = tmp.path().join("a.png");
    let b = tmp.path().join("b.png");
    write_gray_png(&a, 4, 0);
    write_gray_png(&b, 6, 0);

    let err = open_paths(&[a, b], &LoadOptions::default()).err().unwrap();
    assert!(matches!(err, StackscopeError::Format(_)));
}

#[test]
fn test_load_failure_returns_no_dataset() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("broken.npy");
    std::fs::write(&path, b"\x93NUMPYxx").unwrap();
    assert!(open_paths(&[path], &LoadOptions::default()).is_err());
}

#[test]
fn test_subset_step_with_memory_cap() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("big.npy");
    let data: Vec<u8> = (0..20).flat_map(|f| vec![f as u8; 4]).collect();
    write_npy(&path, "|u1", &[20, 2, 2], &data).unwrap();

    // Decoded frames are 2*2*4 = 16 bytes; cap at 5 frames' worth.
    let options = LoadOptions {
        max_bytes: Some(80),
        ..Default::default()
    };
    let source = open_paths(&[path], &options).unwrap();
    assert!(source.dataset().len() <= 5);
    assert_eq!(source.dataset().shape(), FrameShape::new(2, 2, 1));
    // First kept frame is always original frame 0.
    assert_eq!(source.read_frame(0).unwrap().sample(0, 0, 0), 0.0);
}
