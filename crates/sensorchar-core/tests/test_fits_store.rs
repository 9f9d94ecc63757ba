mod common;

use ndarray::{s, Array2};
use tempfile::TempDir;

use sensorchar_core::error::SensorError;
use sensorchar_core::frame::{Frame, GroupKey, HeaderValue};
use sensorchar_core::io::{load_fits, load_frame, write_fits, FitsBitpix, FitsReader, FrameStore};

use common::{make_frame, tagged, write_frames};

fn gradient(h: usize, w: usize) -> Frame {
    Frame::new(Array2::from_shape_fn((h, w), |(r, c)| (r * 100 + c) as f64))
}

// ---------------------------------------------------------------------------
// FITS codec
// ---------------------------------------------------------------------------

#[test]
fn test_fits_u16_keeps_pixels_and_tags() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bias.fits");
    let mut frame = gradient(5, 7);
    frame.data[[4, 6]] = 65535.0;
    frame.header.set("EXPTIME", HeaderValue::Float(0.5));
    frame.header.set("READOUTM", HeaderValue::Text("HDR".into()));
    frame.header.set("GAINSET", HeaderValue::Int(12));
    write_fits(&path, &frame, FitsBitpix::U16).unwrap();

    let loaded = load_fits(&path).unwrap();
    assert_eq!(loaded.shape(), (5, 7));
    assert_eq!(loaded.data, frame.data);
    assert_eq!(loaded.header.get_f64("exptime"), Some(0.5));
    assert_eq!(
        loaded.header.get("READOUTM").and_then(HeaderValue::as_str),
        Some("HDR")
    );
    assert_eq!(loaded.header.get("GAINSET"), Some(&HeaderValue::Int(12)));
    assert!(!loaded.header.contains("BZERO"));
    assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
}

#[test]
fn test_fits_f64_is_exact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("master.fits");
    let frame = Frame::new(Array2::from_shape_fn((3, 4), |(r, c)| r as f64 / 3.0 - c as f64 * 1e-7));
    write_fits(&path, &frame, FitsBitpix::F64).unwrap();
    assert_eq!(load_fits(&path).unwrap().data, frame.data);
}

#[test]
fn test_fits_read_rows_matches_full_frame() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flat.fits");
    let frame = gradient(10, 6);
    write_fits(&path, &frame, FitsBitpix::F32).unwrap();

    let reader = FitsReader::open(&path).unwrap();
    assert_eq!(reader.shape(), (10, 6));
    let band = reader.read_rows(3, 4).unwrap();
    assert_eq!(band, frame.data.slice(s![3..7, ..]).to_owned());
    assert!(reader.read_rows(8, 3).is_err());
}

#[test]
fn test_fits_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.fits");
    std::fs::write(&path, vec![b'x'; 2880]).unwrap();
    assert!(matches!(
        FitsReader::open(&path),
        Err(SensorError::InvalidFits(_))
    ));
}

#[test]
fn test_fits_rejects_truncated_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("short.fits");
    write_fits(&path, &make_frame(40, 40, 1.0), FitsBitpix::F64).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..2880 * 2]).unwrap();
    assert!(matches!(
        FitsReader::open(&path),
        Err(SensorError::InvalidFits(_))
    ));
}

fn header_card(text: &[u8]) -> Vec<u8> {
    let mut card = text.to_vec();
    card.resize(80, b' ');
    card
}

#[test]
fn test_fits_rejects_non_ascii_header_card() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt-1.fits");
    let mut bytes = header_card(b"SIMPLE  =                    T");
    let mut observer = b"OBSERV".to_vec();
    observer.extend_from_slice("e\u{e9}= 'x'".as_bytes());
    bytes.extend(header_card(&observer));
    bytes.extend(header_card(b"END"));
    bytes.resize(2880, b' ');
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        FitsReader::open(&path),
        Err(SensorError::InvalidFits(_))
    ));
    let err = FrameStore::new(dir.path()).load().unwrap_err();
    assert!(matches!(err, SensorError::InvalidFits(_)));
}

#[test]
fn test_fits_text_tags_are_written_as_ascii() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tags.fits");
    let mut frame = make_frame(2, 2, 1.0);
    frame.header.set("OBSERVER", HeaderValue::Text("\u{c5}ngstr\u{f6}m lab".into()));
    let quoted_at_limit = format!("{}'tail", "a".repeat(67));
    frame.header.set("NOTE", HeaderValue::Text(quoted_at_limit));
    frame.header.set("QUOTE", HeaderValue::Text("it's 'cold'".into()));
    write_fits(&path, &frame, FitsBitpix::F32).unwrap();

    let loaded = load_fits(&path).unwrap();
    let text = |key: &str| {
        loaded
            .header
            .get(key)
            .and_then(HeaderValue::as_str)
            .map(str::to_string)
    };
    assert_eq!(text("OBSERVER").as_deref(), Some("?ngstr?m lab"));
    assert_eq!(text("NOTE"), Some("a".repeat(67)));
    assert_eq!(text("QUOTE").as_deref(), Some("it's 'cold'"));
}

// ---------------------------------------------------------------------------
// FrameStore
// ---------------------------------------------------------------------------

#[test]
fn test_store_capture_order_is_numeric() {
    let dir = TempDir::new().unwrap();
    let frames: Vec<Frame> = (0..12).map(|i| make_frame(2, 2, i as f64)).collect();
    write_frames(dir.path(), "bias", &frames, FitsBitpix::F32);
    std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

    let store = FrameStore::new(dir.path());
    let names: Vec<String> = store
        .paths()
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 12);
    assert_eq!(names[0], "bias-1.fits");
    assert_eq!(names[1], "bias-2.fits");
    assert_eq!(names[11], "bias-12.fits");

    let loaded = store.load().unwrap();
    let means: Vec<f64> = loaded.iter().map(Frame::mean).collect();
    assert_eq!(means, (0..12).map(|i| i as f64).collect::<Vec<_>>());
}

#[test]
fn test_store_empty_directory() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("readme.md"), "nothing here").unwrap();
    let err = FrameStore::new(dir.path()).load().unwrap_err();
    assert!(matches!(err, SensorError::EmptySource { .. }));
}

#[test]
fn test_store_missing_directory_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = FrameStore::new(dir.path().join("absent")).paths().unwrap_err();
    assert!(matches!(err, SensorError::Io(_)));
}

#[test]
fn test_store_shape_mismatch() {
    let dir = TempDir::new().unwrap();
    write_fits(&dir.path().join("a-1.fits"), &make_frame(4, 4, 1.0), FitsBitpix::F32).unwrap();
    write_fits(&dir.path().join("a-2.fits"), &make_frame(4, 5, 1.0), FitsBitpix::F32).unwrap();
    let err = FrameStore::new(dir.path()).load().unwrap_err();
    match err {
        SensorError::ShapeMismatch {
            context,
            expected,
            found,
        } => {
            assert!(context.contains("a-2.fits"));
            assert_eq!(expected, (4, 4));
            assert_eq!(found, (4, 5));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_store_groups_by_numeric_tag() {
    let dir = TempDir::new().unwrap();
    let frames = vec![
        tagged(make_frame(3, 3, 10.0), "EXPTIME", 10.0),
        tagged(make_frame(3, 3, 2.0), "EXPTIME", 2.0),
        tagged(make_frame(3, 3, 2.5), "EXPTIME", 2.0),
        tagged(make_frame(3, 3, 0.5), "EXPTIME", 0.5),
    ];
    write_frames(dir.path(), "dark", &frames, FitsBitpix::F32);

    let group = FrameStore::new(dir.path()).load_grouped("EXPTIME").unwrap();
    assert_eq!(group.len(), 3);
    assert_eq!(group.frame_count(), 4);
    assert_eq!(group.numeric_keys().unwrap(), vec![0.5, 2.0, 10.0]);

    let two = group.get(&GroupKey::number(2.0)).unwrap();
    assert_eq!(two.len(), 2);
    // capture order inside a key
    assert_eq!(two[0].mean(), 2.0);
    assert_eq!(two[1].mean(), 2.5);
}

#[test]
fn test_store_missing_tag_is_an_error() {
    let dir = TempDir::new().unwrap();
    let frames = vec![
        tagged(make_frame(2, 2, 1.0), "EXPTIME", 1.0),
        make_frame(2, 2, 1.0),
    ];
    write_frames(dir.path(), "dark", &frames, FitsBitpix::F32);
    let err = FrameStore::new(dir.path()).load_grouped("EXPTIME").unwrap_err();
    match err {
        SensorError::MissingMetadata { path, key } => {
            assert_eq!(key, "EXPTIME");
            assert!(path.ends_with("dark-2.fits"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_store_stream_yields_frames_in_order() {
    let dir = TempDir::new().unwrap();
    let frames: Vec<Frame> = (0..5).map(|i| make_frame(3, 3, i as f64)).collect();
    write_frames(dir.path(), "seq", &frames, FitsBitpix::F32);

    let stream = FrameStore::new(dir.path()).stream().unwrap();
    assert_eq!(stream.size_hint().0, 5);
    let means: Vec<f64> = stream.map(|f| f.unwrap().mean()).collect();
    assert_eq!(means, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_store_extension_filter() {
    let dir = TempDir::new().unwrap();
    write_fits(&dir.path().join("a-1.fits"), &make_frame(2, 2, 1.0), FitsBitpix::F32).unwrap();
    write_fits(&dir.path().join("a-2.fit"), &make_frame(2, 2, 1.0), FitsBitpix::F32).unwrap();
    let store = FrameStore::new(dir.path()).with_extensions(&[".FIT"]);
    let paths = store.paths().unwrap();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].ends_with("a-2.fit"));
}

#[test]
fn test_store_decoded_bytes() {
    let dir = TempDir::new().unwrap();
    let frames: Vec<Frame> = (0..3).map(|_| make_frame(10, 20, 0.0)).collect();
    write_frames(dir.path(), "f", &frames, FitsBitpix::U16);
    let bytes = FrameStore::new(dir.path()).decoded_bytes().unwrap();
    assert_eq!(bytes, 3 * 10 * 20 * 8);
}

#[test]
fn test_png_frames_load_as_raw_adu() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flat-1.png");
    let img = image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::from_fn(4, 3, |x, y| {
        image::Luma([(y * 1000 + x) as u16])
    });
    img.save(&path).unwrap();

    let frame = load_frame(&path).unwrap();
    assert_eq!(frame.shape(), (3, 4));
    assert_eq!(frame.data[[2, 3]], 2003.0);
    assert!(frame.header.is_empty());
}
