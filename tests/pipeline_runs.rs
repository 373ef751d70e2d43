mod common;

use std::fs;

use common::*;
use redate_rs::exif::{file_mtime, ExifProcessor, TimestampOrigin};
use redate_rs::exiftool::ExifTool;
use redate_rs::{BatchProcessor, Config, MetadataWriter, Mode, RedateError};

#[test]
fn sequential_run_preserves_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let a = jpeg_taken_at(dir.path(), "a.jpg", at(2023, 1, 1, 10, 0, 0));
    let b = jpeg_taken_at(dir.path(), "b.jpg", at(2023, 1, 1, 10, 5, 30));
    let c = png_modified_at(dir.path(), "c.png", at(2023, 1, 1, 9, 58, 0));
    fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

    let config = Config::new(dir.path(), Mode::Sequential { base: at(2024, 6, 1, 8, 0, 0) }).workers(Some(2));
    let report = BatchProcessor::new(config).unwrap().process_folder().unwrap();

    assert_eq!(report.stats.total_files, 4);
    assert_eq!(report.stats.processed_files, 3);
    assert_eq!(report.stats.skipped_files, 1);
    assert_eq!(report.stats.error_files, 0);

    assert_eq!(file_mtime(&c).unwrap(), at(2024, 6, 1, 8, 0, 0));
    assert_eq!(capture_time(&a), at(2024, 6, 1, 8, 2, 0));
    assert_eq!(capture_time(&b), at(2024, 6, 1, 8, 7, 30));
    assert_eq!(file_mtime(&b).unwrap(), at(2024, 6, 1, 8, 7, 30));
    assert_eq!(fs::read(&c).unwrap(), PNG_SIGNATURE);
}

#[test]
fn sequential_run_walks_subfolders() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("day2");
    fs::create_dir(&nested).unwrap();
    let top = jpeg_taken_at(dir.path(), "top.jpg", at(2022, 3, 1, 12, 0, 0));
    let deep = jpeg_taken_at(&nested, "deep.jpg", at(2022, 3, 2, 12, 0, 0));

    let config = Config::new(dir.path(), Mode::Sequential { base: at(2024, 1, 1, 0, 0, 0) });
    let report = BatchProcessor::new(config).unwrap().process_folder().unwrap();

    assert_eq!(report.stats.processed_files, 2);
    assert_eq!(capture_time(&top), at(2024, 1, 1, 0, 0, 0));
    assert_eq!(capture_time(&deep), at(2024, 1, 2, 0, 0, 0));
}

#[test]
fn dry_run_leaves_files_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let a = jpeg_taken_at(dir.path(), "a.jpg", at(2023, 1, 1, 10, 0, 0));
    let c = png_modified_at(dir.path(), "c.png", at(2023, 1, 1, 9, 58, 0));
    let a_bytes = fs::read(&a).unwrap();
    let a_mtime = fs::metadata(&a).unwrap().modified().unwrap();

    let config = Config::new(dir.path(), Mode::Sequential { base: at(2024, 6, 1, 8, 0, 0) }).dry_run(true);
    let report = BatchProcessor::new(config).unwrap().process_folder().unwrap();

    assert_eq!(report.stats.processed_files, 2);
    assert_eq!(fs::read(&a).unwrap(), a_bytes);
    assert_eq!(fs::metadata(&a).unwrap().modified().unwrap(), a_mtime);
    assert_eq!(file_mtime(&c).unwrap(), at(2023, 1, 1, 9, 58, 0));
}

#[test]
fn dry_run_counts_corrupt_jpeg_like_a_real_run() {
    let dir = tempfile::tempdir().unwrap();
    jpeg_taken_at(dir.path(), "good.jpg", at(2023, 1, 1, 9, 30, 0));
    let broken = dir.path().join("broken.jpg");
    fs::write(&broken, b"not really a jpeg").unwrap();

    let mode = Mode::Fixed(at(2024, 6, 1, 8, 0, 0));
    let dry = BatchProcessor::new(Config::new(dir.path(), mode.clone()).dry_run(true))
        .unwrap()
        .process_folder()
        .unwrap();
    let real = BatchProcessor::new(Config::new(dir.path(), mode)).unwrap().process_folder().unwrap();

    assert_eq!(dry.stats, real.stats);
    assert_eq!(dry.stats.error_files, 1);
    assert_eq!(dry.stats.processed_files, 1);
}

#[test]
fn sequential_run_without_images_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("readme.md"), "# nothing here").unwrap();

    let config = Config::new(dir.path(), Mode::Sequential { base: at(2024, 6, 1, 8, 0, 0) });
    let err = BatchProcessor::new(config).unwrap().process_folder().unwrap_err();
    assert!(matches!(err.downcast_ref::<RedateError>(), Some(RedateError::EmptyInput)));
}

#[test]
fn mtime_fallback_takes_part_in_the_anchor() {
    let dir = tempfile::tempdir().unwrap();
    // Broken JPEG: no EXIF readable, so its mtime is the original.
    let broken = dir.path().join("broken.jpg");
    fs::write(&broken, b"not really a jpeg").unwrap();
    filetime::set_file_mtime(&broken, redate_rs::metadata::to_file_time(at(2023, 1, 1, 9, 0, 0))).unwrap();
    let good = jpeg_taken_at(dir.path(), "good.jpg", at(2023, 1, 1, 9, 30, 0));

    let read = ExifProcessor::new().read_original_timestamp(&broken).unwrap();
    assert_eq!(read.origin, TimestampOrigin::FileModified);

    let config = Config::new(dir.path(), Mode::Sequential { base: at(2024, 6, 1, 8, 0, 0) });
    let report = BatchProcessor::new(config).unwrap().process_folder().unwrap();

    // The broken file anchors the run but cannot be rewritten.
    assert_eq!(report.stats.processed_files, 1);
    assert_eq!(report.stats.error_files, 1);
    assert_eq!(capture_time(&good), at(2024, 6, 1, 8, 30, 0));
    let errors: Vec<_> = report.errors().map(|(p, _)| p.to_path_buf()).collect();
    assert_eq!(errors, vec![broken]);
}

#[test]
fn auto_mode_counts_unparseable_names_as_errors() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("20230405_101112.jpg");
    fs::write(&plain, bare_jpeg()).unwrap();
    let prefixed = dir.path().join("IMG_20230102_030405.png");
    fs::write(&prefixed, PNG_SIGNATURE).unwrap();
    let holiday = dir.path().join("holiday.jpg");
    fs::write(&holiday, bare_jpeg()).unwrap();

    let config = Config::new(dir.path(), Mode::FromFilename { format: "%Y%m%d_%H%M%S".into() });
    let report = BatchProcessor::new(config).unwrap().process_folder().unwrap();

    assert_eq!(report.stats.processed_files, 2);
    assert_eq!(report.stats.error_files, 1);
    assert_eq!(capture_time(&plain), at(2023, 4, 5, 10, 11, 12));
    assert_eq!(file_mtime(&prefixed).unwrap(), at(2023, 1, 2, 3, 4, 5));
    assert_eq!(fs::read(&holiday).unwrap(), bare_jpeg());
}

#[test]
fn fixed_mode_respects_no_recursive() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("sub");
    fs::create_dir(&nested).unwrap();
    let top = dir.path().join("one.jpg");
    fs::write(&top, bare_jpeg()).unwrap();
    let deep = nested.join("two.jpg");
    fs::write(&deep, bare_jpeg()).unwrap();

    let target = at(2021, 12, 24, 18, 30, 0);
    let config = Config::new(dir.path(), Mode::Fixed(target)).recursive(false);
    let report = BatchProcessor::new(config).unwrap().process_folder().unwrap();

    assert_eq!(report.stats.total_files, 1);
    assert_eq!(report.stats.processed_files, 1);
    assert_eq!(capture_time(&top), target);
    assert_eq!(fs::read(&deep).unwrap(), bare_jpeg());
}

#[test]
fn missing_exiftool_skips_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    let jpg = dir.path().join("one.jpg");
    fs::write(&jpg, bare_jpeg()).unwrap();
    let png = png_modified_at(dir.path(), "two.png", at(2020, 1, 1, 0, 0, 0));

    let config = Config::new(dir.path(), Mode::Fixed(at(2021, 1, 1, 0, 0, 0)));
    let writer = MetadataWriter::with_exiftool(ExifTool::unavailable());
    let report = BatchProcessor::with_writer(config, writer).unwrap().process_folder().unwrap();

    assert_eq!(report.stats.skipped_files, 2);
    assert_eq!(report.stats.error_files, 0);
    assert_eq!(fs::read(&jpg).unwrap(), bare_jpeg());
    assert_eq!(file_mtime(&png).unwrap(), at(2020, 1, 1, 0, 0, 0));
}

#[test]
fn invalid_folder_is_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(dir.path().join("missing"), Mode::Fixed(at(2021, 1, 1, 0, 0, 0)));
    assert!(BatchProcessor::new(config).is_err());
}
