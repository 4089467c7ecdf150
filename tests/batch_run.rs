use std::fs;
use std::path::Path;

use image::{GenericImageView, Rgba, RgbaImage};
use pixil::engine::RasterEngine;
use pixil::processor::{Interpreter, run_script};

fn write_png(path: &Path, width: u32, height: u32) {
    RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]))
        .save(path)
        .unwrap();
}

#[test]
fn foreach_skips_corrupt_image_and_keeps_counting() {
    let dir = tempfile::tempdir().unwrap();
    let photos = dir.path().join("photos");
    fs::create_dir(&photos).unwrap();
    write_png(&photos.join("a.png"), 40, 20);
    fs::write(photos.join("b.png"), b"definitely not a png").unwrap();
    write_png(&photos.join("c.png"), 20, 40);

    let script = r#"{
        BATCH #b = "photos";
        FOREACH IMG $p IN #b EXPORT TO "out" {
            RENAME $p "img_" + COUNTER + "_" + METADATA $p FNAME;
            ORIENTATION $p LANDSCAPE;
        }
    }"#;
    let report = run_script(script, RasterEngine::new(), dir.path()).unwrap();

    let out = dir.path().join("out");
    assert_eq!(
        report.exported,
        vec![out.join("img_0_a.png"), out.join("img_1_c.png")]
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, photos.join("b.png"));

    for file in &report.exported {
        assert_eq!(image::open(file).unwrap().dimensions(), (40, 20));
    }
    // Sources are always kept by FOREACH.
    assert!(photos.join("a.png").exists());
}

#[test]
fn single_image_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("wide.png"), 64, 32);
    write_png(&dir.path().join("logo.png"), 8, 8);

    let script = r#"{
        IMG $img = "wide.png";
        IMG $logo = "logo.png";
        RESIZE $img 1:1;
        SET $img CONTRAST 120;
        WATERMARK $img $logo 200;
        CONVERT $img TO JPG;
        COMPRESS $img 50;
        EXPORT $img TO "out/" OGDELETE;
    }"#;
    let report = run_script(script, RasterEngine::new(), dir.path()).unwrap();

    let exported = dir.path().join("out").join("wide.jpg");
    assert_eq!(report.exported, vec![exported.clone()]);
    assert_eq!(report.operations, 8);
    assert_eq!(image::open(&exported).unwrap().dimensions(), (32, 32));
    assert!(!dir.path().join("wide.png").exists());
    assert!(dir.path().join("logo.png").exists());
}

#[test]
fn web_optimised_export_to_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("pic.png"), 30, 30);

    let script = r#"{
        IMG $img = "pic.png";
        CROP $img (10, 50);
        QUANTIZE $img 8;
        WEBOPTIMIZE $img LOSSLESS;
        EXPORT $img TO "final/small.png" OGKEEP;
    }"#;
    let report = run_script(script, RasterEngine::new(), dir.path()).unwrap();

    let exported = dir.path().join("final").join("small.png");
    assert_eq!(report.exported, vec![exported.clone()]);
    assert_eq!(image::open(&exported).unwrap().dimensions(), (10, 30));
}

#[test]
fn failures_outside_foreach_abort_the_run() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.png"), b"nope").unwrap();

    let err = run_script(r#"{ IMG $i = "broken.png"; }"#, RasterEngine::new(), dir.path())
        .unwrap_err();
    assert!(format!("{err:#}").contains("Error loading image"), "{err:#}");

    let program = pixil::compile(r#"{ IMG $i = "broken.png"; } { INT $x; }"#).unwrap();
    let summary = Interpreter::new(RasterEngine::new(), dir.path()).execute(&program);
    assert!(summary.starts_with("Error: Error loading image"), "{summary}");
}

#[test]
fn text_watermark_and_metadata_are_written() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("a.png"), 400, 400);

    let program = pixil::compile(
        r#"{
            IMG $i = "a.png";
            WATERMARK $i "hi" ~R255255255~;
            ADD METADATA $i COPYRIGHT "Harbour Studio";
            CONVERT $i TO JPG;
            EXPORT $i TO "out/" OGKEEP;
        }"#,
    )
    .unwrap();
    let summary = Interpreter::new(RasterEngine::new(), dir.path()).execute(&program);
    assert_eq!(summary, "Executed successfully with 5 operations");

    let exported = dir.path().join("out").join("a.jpg");
    let bytes = fs::read(&exported).unwrap();
    assert!(bytes.windows(14).any(|w| w == b"Harbour Studio"));

    let img = image::open(&exported).unwrap().to_rgba8();
    let lit = img
        .enumerate_pixels()
        .filter(|(x, y, _)| *x < 80 && *y < 50)
        .any(|(_, _, p)| p.0[1] > 180 && p.0[2] > 180);
    assert!(lit, "expected white glyph pixels near the top-left corner");
    let corner = img.get_pixel(390, 390).0;
    assert!(corner[0] > 150 && corner[1] < 90, "{corner:?}");
}
