use anyhow::Result;
use image::{Rgb, RgbImage};
use tempfile::TempDir;

use live_detect::annotate::{fit_within, percent_to_cutoff, save_image, ColorMode};
use live_detect::detect::{BoundingBox, Detection, StubBackend, StubScript};
use live_detect::pipeline::{process_image_file, DetectionContext};
use live_detect::ColorPolicy;

const GRAY: Rgb<u8> = Rgb([40, 40, 40]);

fn write_image(dir: &TempDir, name: &str, width: u32, height: u32) -> Result<std::path::PathBuf> {
    let path = dir.path().join(name);
    RgbImage::from_pixel(width, height, GRAY).save(&path)?;
    Ok(path)
}

fn dog(confidence: f32) -> Detection {
    Detection::new("dog", 16, confidence, BoundingBox::new(100.0, 100.0, 200.0, 220.0))
}

fn person(confidence: f32) -> Detection {
    Detection::new("person", 0, confidence, BoundingBox::new(20.0, 60.0, 80.0, 230.0))
}

fn context(script: StubScript, person_color: Rgb<u8>) -> Result<DetectionContext> {
    DetectionContext::new(
        Box::new(StubBackend::new(script)),
        ColorPolicy::new(ColorMode::Seeded(5), person_color),
    )
}

#[test]
fn low_confidence_dog_is_not_drawn_at_half_threshold() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_image(&dir, "dog.png", 320, 240)?;
    let mut context = context(StubScript::Fixed(vec![dog(0.40)]), Rgb([0, 255, 0]))?;

    let outcome = process_image_file(&mut context, &path, percent_to_cutoff(50))?;

    assert!(outcome.rendered.is_empty());
    assert!(outcome.image.pixels().all(|pixel| *pixel == GRAY));
    assert_eq!(context.colors.peek("dog"), None);
    Ok(())
}

#[test]
fn confident_dog_is_drawn_in_its_color() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_image(&dir, "dog.png", 320, 240)?;
    let mut context = context(StubScript::Fixed(vec![dog(0.60)]), Rgb([0, 255, 0]))?;

    let outcome = process_image_file(&mut context, &path, percent_to_cutoff(50))?;

    assert_eq!(outcome.rendered.len(), 1);
    let dog_color = context.colors.peek("dog").expect("dog color assigned");
    assert_eq!(outcome.rendered[0].color, dog_color);
    assert_eq!(*outcome.image.get_pixel(100, 180), dog_color);
    assert_eq!(outcome.image.dimensions(), (320, 240));
    Ok(())
}

#[test]
fn person_uses_the_override_color() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_image(&dir, "person.png", 320, 240)?;
    let mut context = context(StubScript::Fixed(vec![person(0.9)]), Rgb([0, 255, 0]))?;
    context.colors.set_person_color(Rgb([255, 0, 0]));

    let outcome = process_image_file(&mut context, &path, percent_to_cutoff(50))?;

    assert_eq!(outcome.rendered.len(), 1);
    assert_eq!(outcome.rendered[0].color, Rgb([255, 0, 0]));
    assert_eq!(*outcome.image.get_pixel(21, 150), Rgb([255, 0, 0]));
    Ok(())
}

#[test]
fn class_colors_stay_fixed_across_images() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_image(&dir, "scene.png", 320, 240)?;
    let mut context = context(
        StubScript::Sequence(vec![vec![dog(0.9), person(0.9)], vec![person(0.8), dog(0.7)]]),
        Rgb([0, 255, 0]),
    )?;

    let first = process_image_file(&mut context, &path, 0.0)?;
    let second = process_image_file(&mut context, &path, 0.0)?;

    let color_of = |rendered: &[live_detect::RenderedBox], label: &str| {
        rendered
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.color)
    };
    assert_eq!(color_of(&first.rendered, "dog"), color_of(&second.rendered, "dog"));
    assert_eq!(color_of(&first.rendered, "person"), Some(Rgb([0, 255, 0])));
    assert_eq!(color_of(&second.rendered, "person"), Some(Rgb([0, 255, 0])));
    Ok(())
}

#[test]
fn every_rendered_box_meets_the_cutoff() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_image(&dir, "demo.png", 640, 480)?;
    let mut context = context(StubScript::Demo, Rgb([0, 255, 0]))?;

    for percent in [0u8, 30, 50, 64, 65, 87, 88, 100] {
        let cutoff = percent_to_cutoff(percent);
        let outcome = process_image_file(&mut context, &path, cutoff)?;
        assert!(outcome.rendered.iter().all(|r| r.confidence >= cutoff));
    }
    Ok(())
}

#[test]
fn model_failure_surfaces_as_error() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_image(&dir, "broken.png", 64, 64)?;
    let mut context = context(StubScript::Fail("out of memory".to_string()), Rgb([0, 255, 0]))?;

    let err = process_image_file(&mut context, &path, 0.5).expect_err("model failure");
    assert!(format!("{:#}", err).contains("out of memory"));
    Ok(())
}

#[test]
fn missing_file_is_an_error() -> Result<()> {
    let dir = TempDir::new()?;
    let mut context = context(StubScript::Demo, Rgb([0, 255, 0]))?;
    assert!(process_image_file(&mut context, &dir.path().join("absent.png"), 0.5).is_err());
    Ok(())
}

#[test]
fn annotated_result_saves_and_fits_display_bounds() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_image(&dir, "large.png", 1600, 900)?;
    let mut context = context(StubScript::Demo, Rgb([0, 255, 0]))?;

    let outcome = process_image_file(&mut context, &path, 0.5)?;
    assert_eq!(outcome.image.dimensions(), (1600, 900));
    assert_eq!(fit_within(1600, 900, 800, 800), (800, 450));

    let written = save_image(&outcome.image, &dir.path().join("out.jpg"))?;
    let reloaded = image::open(&written)?;
    assert_eq!((reloaded.width(), reloaded.height()), (1600, 900));
    Ok(())
}
