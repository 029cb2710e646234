//! Compass reading from rendered frames

mod common;

use approx::assert_relative_eq;
use common::{init_logging, CompassScene};
use helm::config::{CenterMode, CompassConfig};
use helm::sensor::{CompassReader, OffsetSensor};
use image::RgbImage;
use shared::instrument::mock::{FixedLocator, MockFrameSource};
use shared::instrument::{ColorRingLocator, Region};
use std::sync::Arc;

fn reader_for(frame: RgbImage, mode: CenterMode) -> (CompassReader, Arc<MockFrameSource>) {
    let frames = Arc::new(MockFrameSource::new().with_repeating(Region::Compass, frame));
    let config = CompassConfig {
        center_mode: mode,
        ..CompassConfig::default()
    };
    let reader = CompassReader::new(
        frames.clone(),
        Arc::new(FixedLocator::whole_frame()),
        config,
    );
    (reader, frames)
}

#[test]
fn test_front_marker_sign_conventions() {
    init_logging();

    let frame = CompassScene::centred(128).with_marker(0.5, 0.0).render();
    let (mut reader, _) = reader_for(frame, CenterMode::Geometric);
    let right = reader.read().unwrap().unwrap();
    assert!(!right.is_behind());
    assert!(right.yaw > 20.0, "yaw {}", right.yaw);
    assert!(right.pitch.abs() < 1.0);
    assert_relative_eq!(right.roll, 90.0, epsilon = 1.0);

    let frame = CompassScene::centred(128).with_marker(0.0, 0.5).render();
    let (mut reader, _) = reader_for(frame, CenterMode::Geometric);
    let up = reader.read().unwrap().unwrap();
    assert!(up.pitch > 20.0, "pitch {}", up.pitch);
    assert!(up.yaw.abs() < 1.0);

    let frame = CompassScene::centred(128).with_marker(-0.4, -0.4).render();
    let (mut reader, _) = reader_for(frame, CenterMode::Geometric);
    let low_left = reader.read().unwrap().unwrap();
    assert!(low_left.pitch < 0.0 && low_left.yaw < 0.0);
    assert_relative_eq!(low_left.roll, -135.0, epsilon = 1.0);
}

#[test]
fn test_behind_iff_marker_missing() {
    for seed in 0..4u64 {
        for mode in [CenterMode::Geometric, CenterMode::Voting] {
            let mut scene = CompassScene::centred(128);
            scene.noise_seed = Some(seed);

            let (mut reader, _) = reader_for(scene.render(), mode);
            let reading = reader.read().unwrap().unwrap();
            assert!(reading.is_behind(), "seed {seed} {mode:?}");

            let (mut reader, _) = reader_for(scene.with_marker(0.3, -0.2).render(), mode);
            let reading = reader.read().unwrap().unwrap();
            assert!(!reading.is_behind(), "seed {seed} {mode:?}");
        }
    }
}

#[test]
fn test_behind_decided_before_voting() {
    let (mut reader, frames) = reader_for(CompassScene::centred(128).render(), CenterMode::Voting);
    assert!(reader.read().unwrap().unwrap().is_behind());
    assert_eq!(frames.captures(Region::Compass), 1);
}

#[test]
fn test_unlocated_compass_reads_none() {
    let frames = Arc::new(
        MockFrameSource::new().with_repeating(Region::Compass, RgbImage::new(128, 128)),
    );
    let mut reader = CompassReader::new(
        frames,
        Arc::new(ColorRingLocator::default()),
        CompassConfig::default(),
    );
    assert_eq!(reader.read().unwrap(), None);
}

#[test]
fn test_reading_monotonic_in_marker_position() {
    let mut previous_yaw = f64::NEG_INFINITY;
    let mut previous_pitch = f64::NEG_INFINITY;
    for step in -3..=3 {
        let v = step as f64 * 0.2;

        let frame = CompassScene::centred(128).with_marker(v, 0.0).render();
        let (mut reader, _) = reader_for(frame, CenterMode::Geometric);
        let yaw = reader.read().unwrap().unwrap().yaw;
        assert!(yaw > previous_yaw, "yaw {yaw} at x={v}");
        previous_yaw = yaw;

        let frame = CompassScene::centred(128).with_marker(0.0, v).render();
        let (mut reader, _) = reader_for(frame, CenterMode::Geometric);
        let pitch = reader.read().unwrap().unwrap().pitch;
        assert!(pitch > previous_pitch, "pitch {pitch} at y={v}");
        previous_pitch = pitch;
    }
}

#[test]
fn test_voting_recovers_offset_ring_centre() {
    init_logging();

    // Ring sits four pixels right of the crop centre
    let mut scene = CompassScene::centred(128);
    scene.ring_centre = (67.5, 63.5);
    scene.ring_radius = 56.0;
    let frame = scene.with_marker(0.25, 0.0).render();

    let (mut voting, frames) = reader_for(frame.clone(), CenterMode::Voting);
    let voted = voting.read().unwrap().unwrap();
    assert_eq!(frames.captures(Region::Compass), 5);
    assert_relative_eq!(voted.raw_x, 0.25, epsilon = 0.01);
    assert_relative_eq!(voted.raw_y, 0.0, epsilon = 0.01);

    let (mut geometric, _) = reader_for(frame, CenterMode::Geometric);
    let naive = geometric.read().unwrap().unwrap();
    assert_relative_eq!(naive.raw_x, 18.0 / 64.0, epsilon = 0.01);
}

#[test]
fn test_voting_falls_back_when_ring_too_small() {
    // A ring far smaller than the crop fails the radius check in every sample
    let mut scene = CompassScene::centred(128);
    scene.ring_radius = 30.0;
    let frame = scene.with_marker(0.5, 0.0).render();

    let (mut voting, _) = reader_for(frame.clone(), CenterMode::Voting);
    let (mut geometric, _) = reader_for(frame, CenterMode::Geometric);
    let voted = voting.read().unwrap().unwrap();
    let naive = geometric.read().unwrap().unwrap();
    assert_relative_eq!(voted.raw_x, naive.raw_x, epsilon = 1e-9);
}

#[test]
fn test_located_by_ring_colour() {
    let frame = CompassScene::centred(128).with_marker(0.5, 0.0).render();
    let frames = Arc::new(MockFrameSource::new().with_repeating(Region::Compass, frame));
    let mut reader = CompassReader::new(
        frames,
        Arc::new(ColorRingLocator::default()),
        CompassConfig::default(),
    );

    let reading = reader.read().unwrap().unwrap();
    assert!(reading.raw_x > 0.45 && reading.raw_x < 0.52, "x {}", reading.raw_x);
    assert!(reading.raw_y.abs() < 0.02);
}

#[test]
fn test_bias_is_subtracted() {
    let frame = CompassScene::centred(128).with_marker(0.5, 0.0).render();
    let (mut reader, _) = reader_for(frame, CenterMode::Geometric);
    let before = reader.read().unwrap().unwrap();

    reader.adjust_bias(0.1, -0.05);
    let after = reader.read().unwrap().unwrap();
    assert_relative_eq!(after.raw_x, before.raw_x - 0.1, epsilon = 1e-9);
    assert_relative_eq!(after.raw_y, before.raw_y + 0.05, epsilon = 1e-9);
    assert_eq!(reader.bias(), (0.1, -0.05));
}
