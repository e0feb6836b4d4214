//! Integration tests for the filter chain
//!
//! Exercises pixelation persistence, blur pass-through and stage ordering
//! through the public `FilterChain` API.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use camfilter::config::PipelineConfig;
use camfilter::core::{BufferPool, Frame, PipelineStats, PixelFormat};
use camfilter::processing::{FaceBox, FaceDetector, FilterChain, SegmentationMask, Segmenter};
use camfilter::{CaptureError, CaptureResult, FilterSettings};
use common::{ScriptedDetector, UniformSegmenter};

const FACE: FaceBox = FaceBox::new(8.0, 8.0, 16.0, 16.0);
const PIXELATE: FilterSettings = FilterSettings { pixelate_faces: true, blur_background: false };
const BLUR: FilterSettings = FilterSettings { pixelate_faces: false, blur_background: true };
const BOTH: FilterSettings = FilterSettings { pixelate_faces: true, blur_background: true };

fn checker_frame(w: u32, h: u32) -> Frame {
    let mut data = vec![0u8; (w * h * 4) as usize];
    for (i, px) in data.chunks_exact_mut(4).enumerate() {
        let (x, y) = (i as u32 % w, i as u32 / w);
        let v = if (x + y) % 2 == 0 { 240 } else { 16 };
        px.copy_from_slice(&[v, v, v, 255]);
    }
    Frame::new(data, w, h, PixelFormat::Rgba).expect("valid frame")
}

fn build_chain(
    detector: Option<Box<dyn FaceDetector>>,
    segmenter: Option<Box<dyn Segmenter>>,
) -> (FilterChain, Arc<PipelineStats>) {
    let stats = Arc::new(PipelineStats::new());
    let chain = FilterChain::new(
        &PipelineConfig::default(),
        detector,
        segmenter,
        Arc::new(BufferPool::new(4)),
        Arc::clone(&stats),
    );
    (chain, stats)
}

#[test]
fn test_face_persists_for_one_missed_frame() {
    let (detector, calls) = ScriptedDetector::new(vec![Ok(vec![FACE]), Ok(vec![]), Ok(vec![])]);
    let (mut chain, _stats) = build_chain(Some(Box::new(detector)), None);
    chain.set_settings(PIXELATE);

    let input = checker_frame(32, 32);
    let hit = chain.process(input.clone());
    let carried = chain.process(input.clone());
    let cleared = chain.process(input.clone());

    assert!(hit.filtered);
    assert!(carried.filtered);
    assert_eq!(hit.frame.data(), carried.frame.data());
    assert!(!cleared.filtered);
    assert!(cleared.frame.shares_buffer(&input));
    assert!(!chain.remembers_faces());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_detector_failures_degrade_to_unfiltered() {
    let (detector, _calls) = ScriptedDetector::new(vec![
        Err(CaptureError::detector("faces", "model not loaded")),
        Err(CaptureError::detector("faces", "model not loaded")),
    ]);
    let (mut chain, stats) = build_chain(Some(Box::new(detector)), None);
    chain.set_settings(PIXELATE);

    let input = checker_frame(16, 16);
    for _ in 0..2 {
        let out = chain.process(input.clone());
        assert!(!out.filtered);
        assert_eq!(out.frame.data(), input.data());
    }
    assert_eq!(stats.snapshot().detector_failures, 2);
}

#[test]
fn test_pixelation_masks_face_and_keeps_background() {
    let detector = ScriptedDetector::fixed(FACE);
    let (mut chain, _stats) = build_chain(Some(Box::new(detector)), None);
    chain.set_settings(PIXELATE);

    let input = checker_frame(48, 48);
    let out = chain.process(input.clone()).frame;

    let centre = (16 * 48 + 16) * 4;
    assert_ne!(out.data()[centre], input.data()[centre]);
    let corner = (47 * 48 + 47) * 4;
    assert_eq!(out.data()[corner..corner + 4], input.data()[corner..corner + 4]);
    assert_eq!(out.sequence, input.sequence);
    assert_eq!(out.captured_at, input.captured_at);
}

#[test]
fn test_blur_without_segmenter_is_exact_pass_through() {
    let (mut chain, _stats) = build_chain(None, None);
    chain.set_settings(BLUR);

    let input = checker_frame(24, 12);
    let expected = input.data().to_vec();
    let out = chain.process(input.clone());

    assert!(!out.filtered);
    assert!(out.frame.shares_buffer(&input));
    assert_eq!(out.frame.data(), &expected[..]);
}

#[test]
fn test_blur_keeps_foreground_and_softens_background() {
    let input = checker_frame(24, 12);

    let (foreground, _) = UniformSegmenter::new(1.0);
    let (mut chain, _stats) = build_chain(None, Some(Box::new(foreground)));
    chain.set_settings(BLUR);
    let kept = chain.process(input.clone());
    assert_eq!(kept.frame.data(), input.data());

    let (background, calls) = UniformSegmenter::new(0.0);
    let (mut chain, _stats) = build_chain(None, Some(Box::new(background)));
    chain.set_settings(BLUR);
    let blurred = chain.process(input.clone());
    assert!(blurred.filtered);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A checkerboard blurred with a wide kernel moves towards mid grey.
    let centre = (6 * 24 + 12) * 4;
    let v = blurred.frame.data()[centre];
    assert!((60..=200).contains(&v), "centre value {}", v);
}

#[test]
fn test_disabling_blur_restores_pass_through() {
    let (segmenter, calls) = UniformSegmenter::new(0.0);
    let (mut chain, _stats) = build_chain(None, Some(Box::new(segmenter)));
    let input = checker_frame(16, 16);

    chain.set_settings(BLUR);
    assert!(chain.process(input.clone()).filtered);
    chain.set_settings(FilterSettings::NONE);
    let out = chain.process(input.clone());
    assert!(!out.filtered);
    assert!(out.frame.shares_buffer(&input));

    chain.set_settings(BLUR);
    assert!(chain.process(input.clone()).filtered);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Records the pixel at one index of each frame it segments.
struct ProbeSegmenter {
    index: usize,
    seen: Arc<Mutex<Vec<u8>>>,
}

impl Segmenter for ProbeSegmenter {
    fn segment(&mut self, frame: &Frame) -> CaptureResult<SegmentationMask> {
        self.seen.lock().expect("probe lock").push(frame.data()[self.index]);
        Ok(SegmentationMask { width: 1, height: 1, confidence: vec![1.0] })
    }
}

#[test]
fn test_pixelation_runs_before_blur() {
    let centre = (16 * 48 + 16) * 4;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let segmenter = ProbeSegmenter { index: centre, seen: Arc::clone(&seen) };
    let (mut chain, _stats) = build_chain(
        Some(Box::new(ScriptedDetector::fixed(FACE))),
        Some(Box::new(segmenter)),
    );
    chain.set_settings(BOTH);

    let input = checker_frame(48, 48);
    let out = chain.process(input.clone());
    assert!(out.filtered);

    let seen = seen.lock().expect("probe lock");
    assert_eq!(seen.len(), 1);
    // The segmenter saw the pixelated face, not the raw checkerboard.
    assert_ne!(seen[0], input.data()[centre]);
    assert_eq!(out.frame.data()[centre], seen[0]);
}

#[test]
fn test_nv21_frames_pass_through_both_filters() {
    let (segmenter, seg_calls) = UniformSegmenter::new(0.0);
    let (mut chain, _stats) = build_chain(
        Some(Box::new(ScriptedDetector::fixed(FACE))),
        Some(Box::new(segmenter)),
    );
    chain.set_settings(BOTH);

    let len = PixelFormat::Nv21.frame_len(32, 16);
    let input = Frame::new(vec![77; len], 32, 16, PixelFormat::Nv21).expect("valid frame");
    let out = chain.process(input.clone());

    assert!(!out.filtered);
    assert!(out.frame.shares_buffer(&input));
    assert_eq!(seg_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_switching_cameras_forgets_faces() {
    let (detector, _calls) = ScriptedDetector::new(vec![Ok(vec![FACE])]);
    let (mut chain, _stats) = build_chain(Some(Box::new(detector)), None);
    chain.set_settings(PIXELATE);

    let input = checker_frame(32, 32);
    assert!(chain.process(input.clone()).filtered);
    assert!(chain.remembers_faces());

    chain.reset_state();
    // The next miss has nothing to carry over.
    assert!(!chain.process(input).filtered);
}
