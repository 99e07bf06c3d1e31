//! File pipeline integration tests
//!
//! Real WAV files through FileChunkTransport, SymphoniaChunkDecoder and the
//! software mixer. Chunks are sized to hold a whole file since WAV slices do
//! not decode on their own.

mod helpers;

use std::sync::Arc;

use helpers::audio_generator::{generate_constant_wav, generate_sine_wav};
use helpers::scripted::frame_ticks;
use helpers::RATE;
use tapeplay_ap::audio::{probe_duration, MixerSink, SymphoniaChunkDecoder};
use tapeplay_ap::config::EngineConfig;
use tapeplay_ap::playback::{EventStatus, LoadOutcome, PlaybackScheduler, Track};
use tapeplay_ap::transport::FileChunkTransport;
use tapeplay_ap::Error;
use tempfile::TempDir;

const WHOLE_FILE: usize = 1024 * 1024;

fn scheduler(sink: Arc<MixerSink>, capacity: usize) -> PlaybackScheduler {
    let decoder = SymphoniaChunkDecoder::with_extension_hint("wav").resample_to(sink.sample_rate());
    scheduler_with_decoder(sink, capacity, decoder)
}

fn scheduler_with_decoder(
    sink: Arc<MixerSink>,
    capacity: usize,
    decoder: SymphoniaChunkDecoder,
) -> PlaybackScheduler {
    let config = EngineConfig {
        lookahead_capacity: capacity,
        ..EngineConfig::default()
    };
    PlaybackScheduler::new(
        &config,
        sink,
        Arc::new(FileChunkTransport::new(WHOLE_FILE)),
        Arc::new(decoder),
    )
}

fn wav_track(dir: &TempDir, name: &str, frames: usize, value: i16) -> Track {
    let path = dir.path().join(name);
    generate_constant_wav(&path, frames, RATE, 1, value).unwrap();

    let duration = probe_duration(&path).unwrap();
    assert_eq!(duration, frame_ticks(frames));
    Track::new(path.to_string_lossy(), duration)
}

async fn drain(scheduler: &mut PlaybackScheduler) {
    while scheduler.next_notification().await.is_some() {}
}

#[tokio::test]
async fn test_wav_file_plays_through_mixer() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(MixerSink::new(RATE, 1));
    let mut scheduler = scheduler(sink.clone(), 2);

    // 8192 / 32768
    let track = wav_track(&dir, "quarter.wav", 800, 8192);
    let ticket = scheduler.queue_track(track).unwrap();
    drain(&mut scheduler).await;

    let event = ticket.wait().await.into_result().unwrap();
    assert_eq!(event.status, EventStatus::Complete);
    assert_eq!(event.segments.len(), 1);
    assert_eq!(event.loaded_ticks(), frame_ticks(800));

    let mut out = vec![0.0; 820];
    sink.render(&mut out);
    assert!(out[..800].iter().all(|s| (s - 0.25).abs() < 1e-4));
    assert!(out[800..].iter().all(|s| *s == 0.0));

    assert!(scheduler.advance_if_finished());
    assert!(scheduler.current_event().is_none());
}

#[tokio::test]
async fn test_consecutive_files_are_gapless() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(MixerSink::new(RATE, 1));
    let mut scheduler = scheduler(sink.clone(), 2);

    let first = wav_track(&dir, "first.wav", 400, 8192);
    let second = wav_track(&dir, "second.wav", 400, -8192);

    let ticket_a = scheduler.queue_track(first).unwrap();
    let ticket_b = scheduler.queue_track(second).unwrap();
    drain(&mut scheduler).await;

    let a = ticket_a.wait().await.into_result().unwrap();
    let b = ticket_b.wait().await.into_result().unwrap();
    assert_eq!(
        b.segments[0].scheduled_start_ticks,
        a.segments[0].end_ticks()
    );

    let mut out = vec![0.0; 800];
    sink.render(&mut out);
    assert!((out[399] - 0.25).abs() < 1e-4);
    assert!((out[400] + 0.25).abs() < 1e-4);
}

#[tokio::test]
async fn test_stereo_file_into_stereo_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    generate_sine_wav(&path, 100, RATE, 440.0, 0.5).unwrap();

    let sink = Arc::new(MixerSink::new(RATE, 2));
    let mut scheduler = scheduler(sink.clone(), 2);

    let duration = probe_duration(&path).unwrap();
    let ticket = scheduler
        .queue_track(Track::new(path.to_string_lossy(), duration))
        .unwrap();
    drain(&mut scheduler).await;

    let event = ticket.wait().await.into_result().unwrap();
    assert_eq!(event.loaded_ticks(), duration);

    let mut out = vec![0.0; 1600];
    sink.render(&mut out);
    assert!(out.iter().any(|s| s.abs() > 0.1));
    for frame in out.chunks(2) {
        assert_eq!(frame[0], frame[1]);
    }
}

#[tokio::test]
async fn test_file_at_other_rate_is_resampled_to_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wide.wav");
    generate_constant_wav(&path, 1600, 16000, 1, 8192).unwrap();

    let sink = Arc::new(MixerSink::new(RATE, 1));
    let mut scheduler = scheduler(sink.clone(), 2);

    let duration = probe_duration(&path).unwrap();
    let ticket = scheduler
        .queue_track(Track::new(path.to_string_lossy(), duration))
        .unwrap();
    drain(&mut scheduler).await;

    let event = ticket.wait().await.into_result().unwrap();
    let audio = &event.segments[0].audio;
    assert_eq!(audio.sample_rate, RATE);
    assert!((790..=810).contains(&audio.frame_count()));
    assert_eq!(event.loaded_ticks(), audio.duration_ticks());

    let mut out = vec![0.0; 800];
    sink.render(&mut out);
    assert!((out[400] - 0.25).abs() < 0.01);
}

#[tokio::test]
async fn test_unconverted_rate_fails_without_audio() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wide.wav");
    generate_constant_wav(&path, 1600, 16000, 1, 8192).unwrap();

    let sink = Arc::new(MixerSink::new(RATE, 1));
    let decoder = SymphoniaChunkDecoder::with_extension_hint("wav");
    let mut scheduler = scheduler_with_decoder(sink.clone(), 2, decoder);

    let ticket = scheduler
        .queue_track(Track::new(path.to_string_lossy(), probe_duration(&path).unwrap()))
        .unwrap();
    drain(&mut scheduler).await;

    assert!(matches!(
        ticket.wait().await,
        LoadOutcome::Failed(Error::AudioOutput(_))
    ));
    assert_eq!(sink.connected_sources(), 0);
}

#[tokio::test]
async fn test_missing_file_fails_load() {
    let sink = Arc::new(MixerSink::new(RATE, 1));
    let mut scheduler = scheduler(sink.clone(), 2);

    let ticket = scheduler
        .queue_track(Track::new("/nonexistent/track.wav", frame_ticks(100)))
        .unwrap();
    drain(&mut scheduler).await;

    match ticket.wait().await {
        LoadOutcome::Failed(Error::TransportFailure(_)) => {}
        other => panic!("expected transport failure, got {:?}", other),
    }
    assert_eq!(sink.connected_sources(), 0);
}
