use std::ops::ControlFlow;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Result;
use image::Rgb;

use live_detect::annotate::ColorMode;
use live_detect::detect::{BoundingBox, Detection, StubBackend, StubScript};
use live_detect::pipeline::{
    run_camera_session, CameraWorker, DetectionContext, LiveSettings, WorkerControl, WorkerEvent,
};
use live_detect::session::SessionCommand;
use live_detect::shell::{Mode, ShellModel};
use live_detect::{CameraConfig, CameraSource, CaptureError, ColorPolicy, FrameSource};

fn camera(device: &str) -> Result<CameraSource> {
    CameraSource::new(CameraConfig {
        device: device.to_string(),
        width: 160,
        height: 120,
        target_fps: 0,
    })
}

fn person_context() -> Result<DetectionContext> {
    DetectionContext::new(
        Box::new(StubBackend::new(StubScript::Fixed(vec![Detection::new(
            "person",
            0,
            0.9,
            BoundingBox::new(10.0, 30.0, 60.0, 110.0),
        )]))),
        ColorPolicy::new(ColorMode::Seeded(1), Rgb([0, 255, 0])),
    )
}

fn wait_for_finish(worker: &CameraWorker) -> Vec<WorkerEvent> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut events = Vec::new();
    while Instant::now() < deadline {
        if let Some(event) = worker.recv_timeout(Duration::from_millis(50)) {
            let finished = matches!(event, WorkerEvent::Finished);
            events.push(event);
            if finished {
                break;
            }
        }
    }
    events
}

#[test]
fn unavailable_camera_leaves_shell_idle() -> Result<()> {
    let mut model = ShellModel::new(50, Rgb([0, 255, 0]));
    assert!(model.request_camera());

    let mut context = person_context()?;
    let mut source = camera("/dev/video-does-not-exist")?;
    let (_control_tx, control_rx) = mpsc::channel();
    let mut frames = 0;
    let mut sink = |event: WorkerEvent| {
        if matches!(event, WorkerEvent::Frame(_)) {
            frames += 1;
        }
        ControlFlow::Continue(())
    };

    let err = run_camera_session(
        &mut context,
        &mut source,
        &LiveSettings::default(),
        &control_rx,
        &mut sink,
    )
    .expect_err("missing device must not start a session");
    assert!(CaptureError::is_device_unavailable(&err));
    assert_eq!(frames, 0);
    assert!(!source.is_healthy());

    model.camera_failed(&err);
    assert_eq!(model.mode(), Mode::Idle);
    assert!(model.can_start_work());
    Ok(())
}

#[test]
fn read_failure_ends_session_with_summary() -> Result<()> {
    let mut context = person_context()?;
    let mut source = camera("stub://flaky?fail_after=4")?;
    let (_control_tx, control_rx) = mpsc::channel();
    let mut sink = |_event: WorkerEvent| ControlFlow::Continue(());

    let report = run_camera_session(
        &mut context,
        &mut source,
        &LiveSettings::default(),
        &control_rx,
        &mut sink,
    )?;

    let err = report.error.expect("read failure recorded");
    assert!(matches!(
        CaptureError::find(&err),
        Some(CaptureError::FrameRead { .. })
    ));
    assert_eq!(report.summary.frames, 4);
    assert_eq!(report.summary.total_detections, 4);
    assert_eq!(report.summary.class_counts.get("person"), Some(&4));
    assert!(!source.is_healthy());
    Ok(())
}

#[test]
fn threshold_and_color_updates_apply_mid_session() -> Result<()> {
    let mut context = person_context()?;
    let mut source = camera("stub://controls")?;
    let (control_tx, control_rx) = mpsc::channel();

    let mut colors = Vec::new();
    let mut sink = |event: WorkerEvent| {
        if let WorkerEvent::Frame(frame) = event {
            colors.push(frame.rendered.first().map(|r| r.color));
            match colors.len() {
                1 => {
                    control_tx
                        .send(WorkerControl::SetPersonColor(Rgb([255, 0, 0])))
                        .ok();
                }
                2 => {
                    control_tx.send(WorkerControl::SetThreshold(95)).ok();
                }
                3 => return ControlFlow::Break(()),
                _ => {}
            }
        }
        ControlFlow::Continue(())
    };

    run_camera_session(
        &mut context,
        &mut source,
        &LiveSettings::default(),
        &control_rx,
        &mut sink,
    )?;

    assert_eq!(
        colors,
        vec![Some(Rgb([0, 255, 0])), Some(Rgb([255, 0, 0])), None]
    );
    Ok(())
}

#[test]
fn frames_are_scaled_to_display_bounds() -> Result<()> {
    let mut context = person_context()?;
    let mut source = CameraSource::new(CameraConfig {
        device: "stub://wide".to_string(),
        width: 1280,
        height: 720,
        target_fps: 0,
    })?;
    let (_control_tx, control_rx) = mpsc::channel();
    let mut dimensions = None;
    let mut sink = |event: WorkerEvent| {
        if let WorkerEvent::Frame(frame) = event {
            dimensions = Some(frame.image.dimensions());
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    };

    run_camera_session(
        &mut context,
        &mut source,
        &LiveSettings::default(),
        &control_rx,
        &mut sink,
    )?;
    assert_eq!(dimensions, Some((800, 450)));
    Ok(())
}

#[test]
fn worker_pauses_and_stops_on_command() -> Result<()> {
    let worker = CameraWorker::spawn(
        person_context()?,
        Box::new(camera("stub://worker")?),
        LiveSettings::default(),
    )?;

    let started = worker.recv_timeout(Duration::from_secs(5));
    assert!(matches!(started, Some(WorkerEvent::Started { .. })));

    assert!(worker.send(WorkerControl::Command(SessionCommand::TogglePause)));
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut paused = false;
    while Instant::now() < deadline && !paused {
        if let Some(WorkerEvent::Paused(true)) = worker.recv_timeout(Duration::from_millis(50)) {
            paused = true;
        }
    }
    assert!(paused);

    worker.send(WorkerControl::Command(SessionCommand::Exit));
    let events = wait_for_finish(&worker);
    assert!(matches!(events.last(), Some(WorkerEvent::Finished)));

    let outcome = worker.join()?;
    let report = outcome.result?;
    assert!(report.error.is_none());
    assert_eq!(outcome.context.colors.person_color(), Rgb([0, 255, 0]));
    Ok(())
}

#[test]
fn paused_worker_stops_inferring_until_resumed() -> Result<()> {
    let backend = StubBackend::new(StubScript::Fixed(Vec::new()));
    let calls = backend.call_counter();
    let context = DetectionContext::new(
        Box::new(backend),
        ColorPolicy::new(ColorMode::Seeded(1), Rgb([0, 255, 0])),
    )?;
    let worker = CameraWorker::spawn(
        context,
        Box::new(camera("stub://paused")?),
        LiveSettings::default(),
    )?;
    assert!(matches!(
        worker.recv_timeout(Duration::from_secs(5)),
        Some(WorkerEvent::Started { .. })
    ));

    assert!(worker.send(WorkerControl::Command(SessionCommand::TogglePause)));
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut paused = false;
    while Instant::now() < deadline && !paused {
        if let Some(WorkerEvent::Paused(true)) = worker.recv_timeout(Duration::from_millis(50)) {
            paused = true;
        }
    }
    assert!(paused);

    let calls_at_pause = calls.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(200));
    let while_paused = worker.poll();
    assert!(while_paused
        .iter()
        .all(|event| !matches!(event, WorkerEvent::Frame(_))));
    assert_eq!(calls.load(Ordering::SeqCst), calls_at_pause);

    assert!(worker.send(WorkerControl::Command(SessionCommand::TogglePause)));
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut resumed_frame = false;
    while Instant::now() < deadline && !resumed_frame {
        if let Some(WorkerEvent::Frame(_)) = worker.recv_timeout(Duration::from_millis(50)) {
            resumed_frame = true;
        }
    }
    assert!(resumed_frame);
    assert!(calls.load(Ordering::SeqCst) > calls_at_pause);

    worker.stop();
    wait_for_finish(&worker);
    worker.join()?;
    Ok(())
}

#[test]
fn dropping_the_worker_releases_the_camera() -> Result<()> {
    let worker = CameraWorker::spawn(
        person_context()?,
        Box::new(camera("stub://dropped")?),
        LiveSettings::default(),
    )?;
    assert!(matches!(
        worker.recv_timeout(Duration::from_secs(5)),
        Some(WorkerEvent::Started { .. })
    ));
    drop(worker);
    Ok(())
}

#[test]
fn worker_reports_unavailable_device_through_join() -> Result<()> {
    let worker = CameraWorker::spawn(
        person_context()?,
        Box::new(camera("stub://gone?unavailable")?),
        LiveSettings::default(),
    )?;
    let events = wait_for_finish(&worker);
    assert!(events
        .iter()
        .all(|event| !matches!(event, WorkerEvent::Frame(_) | WorkerEvent::Started { .. })));

    let outcome = worker.join()?;
    let err = outcome.result.expect_err("device unavailable");
    assert!(CaptureError::is_device_unavailable(&err));
    Ok(())
}
