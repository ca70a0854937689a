#![cfg(unix)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use rotaslice_backend::{Backend, BackendHandle, MemorySink, StaticScene};
use rotaslice_core::event_bus::{BackendEvent, ErrorEvent, SliceEvent};
use rotaslice_core::{AppEvent, BackendState, EventBus, ResultCode, StageKind};

const LIMIT: Duration = Duration::from_secs(20);

struct Fixture {
    _dir: tempfile::TempDir,
    scene: Arc<StaticScene>,
    sink: Arc<MemorySink>,
    events: Arc<Mutex<Vec<AppEvent>>>,
    handle: BackendHandle,
}

fn start(scene: Arc<StaticScene>, delay_secs: u32) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = support::config(dir.path(), delay_secs);
    let sink = Arc::new(MemorySink::new());
    let bus = Arc::new(EventBus::new());
    let events = support::record(&bus);
    let handle = Backend::new(config, scene.clone(), sink.clone())
        .with_event_bus(bus)
        .spawn();
    Fixture {
        _dir: dir,
        scene,
        sink,
        events,
        handle,
    }
}

async fn wait_state(handle: &BackendHandle, state: BackendState) {
    tokio::time::timeout(LIMIT, handle.wait_for_state(|s| s == state))
        .await
        .expect("state reached in time")
        .expect("controller running");
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(LIMIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

fn transitions(events: &[AppEvent]) -> Vec<(BackendState, BackendState)> {
    events
        .iter()
        .filter_map(|event| match event {
            AppEvent::Backend(BackendEvent::StateChanged { from, to }) => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_plates_finish_in_queue_order() {
    let f = start(support::scene(&[0, 1]), 0);
    f.handle.request_slice(0).expect("send");
    f.handle.request_slice(1).expect("send");

    tokio::time::timeout(LIMIT, f.sink.wait_for(2))
        .await
        .expect("both plates sliced");
    wait_state(&f.handle, BackendState::Done).await;
    assert_eq!(f.sink.published_plates(), vec![0, 1]);

    let events = f.events.lock().clone();
    let ready_0 = events
        .iter()
        .position(|e| matches!(e, AppEvent::Slice(SliceEvent::OutputReady { plate: 0, .. })))
        .expect("plate 0 output");
    let start_1 = events
        .iter()
        .position(|e| {
            matches!(
                e,
                AppEvent::Slice(SliceEvent::StageStarted {
                    plate: 1,
                    stage: StageKind::Prepare
                })
            )
        })
        .expect("plate 1 started");
    assert!(ready_0 < start_1);
    assert!(transitions(&events).contains(&(BackendState::Done, BackendState::Processing)));

    f.handle.shutdown().await;
}

#[tokio::test]
async fn test_change_notifications_are_debounced() {
    let f = start(support::scene(&[0]), 0);
    for _ in 0..5 {
        f.handle.notify_change(0, false).expect("send");
    }

    wait_state(&f.handle, BackendState::Done).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(f.sink.len(), 1);

    f.handle.shutdown().await;
}

#[tokio::test]
async fn test_empty_plate_returns_quietly() {
    let f = start(support::scene(&[]), 0);
    f.handle.request_slice(0).expect("send");

    let events = Arc::clone(&f.events);
    wait_until(move || {
        transitions(&events.lock()).contains(&(BackendState::Processing, BackendState::NotStarted))
    })
    .await;
    assert!(!f
        .events
        .lock()
        .iter()
        .any(|e| matches!(e, AppEvent::Error(_))));
    assert!(f.sink.is_empty());

    f.handle.shutdown().await;
}

#[tokio::test]
async fn test_failure_with_content_is_reported() {
    let scene = Arc::new(StaticScene::new());
    scene.add_object(
        0,
        rotaslice_backend::ObjectSnapshot::cuboid("tool-3", 3, [-5.0, -5.0, 0.0], [5.0, 5.0, 1.0]),
    );
    let f = start(scene, 0);
    f.handle.request_slice(0).expect("send");

    wait_state(&f.handle, BackendState::Error).await;
    let failure = f.events.lock().iter().find_map(|e| match e {
        AppEvent::Error(ErrorEvent::SliceFailed {
            plate, code, message, ..
        }) => Some((*plate, *code, message.clone())),
        _ => None,
    });
    let (plate, code, message) = failure.expect("failure published");
    assert_eq!(plate, 0);
    assert_eq!(code, ResultCode::ObjectsWithDisabledExtruder);
    assert!(message.contains("extruder 3"), "{}", message);

    f.handle.shutdown().await;
}

#[tokio::test]
async fn test_blocker_disables_until_recheck() {
    let scene = support::scene(&[0]);
    scene.set_blocker(Some("extruder setup incomplete".into()));
    let f = start(scene, 0);

    wait_state(&f.handle, BackendState::Disabled).await;
    f.handle.notify_change(0, false).expect("send");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(f.handle.state(), BackendState::Disabled);
    assert!(f.sink.is_empty());

    f.scene.set_blocker(None);
    f.handle.recheck().expect("send");
    tokio::time::timeout(LIMIT, f.sink.wait_for(1))
        .await
        .expect("pending change sliced after unblocking");
    wait_state(&f.handle, BackendState::Done).await;

    f.handle.shutdown().await;
}

#[tokio::test]
async fn test_tool_operation_buffers_changes() {
    let f = start(support::scene(&[0]), 0);
    f.handle.begin_tool_operation().expect("send");
    f.handle.notify_change(0, false).expect("send");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(f.sink.is_empty());
    assert_eq!(f.handle.state(), BackendState::NotStarted);

    f.handle.end_tool_operation().expect("send");
    tokio::time::timeout(LIMIT, f.sink.wait_for(1))
        .await
        .expect("buffered change replayed");

    f.handle.shutdown().await;
}

#[tokio::test]
async fn test_cancel_returns_to_not_started() {
    let f = start(support::scene(&[0]), 5);
    f.handle.request_slice(0).expect("send");
    wait_state(&f.handle, BackendState::Processing).await;

    let events = Arc::clone(&f.events);
    wait_until(move || {
        events.lock().iter().any(|e| {
            matches!(
                e,
                AppEvent::Slice(SliceEvent::StageStarted {
                    stage: StageKind::Execute,
                    ..
                })
            )
        })
    })
    .await;
    f.handle.cancel().expect("send");

    wait_state(&f.handle, BackendState::NotStarted).await;
    tokio::time::timeout(LIMIT, f.handle.shutdown())
        .await
        .expect("controller stops after cancel");
    assert!(f.sink.is_empty());
}

fn execute_started(events: &[AppEvent]) -> bool {
    events.iter().any(|e| {
        matches!(
            e,
            AppEvent::Slice(SliceEvent::StageStarted {
                stage: StageKind::Execute,
                ..
            })
        )
    })
}

fn execute_cancelled(events: &[AppEvent]) -> bool {
    events.iter().any(|e| {
        matches!(
            e,
            AppEvent::Slice(SliceEvent::StageFinished {
                stage: StageKind::Execute,
                result: ResultCode::Cancelled,
                ..
            })
        )
    })
}

#[tokio::test]
async fn test_blocker_survives_cancelled_pipeline_settling() {
    let f = start(support::scene(&[0]), 5);
    f.handle.request_slice(0).expect("send");
    let events = Arc::clone(&f.events);
    wait_until(move || execute_started(&events.lock())).await;

    f.handle.cancel().expect("send");
    f.scene.set_blocker(Some("extruder setup incomplete".into()));
    f.handle.recheck().expect("send");
    wait_state(&f.handle, BackendState::Disabled).await;

    let events = Arc::clone(&f.events);
    wait_until(move || execute_cancelled(&events.lock())).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(f.handle.state(), BackendState::Disabled);

    f.scene.set_blocker(None);
    f.handle.recheck().expect("send");
    wait_state(&f.handle, BackendState::NotStarted).await;

    f.handle.shutdown().await;
}

#[tokio::test]
async fn test_changes_while_processing_are_coalesced() {
    let f = start(support::scene(&[0]), 1);
    f.handle.request_slice(0).expect("send");
    let events = Arc::clone(&f.events);
    wait_until(move || execute_started(&events.lock())).await;

    for _ in 0..3 {
        f.handle.notify_change(0, false).expect("send");
    }

    tokio::time::timeout(LIMIT, f.sink.wait_for(2))
        .await
        .expect("plate sliced again after settling");
    wait_state(&f.handle, BackendState::Done).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(f.sink.published_plates(), vec![0, 0]);

    // the superseded run is not visualized
    assert!(f.events.lock().iter().any(|e| matches!(
        e,
        AppEvent::Slice(SliceEvent::VisualizationSkipped { plate: 0 })
    )));

    f.handle.shutdown().await;
}

#[tokio::test]
async fn test_structural_change_cancels_running_plate() {
    let f = start(support::scene(&[0]), 5);
    f.handle.request_slice(0).expect("send");
    let events = Arc::clone(&f.events);
    wait_until(move || execute_started(&events.lock())).await;

    f.handle.notify_change(0, true).expect("send");

    let events = Arc::clone(&f.events);
    wait_until(move || execute_cancelled(&events.lock())).await;
    assert!(transitions(&f.events.lock())
        .contains(&(BackendState::Processing, BackendState::NotStarted)));
    assert!(f.sink.is_empty());

    tokio::time::timeout(LIMIT, f.handle.shutdown())
        .await
        .expect("controller stops");
}

#[tokio::test]
async fn test_force_all_queues_every_plate_in_order() {
    let f = start(support::scene(&[0, 1]), 0);
    f.handle.force_all().expect("send");

    tokio::time::timeout(LIMIT, f.sink.wait_for(2))
        .await
        .expect("every plate sliced");
    assert_eq!(f.sink.published_plates(), vec![0, 1]);

    let queued: Vec<u32> = f
        .events
        .lock()
        .iter()
        .filter_map(|e| match e {
            AppEvent::Backend(BackendEvent::PlateQueued { plate }) => Some(*plate),
            _ => None,
        })
        .collect();
    assert_eq!(queued, vec![0, 1]);

    f.handle.shutdown().await;
}
