use super::*;
use crate::error::CameraError;
use crate::frame::PixelFormat;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn create_test_camera_config() -> SimulatedCameraConfig {
    SimulatedCameraConfig {
        width: 8,
        height: 4,
        frame_interval: Duration::from_millis(5),
        ..SimulatedCameraConfig::default()
    }
}

fn open_first(transport: &SimulatedTransport) -> Arc<dyn CameraDevice> {
    let info = transport.enumerate().remove(0);
    transport.open(&info).unwrap()
}

#[test]
fn test_enumerate_and_open() {
    let transport = SimulatedTransport::new(create_test_camera_config());
    let devices = transport.enumerate();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].serial, "SIM-0001");

    let camera = open_first(&transport);
    assert_eq!(camera.info(), &devices[0]);
    assert_eq!(transport.open_count(), 1);
}

#[test]
fn test_fault_plan_hides_devices_and_fails_open() {
    let hidden = SimulatedTransport::with_faults(
        create_test_camera_config(),
        FaultPlan {
            no_devices: true,
            ..FaultPlan::default()
        },
    );
    assert!(hidden.enumerate().is_empty());

    let broken = SimulatedTransport::with_faults(
        create_test_camera_config(),
        FaultPlan {
            open_failure: Some("link down".to_string()),
            ..FaultPlan::default()
        },
    );
    let info = broken.enumerate().remove(0);
    match broken.open(&info) {
        Err(CameraError::DeviceOpenFailed { details, .. }) => assert_eq!(details, "link down"),
        other => panic!("Expected open failure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_free_run_frames_have_expected_shape() {
    let transport = SimulatedTransport::new(SimulatedCameraConfig {
        pixel_format: PixelFormat::Bgr8,
        ..create_test_camera_config()
    });
    let camera = open_first(&transport);
    camera.start_grabbing().unwrap();

    let first = camera.retrieve(Duration::from_millis(200)).unwrap();
    let second = camera.retrieve(Duration::from_millis(200)).unwrap();

    assert_eq!(first.width, 8);
    assert_eq!(first.height, 4);
    assert_eq!(first.format, PixelFormat::Bgr8);
    assert!(first.validate_size());
    assert!(second.id > first.id);
}

#[test]
fn test_retrieve_without_grabbing_fails() {
    let transport = SimulatedTransport::new(create_test_camera_config());
    let camera = open_first(&transport);

    assert!(matches!(
        camera.retrieve(Duration::from_millis(10)),
        Err(CameraError::GrabFailed { .. })
    ));
}

#[test]
fn test_trigger_mode_waits_for_software_trigger() {
    let transport = SimulatedTransport::new(create_test_camera_config());
    let camera = open_first(&transport);
    camera
        .set_parameter(Parameter::TriggerSource(TriggerSource::Software))
        .unwrap();
    camera.set_parameter(Parameter::TriggerMode(true)).unwrap();
    camera.start_grabbing().unwrap();

    assert_eq!(
        camera.retrieve(Duration::from_millis(30)).unwrap_err(),
        CameraError::GrabTimeout { timeout_ms: 30 }
    );

    camera.execute(DeviceCommand::SoftwareTrigger).unwrap();
    assert!(camera.retrieve(Duration::from_millis(30)).is_ok());
}

#[test]
fn test_abort_wakes_pending_retrieve() {
    let transport = SimulatedTransport::new(create_test_camera_config());
    let camera = open_first(&transport);
    camera.set_parameter(Parameter::TriggerMode(true)).unwrap();
    camera.start_grabbing().unwrap();

    let waiter = {
        let camera = Arc::clone(&camera);
        thread::spawn(move || {
            let started = Instant::now();
            let result = camera.retrieve(Duration::from_secs(10));
            (result, started.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(20));
    camera.abort_retrieve();

    let (result, waited) = waiter.join().unwrap();
    assert_eq!(result.unwrap_err(), CameraError::GrabAborted);
    assert!(waited < Duration::from_secs(5));
}

#[test]
fn test_scripted_grab_failure_and_stall() {
    let failing = SimulatedTransport::with_faults(
        create_test_camera_config(),
        FaultPlan {
            grab_failure_after: Some((2, "packet loss".to_string())),
            ..FaultPlan::default()
        },
    );
    let camera = open_first(&failing);
    camera.start_grabbing().unwrap();
    assert!(camera.retrieve(Duration::from_millis(100)).is_ok());
    assert!(camera.retrieve(Duration::from_millis(100)).is_ok());
    assert_eq!(
        camera.retrieve(Duration::from_millis(100)).unwrap_err(),
        CameraError::GrabFailed {
            details: "packet loss".to_string()
        }
    );

    let stalling = SimulatedTransport::with_faults(
        create_test_camera_config(),
        FaultPlan {
            stall_after: Some(1),
            ..FaultPlan::default()
        },
    );
    let camera = open_first(&stalling);
    camera.start_grabbing().unwrap();
    assert!(camera.retrieve(Duration::from_millis(100)).is_ok());
    assert!(matches!(
        camera.retrieve(Duration::from_millis(20)),
        Err(CameraError::GrabTimeout { .. })
    ));
}

#[test]
fn test_exposure_outside_sensor_range_is_rejected() {
    let transport = SimulatedTransport::new(create_test_camera_config());
    let camera = open_first(&transport);

    assert!(camera.set_parameter(Parameter::ExposureTime(20000.0)).is_ok());
    assert!(matches!(
        camera.set_parameter(Parameter::ExposureTime(900_000.0)),
        Err(CameraError::ParameterRejected { .. })
    ));
    assert_eq!(
        camera.read_parameter(ParameterKind::ExposureTime).unwrap(),
        Parameter::ExposureTime(20000.0)
    );
}

#[test]
fn test_free_run_update_only_counts_when_enabled() {
    let transport = SimulatedTransport::new(create_test_camera_config());
    let camera = open_first(&transport);

    camera.execute(DeviceCommand::FreeRunUpdate).unwrap();
    let simulated = transport.last_opened().unwrap();
    assert_eq!(simulated.free_run_updates(), 0);

    camera.set_parameter(Parameter::FreeRunEnabled(true)).unwrap();
    camera.execute(DeviceCommand::FreeRunUpdate).unwrap();
    assert_eq!(simulated.free_run_updates(), 1);
}

#[test]
fn test_user_set_save_and_load() {
    let transport = SimulatedTransport::new(create_test_camera_config());
    let camera = open_first(&transport);

    camera.set_parameter(Parameter::UserSet(UserSet::UserSet2)).unwrap();
    camera.set_parameter(Parameter::ExposureTime(5000.0)).unwrap();
    camera.execute(DeviceCommand::UserSetSave).unwrap();

    camera.set_parameter(Parameter::ExposureTime(9000.0)).unwrap();
    camera.execute(DeviceCommand::UserSetLoad).unwrap();

    assert_eq!(
        camera.read_parameter(ParameterKind::ExposureTime).unwrap(),
        Parameter::ExposureTime(5000.0)
    );
}

#[test]
fn test_user_set_slots_are_independent() {
    let transport = SimulatedTransport::new(create_test_camera_config());
    let camera = open_first(&transport);

    camera.set_parameter(Parameter::UserSet(UserSet::UserSet1)).unwrap();
    camera.set_parameter(Parameter::ExposureTime(4000.0)).unwrap();
    camera.execute(DeviceCommand::UserSetSave).unwrap();

    camera.set_parameter(Parameter::UserSet(UserSet::UserSet3)).unwrap();
    camera.set_parameter(Parameter::ExposureTime(12000.0)).unwrap();
    camera.execute(DeviceCommand::UserSetSave).unwrap();

    camera.set_parameter(Parameter::UserSet(UserSet::UserSet1)).unwrap();
    camera.execute(DeviceCommand::UserSetLoad).unwrap();
    assert_eq!(
        camera.read_parameter(ParameterKind::ExposureTime).unwrap(),
        Parameter::ExposureTime(4000.0)
    );

    camera.set_parameter(Parameter::UserSet(UserSet::UserSet3)).unwrap();
    camera.execute(DeviceCommand::UserSetLoad).unwrap();
    assert_eq!(
        camera.read_parameter(ParameterKind::ExposureTime).unwrap(),
        Parameter::ExposureTime(12000.0)
    );
}

#[test]
fn test_closed_camera_refuses_everything() {
    let transport = SimulatedTransport::new(create_test_camera_config());
    let camera = open_first(&transport);
    camera.close();

    assert!(transport.last_opened().unwrap().is_closed());
    assert!(camera.start_grabbing().is_err());
    assert!(camera.set_parameter(Parameter::TriggerMode(true)).is_err());
    assert_eq!(
        camera.read_parameter(ParameterKind::TriggerMode).unwrap_err(),
        CameraError::DeviceUnavailable
    );
}
