// End-to-end: real server on an ephemeral port, real operator-side clients
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, Rgb, RgbImage};
use tokio::net::TcpListener;

use alphabot_teleop::camera::CameraFeed;
use alphabot_teleop::channel::{CommandChannel, RobotLink};
use alphabot_teleop::config::{DEFAULT_SPEED, MotorConfig, Speeds};
use alphabot_teleop::executor::CommandExecutor;
use alphabot_teleop::messages::{Action, Command};
use alphabot_teleop::motor::{ActionMap, Actuator, SimulatedDrive, WheelDuties};
use alphabot_teleop::runtime::{AppState, router};
use alphabot_teleop::stream::{ReceiverConfig, StreamReceiver, StreamState};

fn encoded_jpeg(width: u32, height: u32) -> Vec<u8> {
    let raster = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 64])
    });
    let mut jpeg = Vec::new();
    JpegEncoder::new(&mut jpeg)
        .encode(raster.as_raw(), width, height, ColorType::Rgb8.into())
        .unwrap();
    jpeg
}

struct Robot {
    base_url: String,
    sim: SimulatedDrive,
    executor: Arc<CommandExecutor>,
    camera: CameraFeed,
}

async fn start_robot(watchdog: Duration) -> Robot {
    let sim = SimulatedDrive::new();
    let actuator = Actuator::new(
        Box::new(sim.clone()),
        ActionMap::as_wired(),
        MotorConfig::default(),
    );
    let executor = Arc::new(CommandExecutor::new(actuator, watchdog, DEFAULT_SPEED));
    let camera = CameraFeed::new();
    let app = router(AppState::new(Arc::clone(&executor), Some(camera.clone())));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Robot {
        base_url: format!("http://{}", addr),
        sim,
        executor,
        camera,
    }
}

#[tokio::test]
async fn test_commands_reach_the_motors() {
    let robot = start_robot(Duration::from_secs(5)).await;
    let channel = CommandChannel::new(robot.base_url.clone(), Speeds::default());

    assert!(channel.ping().await);
    assert!(channel.forward().await);
    assert_eq!(robot.executor.current_action(), Action::Forward);
    // 80 -> 31% duty, as-wired forward is (+, -)
    assert_eq!(robot.sim.last(), Some(WheelDuties::new(31, -31)));

    assert!(channel.send(Command::new(Action::Right, 255)).await);
    assert_eq!(robot.sim.last(), Some(WheelDuties::new(100, 100)));

    assert!(channel.stop().await);
    assert_eq!(robot.executor.current_action(), Action::Stop);
}

#[tokio::test]
async fn test_stream_delivers_latest_frame() {
    let robot = start_robot(Duration::from_secs(5)).await;
    robot.camera.publish(Bytes::from(encoded_jpeg(320, 240)));

    let receiver = StreamReceiver::start(ReceiverConfig::for_robot(&robot.base_url));
    let mut state = receiver.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == StreamState::Streaming),
    )
    .await
    .unwrap()
    .unwrap();

    let mut frame = None;
    for _ in 0..50 {
        frame = receiver.take_frame();
        if frame.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(frame.unwrap().width(), 320);

    robot.camera.publish(Bytes::from(encoded_jpeg(640, 480)));
    let mut frame = None;
    for _ in 0..50 {
        frame = receiver.take_frame();
        if frame.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(frame.unwrap().height(), 480);

    receiver.shutdown().await;
}

#[tokio::test]
async fn test_watchdog_stops_silent_operator() {
    let robot = start_robot(Duration::from_millis(400)).await;
    let channel = CommandChannel::new(robot.base_url.clone(), Speeds::default());

    for _ in 0..8 {
        assert!(channel.forward().await);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(robot.executor.watchdog().fire_count(), 0);
    assert_eq!(robot.executor.current_action(), Action::Forward);

    // Operator goes quiet
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(robot.executor.watchdog().fire_count(), 1);
    assert_eq!(robot.executor.current_action(), Action::Stop);
    assert_eq!(robot.sim.last(), Some(WheelDuties::zero()));
}
