// Keyboard teleop: W/S forward/backward, A/D micro-step turn, Q/Esc quit
use clap::Parser;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::info;
use tracing_subscriber::EnvFilter;

use alphabot_teleop::channel::CommandChannel;
use alphabot_teleop::config::OperatorArgs;
use alphabot_teleop::operator::{KeyboardIntent, Operator};
use alphabot_teleop::stream::{ReceiverConfig, StreamReceiver};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = OperatorArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let base_url = args.base_url();
    info!("Robot: {}", base_url);

    let channel = CommandChannel::new(base_url.clone(), args.speeds());
    let receiver = StreamReceiver::start(ReceiverConfig::for_robot(&base_url));
    let mut operator = Operator::new(
        channel,
        args.speeds(),
        args.step_timing(),
        std::time::Duration::from_secs(args.ping_secs),
    )
    .with_stream(receiver);

    operator.connect().await;
    info!("Controls: W/S=forward/backward, A/D=turn (micro-step), Q=quit");

    enable_raw_mode()?;
    let mut keyboard = KeyboardIntent::default();
    let result = operator.run(&mut keyboard, args.fps).await;
    disable_raw_mode()?;

    operator.shutdown().await;
    result?;
    Ok(())
}
