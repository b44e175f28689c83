use clap::Parser;
use log::{info, warn};
use miette::{IntoDiagnostic, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};

use marshal_core::{
    IndicatorSink, LogIndicator, LogMotionSink, MotionSink, NotificationSink,
};
use marshal_server::{
    config::load_config,
    controller::{Controller, NotifierFactory, Outputs},
    gpio::{self, LampPins},
    motion::{SystemClock, UdpMotionSink},
    notify::PushbulletNotifier,
    scan_source::{ScanReceiver, ScanReplay},
    web::Web,
    Cli, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    info!("Traffic marshal {} starting", VERSION);

    let mut config = load_config(args.config.as_deref()).into_diagnostic()?;
    if args.wrap_around {
        config.segmenter.wrap_around = true;
    }

    let outputs = outputs(&args)?;
    let (controller, handle) = Controller::new(config, Arc::new(SystemClock::new()), outputs);
    let web = Web::new(args.port, handle.clone());

    Toplevel::new(move |s| async move {
        s.start(SubsystemBuilder::new("Controller", |h| controller.run(h)));
        match args.replay {
            Some(path) => {
                let replay = ScanReplay::new(path, args.replay_rate_hz, handle);
                s.start(SubsystemBuilder::new("ScanReplay", |h| replay.run(h)));
            }
            None => {
                let receiver = ScanReceiver::new(args.scan_port, handle);
                s.start(SubsystemBuilder::new("ScanReceiver", |h| receiver.run(h)));
            }
        }
        s.start(SubsystemBuilder::new("Web", |h| web.run(h)));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await
    .into_diagnostic()
}

fn outputs(args: &Cli) -> Result<Outputs> {
    let indicator: Box<dyn IndicatorSink> = if args.gpio {
        let pins = LampPins {
            red: args.red_pin,
            yellow: args.yellow_pin,
            green: args.green_pin,
        };
        Box::new(gpio::open(pins).into_diagnostic()?)
    } else {
        Box::new(LogIndicator)
    };

    let motion: Box<dyn MotionSink> = match args.motion_address {
        Some(address) => Box::new(UdpMotionSink::new(address).into_diagnostic()?),
        None => {
            warn!("No motion address given, velocity commands are only logged");
            Box::new(LogMotionSink)
        }
    };

    let notifier = match args.pushbullet_token.clone() {
        Some(token) => {
            let factory: NotifierFactory = Box::new(move || {
                let mut notifier = PushbulletNotifier::connect(&token)?;
                if let Err(e) = notifier.announce_online() {
                    warn!("Start-up note not delivered: {}", e);
                }
                Ok(Box::new(notifier) as Box<dyn NotificationSink>)
            });
            Some(factory)
        }
        None => {
            warn!("No Pushbullet token, notifications disabled");
            None
        }
    };

    Ok(Outputs {
        indicator,
        motion,
        notifier,
    })
}
