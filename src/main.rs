use std::{
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use spectrum_fsm::{
    capture::{SampleProducer, SineSource},
    channel::channel,
    display::{DisplayAdapter, DisplayCommand, TerminalDisplay},
    fsm::{Controller, READY_LABEL},
    input::{ActivationInput, IntervalActivation, KeyboardActivation},
    monitoring::PipelineStats,
    Error, CHANNEL_CAPACITY,
};
use tracing::{error, info};

mod args;

/// Park the system in a visibly failed state. There's no way forward without a restart,
/// so all we do is wait for someone to kill us.
fn halt(err: &anyhow::Error, stop: &AtomicBool) -> ! {
    error!("{:#}", err);
    eprintln!("HALTED: {:#}", err);
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(10));
    }
    process::exit(1);
}

fn main() -> anyhow::Result<()> {
    let args = args::Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args::convert_filter(args.verbose.log_level_filter()))
        .init();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .context("Installing Ctrl-C handler")?;
    }

    let config = args.controller_config();
    let stats = Arc::new(PipelineStats::default());
    let (sender, receiver) = channel(CHANNEL_CAPACITY, args.overflow_policy());

    // Start sampling on its own thread, it runs regardless of what the controller does
    let source = SineSource::new(args.tone_hz, args.sample_rate).with_noise(args.noise);
    let producer = SampleProducer::new(source, args.sample_rate, sender, stats.clone());
    let sampler = {
        let stop = stop.clone();
        thread::Builder::new()
            .name("sampler".into())
            .spawn(move || producer.run(stop))
            .map_err(|e| Error::Init(format!("sampler thread: {}", e)))
            .context("Starting sampler")
    };
    let sampler = match sampler {
        Ok(handle) => handle,
        Err(e) => halt(&e, &stop),
    };

    let mut input: Box<dyn ActivationInput> = match args.auto_ms {
        Some(ms) => Box::new(IntervalActivation::new(
            Duration::from_millis(ms),
            config.threshold.saturating_add(1),
        )),
        None => match KeyboardActivation::spawn(
            config.threshold.saturating_add(1),
            config.settle + args.poll_period(),
        ) {
            Ok(k) => {
                println!("Press Enter to touch");
                Box::new(k)
            }
            Err(e) => halt(&anyhow::Error::new(e).context("Starting keyboard input"), &stop),
        },
    };

    let mut display = TerminalDisplay::stdout(args.width, args.height);
    let mut controller = Controller::new(config);
    display.apply(&controller.start());

    let period = args.poll_period();
    info!(?period, "Starting control loop");
    while !stop.load(Ordering::Relaxed) {
        let started = Instant::now();
        let commands = controller.poll(started, input.read_activation(), &receiver);
        if commands
            .iter()
            .any(|c| matches!(c, DisplayCommand::Text(READY_LABEL)))
        {
            info!(stats = ?stats.snapshot(), "Pipeline");
        }
        display.apply(&commands);
        if let Some(rest) = period.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    info!("Shutting down");
    // A sampler waiting on a full channel gives up once the receiver is gone
    drop(receiver);
    if sampler.join().is_err() {
        error!("Sampler thread panicked");
    }
    info!(stats = ?stats.snapshot(), "Final");
    Ok(())
}
