//! bmp-cam-capture binary: stream frames from a V4L2 device into BMP files.

use std::path::PathBuf;
use std::time::Duration;

use bmp_cam_capture::pipeline::{self, LoopOptions};
use bmp_cam_capture::{BmpSequenceSink, CaptureConfig, CaptureSession, FrameSink};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(&cli().get_matches()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("device")
                .short('d')
                .long("device")
                .value_name("PATH")
                .help("V4L2 capture device node")
                .value_parser(value_parser!(PathBuf))
                .default_value("/dev/video0"),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .value_name("PIXELS")
                .help("Frame width")
                .value_parser(value_parser!(u32).range(1..))
                .default_value("640"),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .value_name("PIXELS")
                .help("Frame height")
                .value_parser(value_parser!(u32).range(1..))
                .default_value("480"),
        )
        .arg(
            Arg::new("frames")
                .short('n')
                .long("frames")
                .value_name("COUNT")
                .help("Number of frames to write, 0 to run until interrupted")
                .value_parser(value_parser!(u64))
                .default_value("0"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Directory for frame_NNNNNN.bmp files")
                .value_parser(value_parser!(PathBuf))
                .default_value("frames"),
        )
        .arg(
            Arg::new("interval-ms")
                .long("interval-ms")
                .value_name("MILLIS")
                .help("Pause between frames")
                .value_parser(value_parser!(u64))
                .default_value("16"),
        )
        .arg(
            Arg::new("grayscale")
                .short('g')
                .long("grayscale")
                .help("Write grayscale frames")
                .action(ArgAction::SetTrue),
        )
}

fn run(matches: &ArgMatches) -> bmp_cam_capture::Result<()> {
    let defaults = CaptureConfig::default();
    let config = CaptureConfig {
        device: matches
            .get_one::<PathBuf>("device")
            .cloned()
            .unwrap_or(defaults.device),
        width: matches
            .get_one::<u32>("width")
            .copied()
            .unwrap_or(defaults.width),
        height: matches
            .get_one::<u32>("height")
            .copied()
            .unwrap_or(defaults.height),
    };
    let limit = matches
        .get_one::<u64>("frames")
        .copied()
        .filter(|&frames| frames > 0);
    let output = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("frames"));
    let options = LoopOptions {
        interval: matches
            .get_one::<u64>("interval-ms")
            .map_or(pipeline::FRAME_INTERVAL, |&ms| Duration::from_millis(ms)),
        grayscale: matches.get_flag("grayscale"),
    };

    let mut session = CaptureSession::new(&config)?;
    let mut sink = BmpSequenceSink::create(output, limit)?;

    let close = sink.close_handle();
    if let Err(err) = ctrlc::set_handler(move || close.close()) {
        eprintln!("Warning: failed to install Ctrl-C handler: {err}");
    }

    let shown = pipeline::run(&mut session, &mut sink, &options);
    sink.close();
    session.close();

    let shown = shown?;
    info!(frames = shown, dir = %sink.dir().display(), "done");
    Ok(())
}
