use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use st2110::clock::{PtpClock, SystemClock};
use st2110::provider::UdpChunkProvider;
use st2110::{FrameRate, OutputStream, OutputStreamConfig, PixelFormat, Scan, VideoFormat};

#[derive(Parser)]
#[command(
    name = "st2110-send",
    about = "ST 2110-20/40 test-pattern sender over UDP"
)]
struct Args {
    /// Destination for the video stream (host:port)
    #[arg(long, short, default_value = "127.0.0.1:50020")]
    dest: SocketAddr,

    /// Destination for the ancillary timecode stream (host:port)
    #[arg(long, default_value = "127.0.0.1:50040")]
    anc_dest: SocketAddr,

    /// Active width in pixels
    #[arg(long, default_value_t = 1280)]
    width: usize,

    /// Active height in lines
    #[arg(long, default_value_t = 720)]
    height: usize,

    /// Frame rate numerator
    #[arg(long, default_value_t = 50)]
    rate: u32,

    /// Frames to send before exiting (0 = until Enter is pressed)
    #[arg(long, default_value_t = 0)]
    frames: u64,
}

/// Horizontal RGB gradient that scrolls one pixel per frame, so receivers
/// can spot dropped or repeated frames by eye.
fn fill_pattern(data: &mut [u8], width: usize, frame_number: u64) {
    for (i, pixel) in data.chunks_exact_mut(3).enumerate() {
        let x = (i % width + frame_number as usize) % width;
        let level = (x * 255 / width.max(1)) as u8;
        pixel[0] = level;
        pixel[1] = 255 - level;
        pixel[2] = (frame_number % 256) as u8;
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let clock = Arc::new(SystemClock);
    let rate = match FrameRate::new(args.rate, 1) {
        Ok(rate) => rate,
        Err(e) => {
            eprintln!("Invalid frame rate: {e}");
            return;
        }
    };
    let format = VideoFormat {
        width: args.width,
        height: args.height,
        pixel_format: PixelFormat::Rgb8,
        frame_rate: rate,
        scan: Scan::Progressive,
    };

    let video_provider = Box::new(UdpChunkProvider::new(args.dest, clock.clone()));
    let mut video = match OutputStream::video(
        OutputStreamConfig::default(),
        format.clone(),
        96,
        video_provider,
        clock.clone(),
    ) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Failed to create video stream: {e}");
            return;
        }
    };

    let anc_provider = Box::new(UdpChunkProvider::new(args.anc_dest, clock.clone()));
    let mut anc = match OutputStream::ancillary(
        OutputStreamConfig::default(),
        rate,
        97,
        anc_provider,
        clock.clone(),
    ) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Failed to create ancillary stream: {e}");
            return;
        }
    };

    video.on_error(Box::new(|e| eprintln!("video stream error: {e}")));
    anc.on_error(Box::new(|e| eprintln!("ancillary stream error: {e}")));

    if video.start().is_err() || anc.start().is_err() {
        eprintln!("Failed to start streams");
        return;
    }

    println!(
        "Sending {}x{}@{} to {} (anc to {}) — {}",
        args.width,
        args.height,
        args.rate,
        args.dest,
        args.anc_dest,
        if args.frames == 0 {
            "press Enter to stop".to_string()
        } else {
            format!("{} frames", args.frames)
        }
    );

    let frame_size = video.memory().frame_size;
    let interval_ns = rate.interval_ns();
    let width = args.width;
    let frame_limit = args.frames;
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let producer = {
        let stop = stop.clone();
        let clock = clock.clone();
        let video = Arc::new(video);
        let video_ref = video.clone();
        let handle = std::thread::spawn(move || {
            let mut data = vec![0u8; frame_size];
            let mut frame_number = 0u64;
            while !stop.load(std::sync::atomic::Ordering::SeqCst) {
                fill_pattern(&mut data, width, frame_number);
                if let Err(e) = video_ref.send_frame(&data) {
                    // Pool exhaustion just drops the frame in free-run mode.
                    tracing::debug!(%e, "frame dropped");
                }
                frame_number += 1;
                if frame_limit > 0 && frame_number >= frame_limit {
                    break;
                }
                let now = clock.now_ns();
                clock.sleep_until_ns(now + interval_ns);
            }
        });
        (video, handle)
    };

    if frame_limit == 0 {
        let mut input = String::new();
        let _ = std::io::stdin().read_line(&mut input);
        stop.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    let (video, handle) = producer;
    let _ = handle.join();
    if let Some(presented) = video.last_presented() {
        println!(
            "last presented frame {} on boundary {}",
            presented.counter, presented.boundary_index
        );
    }
    drop(video);
    anc.stop();
}
