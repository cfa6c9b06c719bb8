use dance_tracker::config::Config;
use dance_tracker::video::{Camera, FrameSource};
use tracing_subscriber::EnvFilter;

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let config = match Config::load_or_default("dance_tracker.toml") {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "bad config");
            std::process::exit(2);
        }
    };
    let cam = &config.camera;
    println!("Testing camera {} ...\n", cam.index);

    let mut camera = match Camera::open(cam.index, cam.width, cam.height, cam.fps) {
        Ok(camera) => camera,
        Err(e) => {
            println!("✗ {e}");
            println!("\nPossible causes:");
            println!("1. Camera is being used by another app");
            println!("2. Camera permissions not granted");
            println!("3. No camera connected");
            std::process::exit(1);
        }
    };
    let (width, height) = camera.resolution();
    println!("✓ Camera opened at {width}x{height}");

    for _ in 0..5 {
        match camera.read_frame() {
            Ok(frame) => println!("✓ Frame {} captured ({}x{})", frame.sequence, frame.width(), frame.height()),
            Err(e) => {
                println!("✗ {e}");
                std::process::exit(1);
            }
        }
    }
}
