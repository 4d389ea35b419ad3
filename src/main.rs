//! PLYS CLI - Play, inspect and generate point cloud sequences.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use plys::{
    playback::PlaybackScheduler,
    schema::PlaybackConfig,
    sequence::{Compression, Frame, FrameSource, generate_from_dir},
};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("--example") => print_example_config(),
        Some("play") if args.len() >= 3 => play(Path::new(&args[2]), args.get(3)),
        Some("info") if args.len() >= 3 => info(Path::new(&args[2])),
        Some("generate") if args.len() >= 5 => generate(&args[2..]),
        _ => {
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage:");
    eprintln!("  {} play <sequence.plys> [config.json]", program);
    eprintln!("  {} info <sequence.plys>", program);
    eprintln!(
        "  {} generate <ply-dir> <out.plys> <framerate> [--gzip]",
        program
    );
    eprintln!("  {} --example", program);
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  play      Decode and play a sequence at its framerate");
    eprintln!("  info      Decode every frame as fast as possible and report totals");
    eprintln!("  generate  Build a sequence from a directory of .ply files");
    eprintln!();
    eprintln!("Example configuration is generated with --example flag.");
}

fn load_config(path: Option<&String>) -> PlaybackConfig {
    let Some(path) = path else {
        return PlaybackConfig::default();
    };
    let path = PathBuf::from(path);

    let config_str = fs::read_to_string(&path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: PlaybackConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        std::process::exit(1);
    }
    config
}

fn play(path: &Path, config_path: Option<&String>) {
    let config = load_config(config_path);

    let sink = |index: u64, frame: Frame| {
        println!("  Frame {}: {} points", index, frame.len());
    };
    let mut scheduler = PlaybackScheduler::from_path(path, sink, config).unwrap_or_else(|e| {
        eprintln!("Error opening sequence: {}", e);
        std::process::exit(1);
    });

    println!("PLYS Playback");
    println!("=============");
    println!("File: {}", path.display());
    println!("Framerate: {} fps", scheduler.framerate().unwrap_or_default());
    println!("Pacing: {:?}", scheduler.config().tick_policy);
    println!();

    match scheduler.run() {
        Ok(stats) => {
            println!();
            println!("Played {}", stats);
        }
        Err(e) => {
            eprintln!(
                "Playback failed after {} frames: {}",
                scheduler.frames_presented(),
                e
            );
            std::process::exit(1);
        }
    }
}

fn info(path: &Path) {
    let mut source = FrameSource::from_path(path, Default::default()).unwrap_or_else(|e| {
        eprintln!("Error opening sequence: {}", e);
        std::process::exit(1);
    });

    println!("PLYS Sequence");
    println!("=============");
    println!("File: {}", path.display());
    if let Some(header) = source.sequence_header() {
        println!("Framerate: {} fps", header.framerate);
        for declaration in &header.declarations {
            println!("  {}", declaration.text);
        }
    }
    println!();

    let start = Instant::now();
    let mut frames = 0u64;
    let mut points = 0usize;
    let mut min_points = usize::MAX;
    let mut max_points = 0usize;

    for frame in source.by_ref() {
        let frame = frame.unwrap_or_else(|e| {
            eprintln!("Error decoding frame {}: {}", frames, e);
            std::process::exit(1);
        });
        frames += 1;
        points += frame.len();
        min_points = min_points.min(frame.len());
        max_points = max_points.max(frame.len());
    }
    let elapsed = start.elapsed();

    println!("Frames: {}", frames);
    println!("Points: {}", points);
    if frames > 0 {
        println!("Points per frame: {} - {}", min_points, max_points);
        if let Some(rate) = source.framerate() {
            println!("Duration: {:.2}s", frames as f32 / rate);
        }
    }
    println!(
        "Decoded in {:.2}s ({:.1} frames/s)",
        elapsed.as_secs_f32(),
        frames as f32 / elapsed.as_secs_f32().max(f32::EPSILON)
    );
}

fn generate(args: &[String]) {
    let input = PathBuf::from(&args[0]);
    let output = PathBuf::from(&args[1]);
    let framerate: f32 = args[2].parse().unwrap_or_else(|e| {
        eprintln!("Invalid framerate `{}`: {}", args[2], e);
        std::process::exit(1);
    });
    let compression = if args[3..].iter().any(|a| a == "--gzip") {
        Compression::Gzip
    } else {
        Compression::None
    };

    match generate_from_dir(&input, &output, framerate, compression) {
        Ok(stats) => println!("Wrote {}: {}", output.display(), stats),
        Err(e) => {
            eprintln!("Error generating sequence: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_example_config() {
    let config = PlaybackConfig::default();

    println!("Example configuration (config.json):");
    println!("{}", serde_json::to_string_pretty(&config).unwrap());
}
