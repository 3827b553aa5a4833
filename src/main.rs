//! GhostPush CLI
//!
//! Diagnostics for the NVENC push pipeline: probe the host and check settings files.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ghostpush::{
    encode::Codec,
    hw::cuda::{self, CudaBackend},
    hw::HwBackend,
    EncoderParams, StreamSettings,
};

#[derive(Parser)]
#[command(name = "ghostpush")]
#[command(about = "NVENC push pipeline diagnostics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show CUDA device and NVENC encoder availability
    Info {
        /// CUDA device ordinal
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Validate a settings file and print the resolved encoder parameters
    Check {
        /// Path to a TOML settings file
        path: PathBuf,

        /// Also open the device and encoder with these settings
        #[arg(long)]
        open: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ghostpush=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Info { device } => cmd_info(device),
        Commands::Check { path, open } => cmd_check(path, open),
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "Yes"
    } else {
        "No"
    }
}

fn cmd_info(device: Option<String>) -> anyhow::Result<()> {
    println!("GhostPush System Information");
    println!("============================\n");

    let caps = cuda::get_capabilities();

    println!("=== NVIDIA ===");
    if let Some(gpu) = &caps.gpu_name {
        println!("GPU: {}", gpu);
    }
    if let Some(driver) = &caps.driver_version {
        println!("Driver: {}", driver);
    }

    match cuda::probe_device(device.as_deref()) {
        Ok(()) => println!("CUDA device: Yes"),
        Err(e) => println!("CUDA device: No ({})", e),
    }

    println!("\n=== NVENC Encoders ===");
    for codec in Codec::ALL {
        println!(
            "  - {} ({}): {}",
            codec.display_name(),
            codec.encoder_name(),
            yes_no(cuda::supports_codec(codec))
        );
    }

    Ok(())
}

fn cmd_check(path: PathBuf, open: bool) -> anyhow::Result<()> {
    let settings = StreamSettings::load(&path)?;
    let params = EncoderParams::from_settings(&settings)?;

    println!("Settings: {}", path.display());
    println!("  Codec:      {} ({})", params.codec, params.codec.encoder_name());
    println!("  Resolution: {}", params.resolution);
    println!("  Framerate:  {}", params.framerate);
    println!("  Bitrate:    {} kbps", params.bitrate_bps / 1000);
    println!("  Pixel fmt:  {:?}", params.pixel_layout);
    println!("  GOP:        {}", params.gop_size);
    println!("  B-frames:   {}", params.max_b_frames);
    println!(
        "  Time base:  {}/{}",
        params.time_base.0, params.time_base.1
    );
    for (key, value) in params.options() {
        println!("  -{} {}", key, value);
    }

    if open {
        let backend = CudaBackend::from_settings(&settings)?;
        let _device = backend.create_device()?;
        let _session = ghostpush::EncoderSession::open(&backend, &settings)?;
        println!("\nEncoder opened successfully");
    }

    Ok(())
}
