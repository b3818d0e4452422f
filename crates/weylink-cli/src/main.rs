//! weylink CLI: headless client for a Weylus server.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use weylink_bmp::BmpDecoder;
use weylink_client::{Config, Session};
use weylink_protocol::ProtocolClient;

#[derive(Parser)]
#[command(
    name = "weylink",
    about = "Stream and decode a Weylus server's screen",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Server host, overriding the configuration.
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port, overriding the configuration.
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session until interrupted.
    Run,

    /// Print the windows and screens the server can capture.
    Capturables,

    /// Decode a BMP file and print its geometry.
    Decode {
        /// The bitmap to decode.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    match cli.command {
        Commands::Run => run(config).await?,
        Commands::Capturables => {
            let client = ProtocolClient::new(config.client_config());
            let url = config.server.url();
            client
                .connect(&url)
                .await
                .with_context(|| format!("failed to connect to {url}"))?;
            let list = client.capturable_list().await;
            client.close().await;
            for (id, name) in list?.iter().enumerate() {
                println!("{id}\t{name}");
            }
        }
        Commands::Decode { file } => decode(&file)?,
    }

    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, shutting down");
        }
        on_signal.cancel();
    });

    tracing::info!(url = %config.server.url(), fps = config.video.fps, "starting session");
    let mut last_width = 0;
    let mut last_height = 0;
    let session = Session::new(config).on_frame(move |published| {
        let (width, height) = (published.frame.width(), published.frame.height());
        if (width, height) != (last_width, last_height) {
            tracing::info!(width, height, "frame size changed");
            (last_width, last_height) = (width, height);
        }
        tracing::trace!(sequence = published.sequence, "frame");
    });

    let stats = session.run(shutdown).await?;
    println!(
        "frames shown: {}, skipped: {}, last sequence: {}",
        stats.frames_shown, stats.frames_skipped, stats.last_sequence
    );
    Ok(())
}

fn decode(file: &Path) -> anyhow::Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let mut decoder = BmpDecoder::new();
    let frame = decoder
        .decode(&bytes, None)
        .with_context(|| format!("failed to decode {}", file.display()))?;
    if let Some(header) = decoder.header() {
        println!("size:        {}x{}", header.width, header.height);
        println!("depth:       {} bpp", header.bits_per_pixel());
        println!("rows:        {}", if header.top_down { "top-down" } else { "bottom-up" });
        println!("alpha:       {}", if header.allow_alpha { "kept" } else { "opaque" });
        println!("dib header:  {} bytes", header.dib_len);
        println!("pixels at:   {}", header.pixel_offset);
    }
    if frame.width() > 0 && frame.height() > 0 {
        let [r, g, b, a] = frame.rgba(0, 0);
        println!("top-left:    rgba({r}, {g}, {b}, {a})");
    }
    Ok(())
}
