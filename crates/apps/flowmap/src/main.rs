mod settings;
mod sources;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use compute::GeneratorEvent;
use formats::{Histogram, NodeSnapshot};
use foundation::bounds::Aabb2;
use foundation::time::SystemClock;
use foundation::viewport::ViewportState;
use gpu::{ParticleCommand, RecordingDevice};
use layers::{
    CountryLayer, GeometryOverlay, NodeUpdate, OverlayConfig, OverlayLayer, ParticleLayer,
    ParticleResources, TrafficFilter,
};
use serde_json::json;
use streaming::RegionSource;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::settings::load_config;
use crate::sources::{FilesystemSource, HttpSource};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless driver for the relay map overlays")]
struct Args {
    /// Overlay config JSON (defaults apply to missing fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Apply the mobile count factors
    #[arg(long)]
    mobile: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone, Copy)]
struct ViewArgs {
    /// Left edge of the visible window, in world pixels
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    min_x: f64,

    /// Right edge of the visible window, in world pixels
    #[arg(long, default_value_t = 256.0, allow_negative_numbers = true)]
    max_x: f64,

    #[arg(long, default_value_t = 0.0)]
    zoom: f64,
}

impl ViewArgs {
    /// Normalizes the pixel window by the world width at `zoom`.
    fn viewport(self) -> ViewportState {
        let bounds = Aabb2::new([self.min_x, 0.0], [self.max_x, 0.0]);
        ViewportState::from_pixel_bounds(bounds, self.zoom)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FilterArg {
    Hidden,
    General,
    Both,
}

impl From<FilterArg> for TrafficFilter {
    fn from(value: FilterArg) -> Self {
        match value {
            FilterArg::Hidden => TrafficFilter::Hidden,
            FilterArg::General => TrafficFilter::General,
            FilterArg::Both => TrafficFilter::Both,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the country choropleth for a histogram and print each region
    Choropleth {
        /// Region code -> client count JSON
        histogram: PathBuf,

        /// Fixture directory with geo/, outliers/ and histogram/ subfolders
        #[arg(long, conflicts_with = "server")]
        data_dir: Option<PathBuf>,

        /// Base URL of the overlay server
        #[arg(long)]
        server: Option<String>,

        #[command(flatten)]
        view: ViewArgs,

        /// Alpha-3 code of a region to select for charts
        #[arg(long)]
        select: Option<String>,
    },

    /// Generate the particle buffer for a node snapshot
    Particles {
        /// Node snapshot JSON ({"nodes": [...], "bandwidth": ...})
        #[arg(long)]
        nodes: PathBuf,

        /// Particle count (clamped to the configured bounds)
        #[arg(long)]
        count: Option<usize>,

        /// RNG seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, value_enum, default_value = "both")]
        filter: FilterArg,

        /// Write the packed buffer here as little-endian f32
        #[arg(long)]
        out: Option<PathBuf>,

        /// Scale the drawn count by the snapshot bandwidth
        #[arg(long)]
        scale_by_bandwidth: bool,

        #[arg(long, default_value_t = 0.0)]
        min_bandwidth: f64,

        #[arg(long, default_value_t = 0.0)]
        max_bandwidth: f64,

        #[command(flatten)]
        view: ViewArgs,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = load_config(args.config.as_deref()).await?;
    config.is_mobile |= args.mobile;

    match args.command {
        Command::Choropleth {
            histogram,
            data_dir,
            server,
            view,
            select,
        } => {
            let payload = tokio::fs::read_to_string(&histogram).await?;
            let histogram = Histogram::from_json_str(&payload)?;
            let select = select.as_deref();
            match (data_dir, server) {
                (_, Some(url)) => {
                    let source = Arc::new(HttpSource::new(url));
                    run_choropleth(source, &config, histogram, view.viewport(), select).await?
                }
                (Some(dir), None) => {
                    let source = Arc::new(FilesystemSource::new(dir));
                    run_choropleth(source, &config, histogram, view.viewport(), select).await?
                }
                (None, None) => return Err("either --data-dir or --server is required".into()),
            }
        }
        Command::Particles {
            nodes,
            count,
            seed,
            filter,
            out,
            scale_by_bandwidth,
            min_bandwidth,
            max_bandwidth,
            view,
        } => {
            let payload = tokio::fs::read_to_string(&nodes).await?;
            let snapshot = NodeSnapshot::from_json_str(&payload)?;

            let mut layer: ParticleLayer<RecordingDevice, SystemClock> = ParticleLayer::new(2, &config);
            if let Some(seed) = seed {
                layer = layer.with_seed(seed);
            }
            if let Some(count) = count {
                layer.set_particle_count(count);
            }
            let settings = layer.settings_mut();
            settings.filter = filter.into();
            settings.scale_count_by_bandwidth = scale_by_bandwidth;
            settings.min_bandwidth = min_bandwidth;
            settings.max_bandwidth = max_bandwidth;

            layer.initialize(ParticleResources {
                device: RecordingDevice::default(),
                clock: SystemClock::new(),
            });
            info!(nodes = snapshot.nodes.len(), count = layer.particle_count(), "generating");
            layer.update_data(NodeUpdate {
                nodes: snapshot.nodes,
                bandwidth: snapshot.bandwidth,
            });

            run_particles(layer, view.viewport(), out).await?
        }
    }

    Ok(())
}

async fn run_choropleth<S: RegionSource>(
    source: Arc<S>,
    config: &OverlayConfig,
    histogram: Histogram,
    viewport: ViewportState,
    select: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut layer: CountryLayer<S, GeometryOverlay> = CountryLayer::from_config(1, source, config)?;
    layer.initialize(GeometryOverlay::default());
    layer.update_data(histogram);
    layer.draw_frame(&viewport);
    if let Some(report) = layer.flush().await {
        info!(
            rendered = report.rendered,
            failed = report.failed,
            "choropleth rendered"
        );
    }

    if let Some(overlay) = layer.sink() {
        let overlay = overlay.lock();
        for region in &overlay.regions {
            let line = json!({
                "code": region.code,
                "fill_color": region.style.fill_color,
                "fill_opacity": region.style.fill_opacity,
                "weight": region.style.weight,
                "feature": region.feature.to_geojson_value(),
            });
            println!("{line}");
        }
    }

    if let Some(code) = select {
        match layer.select_region(code).await {
            Some(charts) => {
                let line = json!({
                    "selected": charts.key,
                    "outliers": charts.outliers,
                    "date_histogram": charts.date_histogram,
                });
                println!("{line}");
            }
            None => warn!(code, "selected region was not rendered"),
        }
    }
    Ok(())
}

async fn run_particles(
    mut layer: ParticleLayer<RecordingDevice, SystemClock>,
    viewport: ViewportState,
    out: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(generator) = layer.generator_mut() else {
        return Err("particle layer was not initialized".into());
    };
    while let Some(event) = generator.next_event().await {
        match event {
            GeneratorEvent::Progress { progress, .. } => {
                eprint!("\rgenerating {:>3.0}%", progress * 100.0);
            }
            GeneratorEvent::Completed { records, .. } => {
                eprintln!();
                info!(records, "particle buffer ready");
            }
            GeneratorEvent::Failed { message, .. } => {
                eprintln!();
                return Err(message.into());
            }
        }
    }

    if let (Some(path), Some(generator)) = (out, layer.generator()) {
        let records = generator.buffer().device().records.as_slice();
        let floats: &[f32] = bytemuck::cast_slice(records);
        let mut bytes = Vec::with_capacity(floats.len() * 4);
        for value in floats {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        info!(path = %path.display(), records = records.len(), "particle buffer written");
    }

    match layer.draw_frame(&viewport) {
        Some(frame) => {
            for command in &frame.commands {
                if let ParticleCommand::Draw {
                    subset,
                    color,
                    offset,
                    count,
                } = command
                {
                    println!("{subset:?}\toffset={offset}\tcount={count}\tcolor={color:?}");
                }
            }
        }
        None => warn!("nothing to draw"),
    }
    Ok(())
}
