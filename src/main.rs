use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lightslab::{format_report, write_report, LayerSpec, RunConfiguration, SimulationRunner};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "lightslab=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {path}"))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config file: {path}"))?
        }
        None => demo_config(),
    };

    let mut runner = SimulationRunner::new();
    let handle = runner.start_with_progress(config.clone(), rand::random(), |launched, total| {
        info!(launched, total, "progress");
    })?;
    let result = handle.wait()?;

    write_report(Path::new(&config.output_file), &config, &result)
        .with_context(|| format!("Failed to write report to {}", config.output_file))?;
    println!("{}", format_report(&config, &result));
    Ok(())
}

/// Three-layer slab between air, loosely modelled on dermis over fat.
fn demo_config() -> RunConfiguration {
    let mut config = RunConfiguration::new();
    config.photons = 100_000;
    config.layers = vec![
        LayerSpec::ambient(1.0),
        LayerSpec::new(1.37, 1.0, 100.0, 0.9, 0.1),
        LayerSpec::new(1.37, 1.0, 10.0, 0.0, 0.1),
        LayerSpec::new(1.37, 2.0, 10.0, 0.7, 0.2),
        LayerSpec::ambient(1.0),
    ];
    config
}
