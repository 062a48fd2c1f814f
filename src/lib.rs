pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod photon;
pub mod rng;
pub mod runner;
pub mod tally;
pub mod worker;

// Prelude
pub use config::{LayerSpec, RunConfiguration};
pub use error::RunError;
pub use output::{format_report, write_report, SimulationResult};
pub use photon::{PhotonPacket, Termination};
pub use rng::RandomSource;
pub use runner::{RunHandle, SimulationRunner};
pub use tally::Tally;
pub use worker::SimulationCore;
