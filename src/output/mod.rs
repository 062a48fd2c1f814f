//! Post-processing of raw tallies into physically scaled quantities.
//!
//! All divisors derive from grid geometry and the photon count alone; the
//! only data-dependent branch is skipping the fluence division where a
//! layer does not absorb.

pub mod report;

pub use report::{format_report, write_report};

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::RunConfiguration;
use crate::engine;
use crate::tally::{Grid, Tally, TimeGrid};

/// Physically scaled result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Specular reflectance of the top surface.
    pub rsp: f64,
    /// Diffuse reflectance (scattered packets only).
    pub rd: f64,
    /// Reflectance of packets that escaped without ever scattering.
    pub rd_unscattered: f64,
    /// Absorbed fraction.
    pub a: f64,
    /// Diffuse transmittance (scattered packets only).
    pub tt: f64,
    /// Ballistic transmittance of packets that never scattered.
    pub tt_unscattered: f64,
    /// Reflectance per area and solid angle (nr x na) [1/(cm2 sr)].
    pub rd_ra: Grid,
    /// Transmittance per area and solid angle (nr x na) [1/(cm2 sr)].
    pub tt_ra: Grid,
    /// Absorption density (nr x nz) [1/cm3].
    pub a_rz: Grid,
    /// Radial reflectance profile [1/cm2].
    pub rd_r: Vec<f64>,
    /// Angular reflectance profile [1/sr].
    pub rd_a: Vec<f64>,
    /// Radial transmittance profile [1/cm2].
    pub tt_r: Vec<f64>,
    /// Angular transmittance profile [1/sr].
    pub tt_a: Vec<f64>,
    /// Absorption per depth bin [1/cm].
    pub a_z: Vec<f64>,
    /// Absorbed fraction per physical layer [-].
    pub a_l: Vec<f64>,
    /// Fluence per depth bin: absorption density over mua; zero in
    /// non-absorbing layers [-].
    pub fluence: Vec<f64>,
    /// Raw time-resolved weight field; its consumers apply their own
    /// normalization.
    pub w_txz: TimeGrid,
    /// Wall-clock duration of the run [s].
    pub simulation_time: f64,
    /// Photon packets launched.
    pub photons: u64,
}

impl SimulationResult {
    /// Converts merged raw accumulators into physical units. The
    /// configuration must be the prepared one the run used.
    pub fn from_tally(config: &RunConfiguration, tally: &Tally, elapsed: f64) -> Self {
        let n = config.photons as f64;

        // Axis sums over the raw grids, before any scaling.
        let mut rd_r = tally.rd_ra.row_sums();
        let mut rd_a = tally.rd_ra.column_sums();
        let mut rd = tally.rd_ra.total();
        let mut tt_r = tally.tt_ra.row_sums();
        let mut tt_a = tally.tt_ra.column_sums();
        let mut tt = tally.tt_ra.total();

        let mut a_z = vec![0.0; config.nz];
        let mut a_l = vec![0.0; config.num_physical_layers()];
        let mut a = 0.0;
        for iz in 0..config.nz {
            let layer = config.layer_at_bin(iz);
            for ir in 0..config.nr {
                let value = tally.a_rz[(ir, iz)];
                a_z[iz] += value;
                a_l[layer - 1] += value;
                a += value;
            }
        }

        // Reflectance/transmittance per area and solid angle.
        let mut rd_ra = tally.rd_ra.clone();
        let mut tt_ra = tally.tt_ra.clone();
        let scale = 4.0 * PI * PI * config.dr * config.dr * (config.da / 2.0).sin() * n;
        for ir in 0..config.nr {
            for ia in 0..config.na {
                let denom =
                    (ir as f64 + 0.5) * (2.0 * (ia as f64 + 0.5) * config.da).sin() * scale;
                rd_ra[(ir, ia)] /= denom;
                tt_ra[(ir, ia)] /= denom;
            }
        }

        // Radial profiles per area, angular profiles per solid angle.
        let scale = 2.0 * PI * config.dr * config.dr * n;
        for (ir, value) in rd_r.iter_mut().enumerate() {
            *value /= (ir as f64 + 0.5) * scale;
        }
        for (ir, value) in tt_r.iter_mut().enumerate() {
            *value /= (ir as f64 + 0.5) * scale;
        }
        let scale = 2.0 * PI * config.da * n;
        for (ia, value) in rd_a.iter_mut().enumerate() {
            *value /= ((ia as f64 + 0.5) * config.da).sin() * scale;
        }
        for (ia, value) in tt_a.iter_mut().enumerate() {
            *value /= ((ia as f64 + 0.5) * config.da).sin() * scale;
        }
        rd /= n;
        tt /= n;

        // Absorption density and depth profile.
        let mut a_rz = tally.a_rz.clone();
        let scale = 2.0 * PI * config.dr * config.dr * config.dz * n;
        for ir in 0..config.nr {
            for iz in 0..config.nz {
                a_rz[(ir, iz)] /= (ir as f64 + 0.5) * scale;
            }
        }
        for value in a_z.iter_mut() {
            *value /= config.dz * n;
        }
        for value in a_l.iter_mut() {
            *value /= n;
        }
        a /= n;

        let fluence = (0..config.nz)
            .map(|iz| {
                let layer = &config.layers[config.layer_at_bin(iz)];
                if layer.mua == 0.0 {
                    0.0
                } else {
                    a_z[iz] / layer.mua
                }
            })
            .collect();

        Self {
            rsp: engine::specular_reflectance(&config.layers),
            rd,
            rd_unscattered: tally.rd_unscattered / n,
            a,
            tt,
            tt_unscattered: tally.tt_unscattered / n,
            rd_ra,
            tt_ra,
            a_rz,
            rd_r,
            rd_a,
            tt_r,
            tt_a,
            a_z,
            a_l,
            fluence,
            w_txz: tally.w_txz.clone(),
            simulation_time: elapsed,
            photons: config.photons,
        }
    }
}
