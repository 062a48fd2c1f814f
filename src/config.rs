use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use crate::error::RunError;

/// One horizontal slab of homogeneous optical medium.
///
/// The first and last entries of a configuration's layer sequence are the
/// semi-infinite ambient media above and below the stack; only their
/// refractive index matters. All lengths are in cm, coefficients in 1/cm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Refractive index.
    pub n: f64,
    /// Absorption coefficient.
    pub mua: f64,
    /// Scattering coefficient.
    pub mus: f64,
    /// Anisotropy: mean cosine of the scattering deflection angle.
    pub g: f64,
    /// Thickness. Ignored for the ambient media.
    pub d: f64,
    /// Depth of the top boundary. Derived during preparation.
    #[serde(default)]
    pub z0: f64,
    /// Depth of the bottom boundary; `z1 == z0 + d`. Derived.
    #[serde(default)]
    pub z1: f64,
    /// Critical cosine for total internal reflection at the upper interface.
    /// Derived.
    #[serde(default)]
    pub cos_crit_up: f64,
    /// Critical cosine for total internal reflection at the lower interface.
    /// Derived.
    #[serde(default)]
    pub cos_crit_down: f64,
}

impl LayerSpec {
    /// A physical slab layer.
    pub fn new(n: f64, mua: f64, mus: f64, g: f64, d: f64) -> Self {
        Self {
            n,
            mua,
            mus,
            g,
            d,
            z0: 0.0,
            z1: 0.0,
            cos_crit_up: 0.0,
            cos_crit_down: 0.0,
        }
    }

    /// A semi-infinite ambient medium for the top or bottom of the stack.
    pub fn ambient(n: f64) -> Self {
        Self::new(n, 0.0, 0.0, 0.0, 0.0)
    }

    /// True when the layer neither absorbs nor scatters.
    pub fn is_glass(&self) -> bool {
        self.mua == 0.0 && self.mus == 0.0
    }
}

/// Complete description of one simulation run.
///
/// Construct with [`RunConfiguration::new`], adjust the public fields, then
/// hand it to the runner; validation and the derived layer fields are applied
/// by [`RunConfiguration::prepare`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// Depth grid step [cm].
    pub dz: f64,
    /// Radial grid step [cm].
    pub dr: f64,
    /// Exit-angle grid step [rad].
    pub da: f64,
    /// Number of depth bins.
    pub nz: usize,
    /// Number of radial bins.
    pub nr: usize,
    /// Number of exit-angle bins.
    pub na: usize,
    /// Time-resolved frames to capture; 0 disables the capture.
    #[serde(default)]
    pub nt: usize,
    /// Photon packets to launch.
    pub photons: u64,
    /// Weight below which a packet must face the roulette.
    pub weight_threshold: f64,
    /// Roulette survival probability; survivors are rescaled by its inverse.
    pub survival_chance: f64,
    /// Ambient media and slab layers, top to bottom.
    pub layers: Vec<LayerSpec>,
    /// Output file name echoed in the report header.
    pub output_file: String,
}

impl RunConfiguration {
    pub fn new() -> Self {
        Self {
            dz: 0.01,
            dr: 0.01,
            da: FRAC_PI_2 / 30.0,
            nz: 40,
            nr: 50,
            na: 30,
            nt: 0,
            photons: 10_000,
            weight_threshold: 1e-4,
            survival_chance: 0.1,
            layers: Vec::new(),
            output_file: "output.mco".to_string(),
        }
    }

    /// Number of physical layers (the sequence without the ambient media).
    pub fn num_physical_layers(&self) -> usize {
        self.layers.len().saturating_sub(2)
    }

    /// Index of the layer containing the centre of depth bin `iz`.
    pub fn layer_at_bin(&self, iz: usize) -> usize {
        let num_layers = self.num_physical_layers();
        let mut i = 1;
        while (iz as f64 + 0.5) * self.dz >= self.layers[i].z1 && i < num_layers {
            i += 1;
        }
        i
    }

    /// Validates the configuration and fills in the derived layer fields
    /// (boundary depths and critical cosines).
    pub fn prepare(&self) -> Result<RunConfiguration, RunError> {
        self.validate()?;

        let mut config = self.clone();

        // Contiguous boundaries, top of the first physical layer at z = 0.
        let mut z = 0.0;
        let last = config.layers.len() - 1;
        config.layers[0].z0 = 0.0;
        config.layers[0].z1 = 0.0;
        for layer in &mut config.layers[1..last] {
            layer.z0 = z;
            z += layer.d;
            layer.z1 = z;
        }
        config.layers[last].z0 = z;
        config.layers[last].z1 = z;

        // Critical cosines against the neighbouring media. A zero means the
        // interface can never reflect totally.
        for i in 1..last {
            let n_above = config.layers[i - 1].n;
            let n_below = config.layers[i + 1].n;
            let n = config.layers[i].n;
            config.layers[i].cos_crit_up = if n > n_above {
                (1.0 - n_above * n_above / (n * n)).sqrt()
            } else {
                0.0
            };
            config.layers[i].cos_crit_down = if n > n_below {
                (1.0 - n_below * n_below / (n * n)).sqrt()
            } else {
                0.0
            };
        }

        Ok(config)
    }

    fn validate(&self) -> Result<(), RunError> {
        fn invalid(msg: String) -> Result<(), RunError> {
            Err(RunError::InvalidConfig(msg))
        }

        if self.layers.len() < 3 {
            return invalid(format!(
                "need at least one physical layer between two ambient media, got {} layers",
                self.layers.len()
            ));
        }
        for (name, value) in [("dz", self.dz), ("dr", self.dr), ("da", self.da)] {
            if !(value > 0.0) || !value.is_finite() {
                return invalid(format!("grid step {name} must be positive, got {value}"));
            }
        }
        for (name, value) in [("nz", self.nz), ("nr", self.nr), ("na", self.na)] {
            if value == 0 {
                return invalid(format!("grid count {name} must be at least 1"));
            }
        }
        if self.photons == 0 {
            return invalid("photon count must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.weight_threshold) {
            return invalid(format!(
                "weight threshold must lie in [0, 1), got {}",
                self.weight_threshold
            ));
        }
        if !(self.survival_chance > 0.0 && self.survival_chance <= 1.0) {
            return invalid(format!(
                "roulette survival chance must lie in (0, 1], got {}",
                self.survival_chance
            ));
        }

        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            if !(layer.n > 0.0) || !layer.n.is_finite() {
                return invalid(format!("layer {i}: refractive index must be positive"));
            }
            let ambient = i == 0 || i == last;
            if ambient {
                if !layer.is_glass() {
                    return invalid(format!(
                        "layer {i} is an ambient medium and must have mua = mus = 0"
                    ));
                }
                continue;
            }
            if !(layer.d > 0.0) || !layer.d.is_finite() {
                return invalid(format!(
                    "layer {i}: thickness must be positive, got {}",
                    layer.d
                ));
            }
            if layer.mua < 0.0 || layer.mus < 0.0 {
                return invalid(format!("layer {i}: optical coefficients must be >= 0"));
            }
            if !(-1.0..=1.0).contains(&layer.g) {
                return invalid(format!(
                    "layer {i}: anisotropy must lie in [-1, 1], got {}",
                    layer.g
                ));
            }
        }

        Ok(())
    }
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self::new()
    }
}
