//! Stateless photon-transport physics.
//!
//! Every operation here works on a `(config, photon, tally, rng)` quadruple
//! and keeps no state of its own; the per-worker simulation core drives these
//! functions over many packets. One call to [`hop_drop_spin`] advances a
//! packet by a single interaction step: sample a step, move, and either
//! resolve a boundary crossing or deposit weight and scatter, followed by the
//! roulette check for low-weight packets.

pub mod fresnel;
pub mod scatter;

pub use fresnel::{fresnel, specular_reflectance};
pub use scatter::{sample_deflection, spin};

use crate::config::{LayerSpec, RunConfiguration};
use crate::photon::{PhotonPacket, Termination};
use crate::rng::RandomSource;
use crate::tally::Tally;

/// Direction cosines steeper than this count as vertical incidence.
pub(crate) const COS_NORMAL: f64 = 1.0 - 1.0e-12;

/// Places a fresh packet at the top of the first turbid layer, heading
/// straight down with the specular loss already taken.
///
/// Leading glass layers only refract and reflect, never interact, so they
/// are skipped; their reflections are accounted for by the composed
/// specular reflectance.
pub fn launch(config: &RunConfiguration, r_specular: f64, photon: &mut PhotonPacket) {
    photon.weight = 1.0 - r_specular;
    photon.uz = 1.0;
    photon.layer = 1;

    let last_physical = config.layers.len() - 2;
    while photon.layer < last_physical && config.layers[photon.layer].is_glass() {
        photon.layer += 1;
    }
    photon.z = config.layers[photon.layer].z0;
}

/// Advances the packet by one interaction step and applies the roulette.
///
/// Returns `None` while the packet keeps walking, or the way it terminated.
pub fn hop_drop_spin(
    config: &RunConfiguration,
    photon: &mut PhotonPacket,
    tally: &mut Tally,
    rng: &mut RandomSource,
) -> Option<Termination> {
    let outcome = if config.layers[photon.layer].is_glass() {
        hop_in_glass(config, photon, tally, rng)
    } else {
        hop_drop_spin_in_tissue(config, photon, tally, rng)
    };

    if outcome.is_none() && photon.weight < config.weight_threshold {
        return roulette(photon, config.survival_chance, rng);
    }
    outcome
}

/// Low-weight packets survive with probability `chance`, rescaled by its
/// inverse, so the expected weight is unchanged.
pub fn roulette(
    photon: &mut PhotonPacket,
    chance: f64,
    rng: &mut RandomSource,
) -> Option<Termination> {
    if photon.weight == 0.0 {
        Some(Termination::Killed)
    } else if rng.uniform() < chance {
        photon.weight /= chance;
        None
    } else {
        Some(Termination::Killed)
    }
}

/// Moves the packet `step` along its direction.
fn hop(photon: &mut PhotonPacket) {
    let s = photon.step;
    photon.x += s * photon.ux;
    photon.y += s * photon.uy;
    photon.z += s * photon.uz;
    photon.r = (photon.x * photon.x + photon.y * photon.y).sqrt();
}

/// Sets the step to reach the nearer boundary of a glass layer.
///
/// The caller guarantees `uz != 0`.
fn step_to_boundary(layer: &LayerSpec, photon: &mut PhotonPacket) {
    photon.step = if photon.uz > 0.0 {
        (layer.z1 - photon.z) / photon.uz
    } else {
        (layer.z0 - photon.z) / photon.uz
    };
}

/// Samples a step inside a turbid layer, or converts a leftover optical
/// depth carried over from a truncated step.
fn sample_step(layer: &LayerSpec, photon: &mut PhotonPacket, rng: &mut RandomSource) {
    let mu_t = layer.mua + layer.mus;
    if photon.step_left == 0.0 {
        photon.step = -rng.uniform_open().ln() / mu_t;
    } else {
        photon.step = photon.step_left / mu_t;
        photon.step_left = 0.0;
    }
}

/// Truncates a step that would cross a layer boundary.
///
/// The unused part is stored as dimensionless optical depth so the next
/// layer can finish it with its own coefficients. Returns whether the
/// boundary is hit.
fn truncate_at_boundary(layer: &LayerSpec, photon: &mut PhotonPacket) -> bool {
    let uz = photon.uz;
    let dist = if uz > 0.0 {
        (layer.z1 - photon.z) / uz
    } else if uz < 0.0 {
        (layer.z0 - photon.z) / uz
    } else {
        // Horizontal: no boundary ahead.
        return false;
    };

    if photon.step > dist {
        photon.step_left = (photon.step - dist) * (layer.mua + layer.mus);
        photon.step = dist;
        true
    } else {
        false
    }
}

/// Deposits the absorbed share of the packet weight at its current bin.
fn drop_weight(config: &RunConfiguration, photon: &mut PhotonPacket, tally: &mut Tally) {
    let layer = &config.layers[photon.layer];
    let iz = bin(photon.z / config.dz, config.nz);
    let ir = bin(photon.r / config.dr, config.nr);

    let dw = photon.weight * layer.mua / (layer.mua + layer.mus);
    photon.weight -= dw;
    tally.a_rz.add(ir, iz, dw);
}

/// Records an escape through the top surface and terminates the packet.
///
/// `refl` is the weight fraction reflected back in; the escapes here carry
/// the full weight (`refl = 0`).
fn record_reflected(config: &RunConfiguration, photon: &mut PhotonPacket, tally: &mut Tally, refl: f64) {
    let ir = bin(photon.r / config.dr, config.nr);
    let ia = bin((-photon.uz).acos() / config.da, config.na);

    let escaped = photon.weight * (1.0 - refl);
    if photon.scatters > 0 {
        tally.rd_ra.add(ir, ia, escaped);
    } else {
        tally.rd_unscattered += escaped;
    }
    photon.weight *= refl;
}

/// Records an escape through the bottom surface and terminates the packet.
fn record_transmitted(config: &RunConfiguration, photon: &mut PhotonPacket, tally: &mut Tally, refl: f64) {
    let ir = bin(photon.r / config.dr, config.nr);
    let ia = bin(photon.uz.acos() / config.da, config.na);

    let escaped = photon.weight * (1.0 - refl);
    if photon.scatters > 0 {
        tally.tt_ra.add(ir, ia, escaped);
    } else {
        tally.tt_unscattered += escaped;
    }
    photon.weight *= refl;
}

/// Resolves the boundary crossing the packet just reached.
fn cross_or_not(
    config: &RunConfiguration,
    photon: &mut PhotonPacket,
    tally: &mut Tally,
    rng: &mut RandomSource,
) -> Option<Termination> {
    if photon.uz < 0.0 {
        cross_up(config, photon, tally, rng)
    } else {
        cross_down(config, photon, tally, rng)
    }
}

/// Transmit/reflect decision at the upper boundary of the current layer.
fn cross_up(
    config: &RunConfiguration,
    photon: &mut PhotonPacket,
    tally: &mut Tally,
    rng: &mut RandomSource,
) -> Option<Termination> {
    let uz = photon.uz;
    let layer = &config.layers[photon.layer];
    let n_i = layer.n;
    let n_t = config.layers[photon.layer - 1].n;

    // Total internal reflection needs no transmission draw.
    if -uz <= layer.cos_crit_up {
        photon.uz = -uz;
        return None;
    }

    let (r, ca2) = fresnel(n_i, n_t, -uz);
    if rng.uniform() > r {
        if photon.layer == 1 {
            photon.uz = -ca2;
            record_reflected(config, photon, tally, 0.0);
            return Some(Termination::Reflected);
        }
        photon.layer -= 1;
        photon.ux *= n_i / n_t;
        photon.uy *= n_i / n_t;
        photon.uz = -ca2;
    } else {
        photon.uz = -uz;
    }
    None
}

/// Transmit/reflect decision at the lower boundary of the current layer.
fn cross_down(
    config: &RunConfiguration,
    photon: &mut PhotonPacket,
    tally: &mut Tally,
    rng: &mut RandomSource,
) -> Option<Termination> {
    let uz = photon.uz;
    let layer = &config.layers[photon.layer];
    let n_i = layer.n;
    let n_t = config.layers[photon.layer + 1].n;

    if uz <= layer.cos_crit_down {
        photon.uz = -uz;
        return None;
    }

    let (r, ca2) = fresnel(n_i, n_t, uz);
    if rng.uniform() > r {
        if photon.layer == config.layers.len() - 2 {
            photon.uz = ca2;
            record_transmitted(config, photon, tally, 0.0);
            return Some(Termination::Transmitted);
        }
        photon.layer += 1;
        photon.ux *= n_i / n_t;
        photon.uy *= n_i / n_t;
        photon.uz = ca2;
    } else {
        photon.uz = -uz;
    }
    None
}

/// One step inside a glass layer: straight to the boundary, then resolve
/// the crossing. A horizontal photon in glass can never reach tissue again,
/// so it terminates on the spot.
fn hop_in_glass(
    config: &RunConfiguration,
    photon: &mut PhotonPacket,
    tally: &mut Tally,
    rng: &mut RandomSource,
) -> Option<Termination> {
    if photon.uz == 0.0 {
        return Some(Termination::Killed);
    }
    step_to_boundary(&config.layers[photon.layer], photon);
    hop(photon);
    cross_or_not(config, photon, tally, rng)
}

/// One step inside a turbid layer: sample, move, and either resolve the
/// boundary crossing (absorption and scattering deferred via the leftover
/// optical depth) or deposit weight and pick a new direction.
fn hop_drop_spin_in_tissue(
    config: &RunConfiguration,
    photon: &mut PhotonPacket,
    tally: &mut Tally,
    rng: &mut RandomSource,
) -> Option<Termination> {
    sample_step(&config.layers[photon.layer], photon, rng);

    if truncate_at_boundary(&config.layers[photon.layer], photon) {
        hop(photon);
        cross_or_not(config, photon, tally, rng)
    } else {
        hop(photon);
        drop_weight(config, photon, tally);
        spin(config.layers[photon.layer].g, photon, rng);
        None
    }
}

/// Grid bin for a non-negative coordinate ratio, clamped to the last bin.
fn bin(x: f64, n: usize) -> usize {
    (x as usize).min(n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerSpec;

    fn prepared_config() -> RunConfiguration {
        let mut config = RunConfiguration::new();
        config.layers = vec![
            LayerSpec::ambient(1.0),
            LayerSpec::new(1.4, 1.0, 9.0, 0.9, 0.5),
            LayerSpec::ambient(1.0),
        ];
        config.prepare().unwrap()
    }

    fn glass_first_config() -> RunConfiguration {
        let mut config = RunConfiguration::new();
        config.layers = vec![
            LayerSpec::ambient(1.0),
            LayerSpec::new(1.5, 0.0, 0.0, 0.0, 0.1),
            LayerSpec::new(1.4, 1.0, 9.0, 0.9, 0.5),
            LayerSpec::ambient(1.0),
        ];
        config.prepare().unwrap()
    }

    #[test]
    fn test_launch_takes_specular_loss() {
        let config = prepared_config();
        let rsp = specular_reflectance(&config.layers);
        let mut photon = PhotonPacket::new();
        launch(&config, rsp, &mut photon);
        assert!((photon.weight - (1.0 - rsp)).abs() < 1e-12);
        assert_eq!(photon.layer, 1);
        assert_eq!(photon.z, 0.0);
        assert_eq!(photon.uz, 1.0);
    }

    #[test]
    fn test_launch_skips_leading_glass() {
        let config = glass_first_config();
        let mut photon = PhotonPacket::new();
        launch(&config, 0.05, &mut photon);
        assert_eq!(photon.layer, 2);
        assert!((photon.z - config.layers[2].z0).abs() < 1e-12);
    }

    #[test]
    fn test_hop_moves_along_direction() {
        let mut photon = PhotonPacket::new();
        photon.ux = 0.6;
        photon.uz = 0.8;
        photon.step = 0.5;
        hop(&mut photon);
        assert!((photon.x - 0.3).abs() < 1e-12);
        assert!((photon.z - 0.4).abs() < 1e-12);
        assert!((photon.r - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_sample_step_consumes_leftover_first() {
        let config = prepared_config();
        let layer = &config.layers[1];
        let mut rng = RandomSource::new(3);
        let mut photon = PhotonPacket::new();
        photon.step_left = 2.0;
        sample_step(layer, &mut photon, &mut rng);
        // Leftover optical depth of 2 in a mu_t = 10 medium is a 0.2 cm step.
        assert!((photon.step - 0.2).abs() < 1e-12);
        assert_eq!(photon.step_left, 0.0);
    }

    #[test]
    fn test_truncation_stores_leftover_optical_depth() {
        let config = prepared_config();
        let layer = &config.layers[1];
        let mut photon = PhotonPacket::new();
        photon.z = 0.4;
        photon.uz = 1.0;
        photon.step = 0.3;
        // Boundary at z1 = 0.5 is 0.1 away; 0.2 cm remain, mu_t = 10.
        assert!(truncate_at_boundary(layer, &mut photon));
        assert!((photon.step - 0.1).abs() < 1e-12);
        assert!((photon.step_left - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_truncation_within_layer() {
        let config = prepared_config();
        let layer = &config.layers[1];
        let mut photon = PhotonPacket::new();
        photon.z = 0.1;
        photon.uz = 1.0;
        photon.step = 0.2;
        assert!(!truncate_at_boundary(layer, &mut photon));
        assert!((photon.step - 0.2).abs() < 1e-12);
        assert_eq!(photon.step_left, 0.0);
    }

    #[test]
    fn test_drop_weight_deposits_absorbed_share() {
        let config = prepared_config();
        let mut tally = Tally::new(&config);
        let mut photon = PhotonPacket::new();
        photon.weight = 1.0;
        photon.z = 0.005;
        drop_weight(&config, &mut photon, &mut tally);
        // mua / (mua + mus) = 0.1 of the weight is absorbed.
        assert!((photon.weight - 0.9).abs() < 1e-12);
        assert!((tally.a_rz[(0, 0)] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_bin_clamps_to_last() {
        assert_eq!(bin(0.5, 10), 0);
        assert_eq!(bin(9.99, 10), 9);
        assert_eq!(bin(250.0, 10), 9);
    }

    #[test]
    fn test_roulette_kills_zero_weight() {
        let mut rng = RandomSource::new(5);
        let mut photon = PhotonPacket::new();
        photon.weight = 0.0;
        assert_eq!(
            roulette(&mut photon, 0.1, &mut rng),
            Some(Termination::Killed)
        );
    }

    #[test]
    fn test_roulette_preserves_expected_weight() {
        let mut rng = RandomSource::new(6);
        let chance = 0.1;
        let w0 = 1e-5;
        let trials = 100_000;
        let mut total = 0.0;
        for _ in 0..trials {
            let mut photon = PhotonPacket::new();
            photon.weight = w0;
            if roulette(&mut photon, chance, &mut rng).is_none() {
                total += photon.weight;
            }
        }
        let mean = total / trials as f64;
        assert!(
            (mean - w0).abs() < 0.05 * w0,
            "roulette bias: mean {mean} vs {w0}"
        );
    }

    #[test]
    fn test_horizontal_photon_in_glass_dies() {
        let config = glass_first_config();
        let mut tally = Tally::new(&config);
        let mut rng = RandomSource::new(7);
        let mut photon = PhotonPacket::new();
        photon.layer = 1;
        photon.weight = 0.5;
        photon.ux = 1.0;
        photon.uz = 0.0;
        let outcome = hop_drop_spin(&config, &mut photon, &mut tally, &mut rng);
        assert_eq!(outcome, Some(Termination::Killed));
    }

    #[test]
    fn test_total_internal_reflection_mirrors_without_draw() {
        let config = glass_first_config();
        let mut tally = Tally::new(&config);
        let mut rng = RandomSource::new(8);
        let before = rng.clone();
        let mut photon = PhotonPacket::new();
        photon.layer = 1;
        photon.weight = 0.5;
        photon.z = 0.0;
        // Shallower than the glass/air critical cosine (~0.745).
        photon.ux = 0.9;
        photon.uz = -(1.0_f64 - 0.81).sqrt();
        let uz_in = photon.uz;
        let outcome = cross_up(&config, &mut photon, &mut tally, &mut rng);
        assert_eq!(outcome, None);
        assert!((photon.uz + uz_in).abs() < 1e-12, "should mirror uz");
        // The stream is untouched: the next draw matches a pristine clone.
        let mut rng_after = rng;
        let mut pristine = before;
        assert_eq!(rng_after.uniform().to_bits(), pristine.uniform().to_bits());
    }

    #[test]
    fn test_matched_index_interface_always_transmits() {
        // Matched refractive indices: crossing down from layer 1 into layer 2
        // can never reflect (fresnel r = 0).
        let mut config = RunConfiguration::new();
        config.layers = vec![
            LayerSpec::ambient(1.4),
            LayerSpec::new(1.4, 1.0, 9.0, 0.0, 0.5),
            LayerSpec::new(1.4, 2.0, 5.0, 0.0, 0.5),
            LayerSpec::ambient(1.4),
        ];
        let config = config.prepare().unwrap();
        let mut tally = Tally::new(&config);
        let mut rng = RandomSource::new(9);
        for k in 0..100 {
            let mut photon = PhotonPacket::new();
            photon.layer = 1;
            photon.weight = 1.0;
            photon.z = 0.5;
            let angle = 0.01 + 1.5 * (k as f64) / 100.0;
            photon.uz = angle.cos();
            photon.ux = angle.sin();
            cross_down(&config, &mut photon, &mut tally, &mut rng);
            assert_eq!(photon.layer, 2, "matched boundary must transmit");
        }
    }
}
