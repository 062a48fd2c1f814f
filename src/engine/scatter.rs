//! Scattering direction sampling.

use std::f64::consts::PI;

use crate::photon::PhotonPacket;
use crate::rng::RandomSource;

use super::COS_NORMAL;

/// Samples the cosine of the polar deflection angle.
///
/// Henyey-Greenstein inverse CDF for `g != 0`, isotropic otherwise.
pub fn sample_deflection(g: f64, rng: &mut RandomSource) -> f64 {
    if g == 0.0 {
        2.0 * rng.uniform() - 1.0
    } else {
        let tmp = (1.0 - g * g) / (1.0 - g + 2.0 * g * rng.uniform());
        let cost = (1.0 + g * g - tmp * tmp) / (2.0 * g);
        cost.clamp(-1.0, 1.0)
    }
}

/// Rotates the packet's direction by a sampled deflection angle and a
/// uniform azimuth.
pub fn spin(g: f64, photon: &mut PhotonPacket, rng: &mut RandomSource) {
    let (ux, uy, uz) = (photon.ux, photon.uy, photon.uz);

    let cost = sample_deflection(g, rng);
    let sint = (1.0 - cost * cost).sqrt();

    let psi = 2.0 * PI * rng.uniform();
    let cosp = psi.cos();
    // sin(psi) recovered from the cosine; the sign flips past pi.
    let sinp = if psi < PI {
        (1.0 - cosp * cosp).sqrt()
    } else {
        -(1.0 - cosp * cosp).sqrt()
    };

    if uz.abs() > COS_NORMAL {
        // Near-vertical travel: the general rotation divides by
        // sqrt(1 - uz^2) and would blow up.
        photon.ux = sint * cosp;
        photon.uy = sint * sinp;
        photon.uz = cost * uz.signum();
    } else {
        let tmp = (1.0 - uz * uz).sqrt();
        photon.ux = sint * (ux * uz * cosp - uy * sinp) / tmp + ux * cost;
        photon.uy = sint * (uy * uz * cosp + ux * sinp) / tmp + uy * cost;
        photon.uz = -sint * cosp * tmp + uz * cost;
    }

    photon.scatters += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn direction_length(photon: &PhotonPacket) -> f64 {
        (photon.ux * photon.ux + photon.uy * photon.uy + photon.uz * photon.uz).sqrt()
    }

    #[test]
    fn test_isotropic_mean_is_zero() {
        let mut rng = RandomSource::new(11);
        let n = 200_000;
        let mean: f64 = (0..n).map(|_| sample_deflection(0.0, &mut rng)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.01, "isotropic mean cosine was {mean}");
    }

    #[test]
    fn test_anisotropic_mean_matches_g() {
        // The mean cosine of the Henyey-Greenstein distribution equals g.
        let mut rng = RandomSource::new(12);
        let n = 200_000;
        for g in [0.5, 0.9, -0.3] {
            let mean: f64 = (0..n).map(|_| sample_deflection(g, &mut rng)).sum::<f64>() / n as f64;
            assert!(
                (mean - g).abs() < 0.01,
                "mean cosine {mean} should approach g = {g}"
            );
        }
    }

    #[test]
    fn test_spin_from_vertical() {
        let mut rng = RandomSource::new(13);
        let mut photon = PhotonPacket::new();
        photon.uz = 1.0;
        spin(0.9, &mut photon, &mut rng);
        assert!((direction_length(&photon) - 1.0).abs() < 1e-12);
        assert_eq!(photon.scatters, 1);
    }

    #[test]
    fn test_spin_from_downward_vertical_keeps_sign_convention() {
        let mut rng = RandomSource::new(14);
        let mut photon = PhotonPacket::new();
        photon.uz = -1.0;
        // Strong forward scattering keeps the packet heading down... which is
        // up here, since uz = -1.
        let mut kept = 0;
        for _ in 0..1000 {
            photon.ux = 0.0;
            photon.uy = 0.0;
            photon.uz = -1.0;
            spin(0.99, &mut photon, &mut rng);
            if photon.uz < 0.0 {
                kept += 1;
            }
        }
        assert!(kept > 950, "forward scattering should keep direction: {kept}");
    }

    proptest! {
        #[test]
        fn prop_deflection_cosine_in_range(g in -0.99..0.99f64, seed in 0u64..1000) {
            let mut rng = RandomSource::new(seed);
            let cost = sample_deflection(g, &mut rng);
            prop_assert!((-1.0..=1.0).contains(&cost));
        }

        #[test]
        fn prop_spin_preserves_unit_direction(
            g in -0.9..0.9f64,
            theta in 0.0..PI,
            phi in 0.0..(2.0 * PI),
            seed in 0u64..1000,
        ) {
            let mut rng = RandomSource::new(seed);
            let mut photon = PhotonPacket::new();
            photon.ux = theta.sin() * phi.cos();
            photon.uy = theta.sin() * phi.sin();
            photon.uz = theta.cos();
            spin(g, &mut photon, &mut rng);
            prop_assert!((direction_length(&photon) - 1.0).abs() < 1e-9);
        }
    }
}
