//! Fresnel reflectance at refractive-index interfaces.

use crate::config::LayerSpec;

use super::COS_NORMAL;

/// Specular reflectance of the stack's top surface.
///
/// With a glass first layer, the multiple internal reflections inside it are
/// composed into the result.
pub fn specular_reflectance(layers: &[LayerSpec]) -> f64 {
    let t = (layers[0].n - layers[1].n) / (layers[0].n + layers[1].n);
    let mut r1 = t * t;

    if layers.len() > 2 && layers[1].is_glass() {
        let t = (layers[1].n - layers[2].n) / (layers[1].n + layers[2].n);
        let r2 = t * t;
        r1 += (1.0 - r1) * (1.0 - r1) * r2 / (1.0 - r1 * r2);
    }
    r1
}

/// Fresnel reflectance for unpolarized light.
///
/// `ca1` is the cosine of the incidence angle, assumed positive; the caller
/// rules out angles beyond the critical angle beforehand. Returns the
/// reflectance and the cosine of the transmission angle.
pub fn fresnel(n_i: f64, n_t: f64, ca1: f64) -> (f64, f64) {
    if n_i == n_t {
        // Matched boundary.
        (0.0, ca1)
    } else if ca1 > COS_NORMAL {
        // Normal incidence.
        (((n_t - n_i) / (n_t + n_i)).powi(2), ca1)
    } else if ca1 < 1.0e-6 {
        // Grazing incidence.
        (1.0, 0.0)
    } else {
        let sa1 = (1.0 - ca1 * ca1).sqrt();
        let sa2 = n_i * sa1 / n_t;
        if sa2 >= 1.0 {
            // Beyond the critical angle after all.
            (1.0, 0.0)
        } else {
            let ca2 = (1.0 - sa2 * sa2).sqrt();
            let cap = ca1 * ca2 - sa1 * sa2; /* c+ = cc - ss. */
            let cam = ca1 * ca2 + sa1 * sa2; /* c- = cc + ss. */
            let sap = sa1 * ca2 + ca1 * sa2; /* s+ = sc + cs. */
            let sam = sa1 * ca2 - ca1 * sa2; /* s- = sc - cs. */
            let r = 0.5 * sam * sam * (cam * cam + cap * cap) / (sap * sap * cam * cam);
            (r, ca2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_matched_index_never_reflects() {
        for ca1 in [1.0, 0.9, 0.5, 0.1, 1e-7] {
            let (r, ca2) = fresnel(1.4, 1.4, ca1);
            assert_eq!(r, 0.0);
            assert_eq!(ca2, ca1);
        }
    }

    #[test]
    fn test_normal_incidence() {
        let (r, ca2) = fresnel(1.0, 1.4, 1.0);
        let expected = ((1.4_f64 - 1.0) / (1.4 + 1.0)).powi(2);
        assert!((r - expected).abs() < 1e-12);
        assert_eq!(ca2, 1.0);
    }

    #[test]
    fn test_grazing_incidence_reflects_fully() {
        let (r, ca2) = fresnel(1.0, 1.4, 1e-7);
        assert_eq!(r, 1.0);
        assert_eq!(ca2, 0.0);
    }

    #[test]
    fn test_beyond_critical_angle_reflects_fully() {
        // From glass (n = 1.5) into air the critical cosine is ~0.745;
        // a shallower incidence cosine must reflect totally.
        let (r, _) = fresnel(1.5, 1.0, 0.5);
        assert_eq!(r, 1.0);
    }

    #[test]
    fn test_snell_transmission_cosine() {
        let ca1: f64 = 0.8;
        let (_, ca2) = fresnel(1.0, 1.5, ca1);
        let sa1 = (1.0 - ca1 * ca1).sqrt();
        let expected = (1.0 - (sa1 / 1.5) * (sa1 / 1.5)).sqrt();
        assert!((ca2 - expected).abs() < 1e-12);
    }

    #[test]
    fn test_specular_reflectance_plain_interface() {
        let layers = vec![
            LayerSpec::ambient(1.0),
            LayerSpec::new(1.4, 1.0, 10.0, 0.9, 1.0),
            LayerSpec::ambient(1.0),
        ];
        let expected = ((1.0_f64 - 1.4) / (1.0 + 1.4)).powi(2);
        assert!((specular_reflectance(&layers) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_specular_reflectance_composes_through_glass() {
        let layers = vec![
            LayerSpec::ambient(1.0),
            LayerSpec::new(1.5, 0.0, 0.0, 0.0, 0.1),
            LayerSpec::new(1.4, 1.0, 10.0, 0.9, 1.0),
            LayerSpec::ambient(1.0),
        ];
        let r1 = ((1.0_f64 - 1.5) / (1.0 + 1.5)).powi(2);
        let r2 = ((1.5_f64 - 1.4) / (1.5 + 1.4)).powi(2);
        let expected = r1 + (1.0 - r1) * (1.0 - r1) * r2 / (1.0 - r1 * r2);
        assert!((specular_reflectance(&layers) - expected).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_reflectance_is_a_fraction(
            n_i in 1.0..2.0f64,
            n_t in 1.0..2.0f64,
            ca1 in 0.0..=1.0f64,
        ) {
            let (r, ca2) = fresnel(n_i, n_t, ca1);
            prop_assert!((0.0..=1.0).contains(&r));
            prop_assert!((0.0..=1.0).contains(&ca2));
        }
    }
}
