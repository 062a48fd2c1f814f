use std::sync::Arc;

use crate::config::RunConfiguration;
use crate::engine;
use crate::photon::{PhotonPacket, Termination};
use crate::rng::RandomSource;
use crate::tally::Tally;

/// Worker-local simulation core: one random stream, one accumulator set.
///
/// Many cores run concurrently without any synchronization; their tallies
/// are merged once the run completes.
pub struct SimulationCore {
    config: Arc<RunConfiguration>,
    rng: RandomSource,
    tally: Tally,
    r_specular: f64,
}

impl SimulationCore {
    /// The configuration must already be prepared (derived layer fields
    /// filled in).
    pub fn new(config: Arc<RunConfiguration>, seed: u64) -> Self {
        let r_specular = engine::specular_reflectance(&config.layers);
        let tally = Tally::new(&config);
        Self {
            config,
            rng: RandomSource::new(seed),
            tally,
            r_specular,
        }
    }

    /// Runs one packet's random walk to its terminal state.
    pub fn launch_photon(&mut self) -> Termination {
        self.tally.photons += 1;

        let mut photon = PhotonPacket::new();
        engine::launch(&self.config, self.r_specular, &mut photon);

        let mut tick = 0;
        loop {
            let outcome =
                engine::hop_drop_spin(&self.config, &mut photon, &mut self.tally, &mut self.rng);
            if tick < self.config.nt {
                self.tally.record_frame(tick, &photon, &self.config);
            }
            tick += 1;
            if let Some(termination) = outcome {
                return termination;
            }
        }
    }

    /// Launches `n` packets back to back.
    pub fn run_photons(&mut self, n: u64) {
        for _ in 0..n {
            self.launch_photon();
        }
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    pub fn into_tally(self) -> Tally {
        self.tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerSpec;

    fn prepared(mut config: RunConfiguration) -> Arc<RunConfiguration> {
        config.layers = vec![
            LayerSpec::ambient(1.0),
            LayerSpec::new(1.37, 1.0, 100.0, 0.9, 0.2),
            LayerSpec::ambient(1.0),
        ];
        Arc::new(config.prepare().unwrap())
    }

    #[test]
    fn test_same_seed_reproduces_tally() {
        let config = prepared(RunConfiguration::new());
        let mut a = SimulationCore::new(Arc::clone(&config), 99);
        let mut b = SimulationCore::new(Arc::clone(&config), 99);
        a.run_photons(500);
        b.run_photons(500);
        assert_eq!(a.tally(), b.tally());
    }

    #[test]
    fn test_different_seeds_differ() {
        let config = prepared(RunConfiguration::new());
        let mut a = SimulationCore::new(Arc::clone(&config), 1);
        let mut b = SimulationCore::new(Arc::clone(&config), 2);
        a.run_photons(500);
        b.run_photons(500);
        assert_ne!(a.tally(), b.tally());
    }

    #[test]
    fn test_every_photon_reaches_a_terminal_state() {
        let config = prepared(RunConfiguration::new());
        let mut core = SimulationCore::new(config, 5);
        let mut reflected = 0;
        let mut transmitted = 0;
        let mut killed = 0;
        for _ in 0..2000 {
            match core.launch_photon() {
                Termination::Reflected => reflected += 1,
                Termination::Transmitted => transmitted += 1,
                Termination::Killed => killed += 1,
            }
        }
        assert_eq!(reflected + transmitted + killed, 2000);
        assert_eq!(core.tally().photons, 2000);
        // A thin scattering slab lets packets out on both sides.
        assert!(reflected > 0);
        assert!(transmitted > 0);
    }

    #[test]
    fn test_time_resolved_frames_fill_when_enabled() {
        let mut config = RunConfiguration::new();
        config.nt = 8;
        let config = prepared(config);
        let mut core = SimulationCore::new(config, 17);
        core.run_photons(200);
        assert_eq!(core.tally().w_txz.frames(), 8);
        assert!(core.tally().w_txz.total() > 0.0);
    }

    #[test]
    fn test_weight_ends_up_somewhere() {
        let config = prepared(RunConfiguration::new());
        let mut core = SimulationCore::new(config, 23);
        core.run_photons(2000);
        let tally = core.tally();
        let accounted = tally.a_rz.total()
            + tally.rd_ra.total()
            + tally.tt_ra.total()
            + tally.rd_unscattered
            + tally.tt_unscattered;
        // Launched weight (after specular loss) is deposited or escapes;
        // the roulette only redistributes it in expectation.
        let rsp = engine::specular_reflectance(&core.config.layers);
        let launched = 2000.0 * (1.0 - rsp);
        assert!(
            (accounted - launched).abs() < 0.02 * launched,
            "accounted {accounted} vs launched {launched}"
        );
    }
}
