use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::config::RunConfiguration;
use crate::photon::PhotonPacket;

/// Dense 2-D accumulator grid, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Grid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// One row as a slice, for matrix serialization.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        self[(i, j)] += value;
    }

    /// Elementwise sum of another grid of the same shape.
    pub fn merge(&mut self, other: &Grid) {
        debug_assert_eq!((self.rows, self.cols), (other.rows, other.cols));
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    /// Sum over all cells.
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Per-row sums (collapses the column axis). Length `rows`.
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.rows).map(|i| self.row(i).iter().sum()).collect()
    }

    /// Per-column sums (collapses the row axis). Length `cols`.
    pub fn column_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.cols];
        for i in 0..self.rows {
            for (s, v) in sums.iter_mut().zip(self.row(i)) {
                *s += v;
            }
        }
        sums
    }
}

impl Index<(usize, usize)> for Grid {
    type Output = f64;
    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        &self.data[i * self.cols + j]
    }
}

impl IndexMut<(usize, usize)> for Grid {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f64 {
        &mut self.data[i * self.cols + j]
    }
}

/// Time-resolved photon-weight frames: (time, lateral x bin, depth bin).
///
/// The lateral axis spans `2 * nr` bins centred on the beam axis so both
/// sides of the source are captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    nt: usize,
    nx: usize,
    nz: usize,
    data: Vec<f64>,
}

impl TimeGrid {
    pub fn new(nt: usize, nx: usize, nz: usize) -> Self {
        Self {
            nt,
            nx,
            nz,
            data: vec![0.0; nt * nx * nz],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn frames(&self) -> usize {
        self.nt
    }

    pub fn at(&self, t: usize, ix: usize, iz: usize) -> f64 {
        self.data[(t * self.nx + ix) * self.nz + iz]
    }

    pub fn add(&mut self, t: usize, ix: usize, iz: usize, value: f64) {
        self.data[(t * self.nx + ix) * self.nz + iz] += value;
    }

    pub fn merge(&mut self, other: &TimeGrid) {
        debug_assert_eq!((self.nt, self.nx, self.nz), (other.nt, other.nx, other.nz));
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }

    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }
}

/// Raw additive accumulators for one worker.
///
/// Every update is an addition, so merging tallies from independent workers
/// is an elementwise sum and the result does not depend on which worker
/// recorded which photon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    /// Absorbed weight by (radial, depth) bin.
    pub a_rz: Grid,
    /// Diffusely reflected weight by (radial, exit angle) bin.
    pub rd_ra: Grid,
    /// Diffusely transmitted weight by (radial, exit angle) bin.
    pub tt_ra: Grid,
    /// Reflected weight that never scattered.
    pub rd_unscattered: f64,
    /// Transmitted weight that never scattered.
    pub tt_unscattered: f64,
    /// Time-resolved weight field; empty when `nt == 0`.
    pub w_txz: TimeGrid,
    /// Photon packets launched into this tally.
    pub photons: u64,
}

impl Tally {
    pub fn new(config: &RunConfiguration) -> Self {
        Self {
            a_rz: Grid::new(config.nr, config.nz),
            rd_ra: Grid::new(config.nr, config.na),
            tt_ra: Grid::new(config.nr, config.na),
            rd_unscattered: 0.0,
            tt_unscattered: 0.0,
            w_txz: TimeGrid::new(config.nt, config.nr * 2, config.nz),
            photons: 0,
        }
    }

    /// Elementwise sum of another tally over the same grids.
    pub fn merge(&mut self, other: &Tally) {
        self.a_rz.merge(&other.a_rz);
        self.rd_ra.merge(&other.rd_ra);
        self.tt_ra.merge(&other.tt_ra);
        self.rd_unscattered += other.rd_unscattered;
        self.tt_unscattered += other.tt_unscattered;
        self.w_txz.merge(&other.w_txz);
        self.photons += other.photons;
    }

    /// Records the packet weight into frame `tick` of the time-resolved
    /// field. Packets outside the captured window are skipped.
    pub fn record_frame(&mut self, tick: usize, photon: &PhotonPacket, config: &RunConfiguration) {
        if self.w_txz.is_empty() {
            return;
        }
        let ix = (photon.x / config.dr).round() as i64 + config.nr as i64;
        let iz = (photon.z / config.dz).floor() as i64;
        if ix >= 0 && (ix as usize) < config.nr * 2 && iz >= 0 && (iz as usize) < config.nz {
            self.w_txz.add(tick, ix as usize, iz as usize, photon.weight);
        }
    }
}
