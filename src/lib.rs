// [[file:../vasp-series.note::*docs][docs:1]]
//! Relax crystal structures at a series of cell volumes with VASP.
//!
//! Each volume runs two relaxations and a final static calculation in its own
//! `vol_N` directory. The next volume starts from the relaxed structure, wave
//! functions and charge density of the previous one. Known VASP errors found
//! in its output are corrected by patching the input files and rerunning.
// docs:1 ends here

// [[file:../vasp-series.note::*mods][mods:1]]
mod cli;
mod plot;
mod process;

pub mod config;
pub mod custodian;
pub mod handlers;
pub mod incar;
pub mod job;
pub mod kpoints;
pub mod modder;
pub mod poscar;
pub mod summary;
pub mod vasp;
pub mod workflow;

pub(crate) mod common {
    pub use anyhow::Error;
    pub use gut::prelude::*;
    pub use std::path::{Path, PathBuf};
}
// mods:1 ends here

// [[file:../vasp-series.note::*pub][pub:1]]
pub use crate::cli::*;
// pub:1 ends here
