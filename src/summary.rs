// [[file:../vasp-series.note::*docs][docs:1]]
//! Collect volume, pressure and energy of a finished volume series.
// docs:1 ends here

// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;
use crate::vasp::outcar::{extract_energy, extract_pressure, extract_volume};
use crate::workflow::{volume_dir, volume_finished, FINAL_SUFFIX};

use serde::Serialize;
use std::fmt::Write;
// imports:1 ends here

// [[file:../vasp-series.note::*base][base:1]]
/// Results of the static calculation at one volume.
#[derive(Debug, Clone, Serialize)]
pub struct VolumePoint {
    pub index: usize,
    /// Å^3
    pub volume: f64,
    /// kB
    pub pressure: f64,
    /// eV
    pub energy: f64,
}

impl VolumePoint {
    /// Read results in volume directory `dir`.
    pub fn from_dir(index: usize, dir: &Path) -> Result<Self> {
        let outcar = dir.join(format!("OUTCAR{}", FINAL_SUFFIX));
        let oszicar = dir.join(format!("OSZICAR{}", FINAL_SUFFIX));
        Ok(Self {
            index,
            volume: extract_volume(&outcar)?,
            pressure: extract_pressure(&outcar)?,
            energy: extract_energy(&oszicar)?,
        })
    }
}
// base:1 ends here

// [[file:../vasp-series.note::*collect][collect:1]]
/// Collect results from `vol_0`, `vol_1`, ... under `path`, until the first
/// missing directory. Unfinished volumes are skipped.
pub fn collect_series(path: &Path) -> Result<Vec<VolumePoint>> {
    let mut points = vec![];
    for i in 0.. {
        let dir = volume_dir(path, i);
        if !dir.is_dir() {
            break;
        }
        if !volume_finished(&dir) {
            warn!("{:?} not finished yet, skipped.", dir);
            continue;
        }
        points.push(VolumePoint::from_dir(i, &dir)?);
    }
    if points.is_empty() {
        bail!("no finished volume calculation found in {:?}", path);
    }

    Ok(points)
}

/// Format `points` as a plain text table.
pub fn format_table(points: &[VolumePoint]) -> String {
    let mut s = String::new();
    let _ = writeln!(&mut s, "# {:>5} {:>14} {:>14} {:>16}", "index", "volume(A^3)", "pressure(kB)", "energy(eV)");
    for p in points {
        let _ = writeln!(
            &mut s,
            "  {:>5} {:>14.4} {:>14.2} {:>16.8}",
            p.index, p.volume, p.pressure, p.energy
        );
    }
    s
}

/// Plot energy against volume in terminal.
pub fn plot_energy_volume(points: &[VolumePoint]) -> Result<String> {
    let x: Vec<_> = points.iter().map(|p| p.volume).collect();
    let y: Vec<_> = points.iter().map(|p| p.energy).collect();
    crate::plot::AsciiPlot::default()
        .title("Energy vs volume")
        .xlabel("volume (A^3)")
        .ylabel("energy (eV)")
        .plot(&x, &y)
}
// collect:1 ends here

// [[file:../vasp-series.note::*test][test:1]]
#[test]
fn test_collect_series() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let d = dir.path();
    for i in 0..3 {
        let vd = volume_dir(d, i);
        std::fs::create_dir(&vd)?;
        // vol_1 has not finished
        if i != 1 {
            std::fs::copy("./tests/files/OUTCAR", vd.join("OUTCAR.3static"))?;
            std::fs::copy("./tests/files/OSZICAR", vd.join("OSZICAR.3static"))?;
        }
    }

    let points = collect_series(d)?;
    assert_eq!(points.len(), 2);
    assert_eq!(points[1].index, 2);
    assert_eq!(points[0].pressure, -7.03);

    let table = format_table(&points);
    assert_eq!(table.lines().count(), 3);
    assert!(table.contains("331.5400"));

    let empty = tempfile::tempdir()?;
    assert!(collect_series(empty.path()).is_err());

    Ok(())
}
// test:1 ends here
