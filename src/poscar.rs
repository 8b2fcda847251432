// [[file:../vasp-series.note::*docs][docs:1]]
//! Read, rescale and write VASP POSCAR/CONTCAR files
// docs:1 ends here

// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;

use vasp_poscar::{Coords, RawPoscar, ScaleLine};
// imports:1 ends here

// [[file:../vasp-series.note::*base][base:1]]
/// Crystal structure in VASP POSCAR format.
///
/// Lattice vectors and Cartesian positions are stored with the scale factor
/// applied, so the written POSCAR always carries a scale factor of 1.0.
#[derive(Debug, Clone)]
pub struct Poscar {
    raw: RawPoscar,
}

impl Poscar {
    /// Access the underlying POSCAR data.
    pub fn raw(&self) -> &RawPoscar {
        &self.raw
    }

    /// Lattice vectors in rows, in Å
    pub fn lattice(&self) -> &[[f64; 3]; 3] {
        &self.raw.lattice_vectors
    }

    /// Atom positions, fractional or Cartesian in Å
    pub fn positions(&self) -> &[[f64; 3]] {
        match &self.raw.positions {
            Coords::Cart(p) | Coords::Frac(p) => p,
        }
    }

    pub fn is_cartesian(&self) -> bool {
        matches!(self.raw.positions, Coords::Cart(_))
    }
}
// base:1 ends here

// [[file:../vasp-series.note::*math][math:1]]
fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cell_volume(lattice: &[[f64; 3]; 3]) -> f64 {
    dot(lattice[0], cross(lattice[1], lattice[2])).abs()
}
// math:1 ends here

// [[file:../vasp-series.note::*parse][parse:1]]
/// Replace a scale line of three factors for x, y, z with 1.0, and return the
/// factors to be applied after parsing.
fn split_axis_scales(s: &str) -> Result<(String, Option<[f64; 3]>)> {
    let mut lines: Vec<&str> = s.lines().collect();
    let factors: Vec<f64> = match lines.get(1) {
        Some(line) => line.split_whitespace().map_while(|x| x.parse().ok()).collect(),
        None => return Ok((s.to_string(), None)),
    };
    if factors.len() < 3 {
        return Ok((s.to_string(), None));
    }
    if factors[..3].iter().any(|&x| !(x > 0.0)) {
        bail!("POSCAR: scale factors must be positive when three are given");
    }
    lines[1] = "1.0";
    let mut txt = lines.join("\n");
    txt.push('\n');

    Ok((txt, Some([factors[0], factors[1], factors[2]])))
}

impl std::str::FromStr for Poscar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (txt, axis_scales) = split_axis_scales(s)?;
        let poscar =
            vasp_poscar::Poscar::from_reader(txt.as_bytes()).map_err(|e| format_err!("invalid POSCAR: {}", e))?;

        // normalize to unit scale factor, including a negative one for volume
        let lattice_vectors = poscar.scaled_lattice_vectors();
        let positions = match poscar.scaled_positions() {
            Coords::Cart(p) => Coords::Cart(p.to_vec()),
            Coords::Frac(p) => Coords::Frac(p.to_vec()),
        };
        let mut raw = poscar.into_raw();
        raw.scale = ScaleLine::Factor(1.0);
        raw.lattice_vectors = lattice_vectors;
        raw.positions = positions;
        // not needed for restarting from CONTCAR
        raw.velocities = None;

        if let Some(f) = axis_scales {
            for v in raw.lattice_vectors.iter_mut() {
                for k in 0..3 {
                    v[k] *= f[k];
                }
            }
            if let Coords::Cart(p) = &mut raw.positions {
                for x in p.iter_mut() {
                    for k in 0..3 {
                        x[k] *= f[k];
                    }
                }
            }
        }

        if !(cell_volume(&raw.lattice_vectors) > 0.0) {
            bail!("POSCAR: degenerated lattice vectors");
        }

        Ok(Self { raw })
    }
}

impl Poscar {
    /// Read POSCAR (or CONTCAR) from `path`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = gut::fs::read_file(path).with_context(|| format!("read POSCAR {:?}", path))?;
        s.parse().with_context(|| format!("parse POSCAR {:?}", path))
    }
}
// parse:1 ends here

// [[file:../vasp-series.note::*volume][volume:1]]
impl Poscar {
    /// Return the cell volume in Å^3.
    pub fn volume(&self) -> f64 {
        cell_volume(&self.raw.lattice_vectors)
    }

    /// Scale the lattice isotropically to `volume`. Fractional coordinates
    /// are kept, Cartesian coordinates scale with the lattice.
    pub fn scale_lattice(&mut self, volume: f64) -> Result<()> {
        if !(volume > 0.0) {
            bail!("invalid target volume: {}", volume);
        }
        let v0 = self.volume();
        let f = (volume / v0).cbrt();
        debug!("scale lattice from {:.4} to {:.4} (factor = {:.6})", v0, volume, f);
        for v in self.raw.lattice_vectors.iter_mut() {
            v.iter_mut().for_each(|x| *x *= f);
        }
        if let Coords::Cart(p) = &mut self.raw.positions {
            for x in p.iter_mut() {
                x.iter_mut().for_each(|x| *x *= f);
            }
        }

        Ok(())
    }

    /// Exchange the first two lattice vectors, which flips the handedness of
    /// the cell.
    pub fn swap_lattice_ab(&mut self) {
        self.raw.lattice_vectors.swap(0, 1);
        // fractional coordinates follow the lattice vectors
        if let Coords::Frac(p) = &mut self.raw.positions {
            p.iter_mut().for_each(|x| x.swap(0, 1));
            if let Some(dynamics) = &mut self.raw.dynamics {
                dynamics.iter_mut().for_each(|x| x.swap(0, 1));
            }
        }
    }
}
// volume:1 ends here

// [[file:../vasp-series.note::*write][write:1]]
impl Poscar {
    fn validated(&self) -> Result<vasp_poscar::Poscar> {
        let poscar = self
            .raw
            .clone()
            .validate()
            .map_err(|e| format_err!("invalid POSCAR data: {}", e))?;
        Ok(poscar)
    }

    /// Format as POSCAR text.
    pub fn format(&self) -> Result<String> {
        Ok(self.validated()?.to_string())
    }

    /// Write as POSCAR file in `path`
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        gut::fs::write_to_file(path, &self.format()?).with_context(|| format!("write POSCAR {:?}", path))?;
        Ok(())
    }
}

/// Rescale POSCAR in `path` to `volume` in place.
pub fn scale_poscar_file(path: &Path, volume: f64) -> Result<()> {
    let mut poscar = Poscar::from_file(path)?;
    info!("rescale {:?}: {:.3} => {:.3} A^3", path, poscar.volume(), volume);
    poscar.scale_lattice(volume)?;
    poscar.to_file(path)?;

    Ok(())
}
// write:1 ends here

// [[file:../vasp-series.note::*test][test:1]]
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const POSCAR: &str = "Fe2 O3
1.0
  5.0000000000  0.0000000000  0.0000000000
  0.0000000000  5.0000000000  0.0000000000
  0.0000000000  0.0000000000  4.0000000000
 Fe O
 2 3
Direct
  0.0 0.0 0.0
  0.5 0.5 0.5
  0.1 0.2 0.3
  0.3 0.2 0.1
  0.25 0.25 0.0

  0.00000000E+00  0.00000000E+00  0.00000000E+00
  0.00000000E+00  0.00000000E+00  0.00000000E+00
  0.00000000E+00  0.00000000E+00  0.00000000E+00
  0.00000000E+00  0.00000000E+00  0.00000000E+00
  0.00000000E+00  0.00000000E+00  0.00000000E+00
";

    #[test]
    fn test_poscar_parse() -> Result<()> {
        let poscar: Poscar = POSCAR.parse()?;
        assert_eq!(poscar.raw().comment, "Fe2 O3");
        assert_eq!(poscar.raw().group_counts, vec![2, 3]);
        assert_eq!(poscar.raw().group_symbols.as_ref().map(|x| x.len()), Some(2));
        assert_eq!(poscar.positions().len(), 5);
        assert!(!poscar.is_cartesian());
        assert!(poscar.raw().velocities.is_none());
        assert_relative_eq!(poscar.volume(), 100.0, epsilon = 1e-8);

        Ok(())
    }

    #[test]
    fn test_poscar_scale_lattice() -> Result<()> {
        let mut poscar: Poscar = POSCAR.parse()?;
        poscar.scale_lattice(80.0)?;
        assert_relative_eq!(poscar.volume(), 80.0, epsilon = 1e-8);
        // fractional coordinates are untouched
        assert_eq!(poscar.positions()[2], [0.1, 0.2, 0.3]);
        // axial ratio is kept
        assert_relative_eq!(poscar.lattice()[0][0] / poscar.lattice()[2][2], 1.25, epsilon = 1e-10);

        // written file carries unit scale factor
        let s = poscar.format()?;
        let poscar2: Poscar = s.parse()?;
        assert_relative_eq!(poscar2.volume(), 80.0, epsilon = 1e-8);
        let scale: f64 = s.lines().nth(1).unwrap().trim().parse()?;
        assert_eq!(scale, 1.0);

        assert!(poscar.scale_lattice(0.0).is_err());
        assert!(poscar.scale_lattice(-10.0).is_err());

        Ok(())
    }

    #[test]
    fn test_poscar_negative_scale() -> Result<()> {
        let txt = POSCAR.replacen("1.0", "-200.0", 1);
        let poscar: Poscar = txt.parse()?;
        assert_relative_eq!(poscar.volume(), 200.0, epsilon = 1e-8);

        Ok(())
    }

    #[test]
    fn test_poscar_axis_scales() -> Result<()> {
        let txt = "xyz
2.0 1.0 0.5
 2.0 0.0 0.0
 0.0 3.0 0.0
 0.0 0.0 4.0
H
2
Cartesian
 1.0 1.0 1.0
 0.0 0.0 0.0
";
        let poscar: Poscar = txt.parse()?;
        assert_relative_eq!(poscar.lattice()[0][0], 4.0, epsilon = 1e-10);
        assert_relative_eq!(poscar.lattice()[2][2], 2.0, epsilon = 1e-10);
        assert_relative_eq!(poscar.volume(), 24.0, epsilon = 1e-8);
        assert_eq!(poscar.positions()[0], [2.0, 1.0, 0.5]);

        let poscar2: Poscar = poscar.format()?.parse()?;
        assert_relative_eq!(poscar2.volume(), 24.0, epsilon = 1e-8);

        let bad = txt.replacen("2.0 1.0 0.5", "2.0 -1.0 0.5", 1);
        assert!(bad.parse::<Poscar>().is_err());

        Ok(())
    }

    #[test]
    fn test_poscar_cartesian_selective() -> Result<()> {
        let txt = "H2
2.0
 2.0 0.0 0.0
 0.0 2.0 0.0
 0.0 0.0 2.0
2
Selective dynamics
Cartesian
 0.0 0.0 0.0 T T F
 0.5 0.5 0.5 F F F
";
        let mut poscar: Poscar = txt.parse()?;
        assert!(poscar.raw().group_symbols.is_none());
        assert!(poscar.is_cartesian());
        assert_relative_eq!(poscar.volume(), 64.0, epsilon = 1e-8);
        assert_eq!(poscar.positions()[1], [1.0, 1.0, 1.0]);

        poscar.scale_lattice(8.0)?;
        assert_relative_eq!(poscar.positions()[1][0], 0.5, epsilon = 1e-10);

        let poscar2: Poscar = poscar.format()?.parse()?;
        assert_eq!(poscar2.raw().dynamics, poscar.raw().dynamics);
        assert_eq!(poscar2.raw().dynamics.as_ref().map(|x| x[0]), Some([true, true, false]));

        Ok(())
    }

    #[test]
    fn test_poscar_cartesian_large_coords() -> Result<()> {
        let txt = "CO
1.0
 200.0 0.0 0.0
 0.0 200.0 0.0
 0.0 0.0 200.0
C O
1 1
Cartesian
 -12.5 3.0 4.0
 150.0 -11.0 1.0
";
        let poscar: Poscar = txt.parse()?;
        let poscar2: Poscar = poscar.format()?.parse()?;
        assert_eq!(poscar2.positions(), poscar.positions());
        assert_eq!(poscar2.positions()[1], [150.0, -11.0, 1.0]);
        assert_eq!(poscar2.lattice(), poscar.lattice());

        Ok(())
    }

    #[test]
    fn test_poscar_swap_ab() -> Result<()> {
        let mut poscar: Poscar = POSCAR.parse()?;
        poscar.swap_lattice_ab();
        assert_eq!(poscar.lattice()[0], [0.0, 5.0, 0.0]);
        assert_eq!(poscar.positions()[2], [0.2, 0.1, 0.3]);
        assert_relative_eq!(poscar.volume(), 100.0, epsilon = 1e-8);

        Ok(())
    }

    #[test]
    fn test_poscar_truncated() {
        let txt: String = POSCAR.lines().take(10).collect::<Vec<_>>().join("\n");
        assert!(txt.parse::<Poscar>().is_err());
    }
}
// test:1 ends here
