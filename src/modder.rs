// [[file:../vasp-series.note::*docs][docs:1]]
//! Modifications on VASP input files before (re)running a job
// docs:1 ends here

// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;
use crate::incar::{update_incar_file, Incar};

use serde::Serialize;
// imports:1 ends here

// [[file:../vasp-series.note::*action][action:1]]
/// An modification applied in a job directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Action {
    /// Set INCAR tag to value
    SetIncar(String, String),
    /// Remove INCAR tag
    UnsetIncar(String),
    /// Multiply a numeric INCAR tag by a factor. The default value is used
    /// when the tag is absent.
    ScaleIncar { tag: String, factor: f64, default: f64 },
    /// Copy file `src` to `dest`, both relative to the job directory
    CopyFile { src: String, dest: String },
    /// Remove file if it exists
    DeleteFile(String),
    /// Exchange the first two lattice vectors in POSCAR
    SwapLatticeAB,
    /// Switch Monkhorst-Pack mesh to Gamma centered in KPOINTS
    GammaCenteredKpoints,
}

impl Action {
    pub fn set_incar(tag: &str, value: impl std::fmt::Display) -> Self {
        Action::SetIncar(tag.to_uppercase(), value.to_string())
    }

    pub fn copy_file(src: &str, dest: &str) -> Self {
        Action::CopyFile {
            src: src.into(),
            dest: dest.into(),
        }
    }

    pub fn delete_file(name: &str) -> Self {
        Action::DeleteFile(name.into())
    }
}
// action:1 ends here

// [[file:../vasp-series.note::*apply][apply:1]]
/// Apply `actions` in order to files in `dir`.
pub fn apply_actions(dir: &Path, actions: &[Action]) -> Result<()> {
    for action in actions {
        debug!("apply {:?} in {:?}", action, dir);
        let incar = dir.join("INCAR");
        match action {
            Action::SetIncar(tag, value) => update_incar_file(&incar, |incar| incar.set(tag, value))?,
            Action::UnsetIncar(tag) => update_incar_file(&incar, |incar| {
                incar.remove(tag);
            })?,
            Action::ScaleIncar { tag, factor, default } => update_incar_file(&incar, |incar| {
                let old = incar.get_f64(tag).unwrap_or(*default);
                incar.set(tag, &format!("{}", old * factor));
            })?,
            Action::CopyFile { src, dest } => {
                let src = dir.join(src);
                let dest = dir.join(dest);
                if src.is_file() {
                    std::fs::copy(&src, &dest).with_context(|| format!("copy {:?} to {:?}", src, dest))?;
                } else {
                    warn!("file {:?} not found, skip copying to {:?}", src, dest);
                }
            }
            Action::DeleteFile(name) => {
                let path = dir.join(name);
                if path.is_file() {
                    std::fs::remove_file(&path).with_context(|| format!("remove {:?}", path))?;
                }
            }
            Action::SwapLatticeAB => {
                let path = dir.join("POSCAR");
                let mut poscar = crate::poscar::Poscar::from_file(&path)?;
                poscar.swap_lattice_ab();
                poscar.to_file(&path)?;
            }
            Action::GammaCenteredKpoints => {
                let path = dir.join("KPOINTS");
                if !crate::kpoints::set_gamma_centered(&path)? {
                    warn!("KPOINTS {:?} not changed", path);
                }
            }
        }
    }

    Ok(())
}
// apply:1 ends here

// [[file:../vasp-series.note::*test][test:1]]
#[test]
fn test_apply_actions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let d = dir.path();
    gut::fs::write_to_file(d.join("INCAR"), "IBRION = 2\nNSW = 99\nPOTIM = 0.4\nNPAR = 4\n")?;
    gut::fs::write_to_file(d.join("CONTCAR"), "contcar")?;
    gut::fs::write_to_file(d.join("WAVECAR"), "")?;

    let actions = vec![
        Action::set_incar("ibrion", -1),
        Action::set_incar("NSW", 0),
        Action::set_incar("ISMEAR", -5),
        Action::UnsetIncar("NPAR".into()),
        Action::ScaleIncar {
            tag: "POTIM".into(),
            factor: 0.5,
            default: 0.5,
        },
        Action::copy_file("CONTCAR", "POSCAR"),
        Action::copy_file("CHGCAR", "CHGCAR.bak"),
        Action::delete_file("WAVECAR"),
    ];
    apply_actions(d, &actions)?;

    let incar = Incar::from_file(d.join("INCAR"))?;
    assert_eq!(incar.get("IBRION"), Some("-1"));
    assert_eq!(incar.get("NSW"), Some("0"));
    assert_eq!(incar.get("ISMEAR"), Some("-5"));
    assert_eq!(incar.get("NPAR"), None);
    assert_eq!(incar.get_f64("POTIM"), Some(0.2));
    assert_eq!(gut::fs::read_file(d.join("POSCAR"))?, "contcar");
    assert!(!d.join("CHGCAR.bak").exists());
    assert!(!d.join("WAVECAR").exists());

    Ok(())
}

#[test]
fn test_apply_structure_actions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let d = dir.path();
    std::fs::copy("./tests/files/POSCAR", d.join("POSCAR"))?;
    std::fs::copy("./tests/files/KPOINTS", d.join("KPOINTS"))?;

    apply_actions(d, &[Action::SwapLatticeAB, Action::GammaCenteredKpoints])?;

    let poscar = crate::poscar::Poscar::from_file(d.join("POSCAR"))?;
    assert_eq!(poscar.lattice()[0], [0.0, 5.0, 0.0]);
    assert_eq!(poscar.lattice()[1], [5.0, 0.0, 0.0]);
    assert_eq!(poscar.positions()[1], [0.5, 0.5, 0.5]);
    let kpoints = gut::fs::read_file(d.join("KPOINTS"))?;
    assert!(kpoints.lines().nth(2).unwrap().trim_start().starts_with('G'));

    // already Gamma centered
    apply_actions(d, &[Action::GammaCenteredKpoints])?;
    assert_eq!(gut::fs::read_file(d.join("KPOINTS"))?, kpoints);

    Ok(())
}
// test:1 ends here
