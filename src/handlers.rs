// [[file:../vasp-series.note::*docs][docs:1]]
//! Detect VASP errors in job output and propose corrections.
// docs:1 ends here

// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;
use crate::incar::Incar;
use crate::modder::Action;

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
// imports:1 ends here

// [[file:../vasp-series.note::*trait][trait:1]]
/// The corrections for detected errors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Correction {
    pub errors: Vec<String>,
    /// Empty actions means the errors cannot be fixed.
    pub actions: Vec<Action>,
}

impl Correction {
    pub fn is_recoverable(&self) -> bool {
        !self.actions.is_empty()
    }
}

/// Check the state of a job in a directory and fix its inputs on errors.
pub trait ErrorHandler: Send {
    fn name(&self) -> &str;

    /// Monitor handlers are also checked while the job is running.
    fn is_monitor(&self) -> bool {
        false
    }

    /// Return true if any error found in `dir`.
    fn check(&mut self, dir: &Path) -> Result<bool>;

    /// Return the correction for the errors found in last `check`.
    fn correct(&mut self, dir: &Path) -> Result<Correction>;
}
// trait:1 ends here

// [[file:../vasp-series.note::*messages][messages:1]]
/// Known VASP error keys and the messages printed to stdout.
pub const ERROR_MSGS: &[(&str, &[&str])] = &[
    (
        "tet",
        &[
            "Tetrahedron method fails",
            "tetrahedron method fails",
            "Fatal error detecting k-mesh",
            "Fatal error: unable to match k-point",
            "Routine TETIRR needs special values",
            "Tetrahedron method fails (number of k-points < 4)",
            "BZINTS",
        ],
    ),
    ("inv_rot_mat", &["rotation matrix was not found (increase SYMPREC)"]),
    ("brmix", &["BRMIX: very serious problems"]),
    ("subspacematrix", &["WARNING: Sub-Space-Matrix is not hermitian in DAV"]),
    ("tetirr", &["Routine TETIRR needs special values"]),
    ("incorrect_shift", &["Could not get correct shifts"]),
    ("real_optlay", &["REAL_OPTLAY: internal error", "REAL_OPT: internal ERROR"]),
    ("rspher", &["ERROR RSPHER"]),
    ("dentet", &["DENTET"]),
    ("too_few_bands", &["TOO FEW BANDS"]),
    ("triple_product", &["ERROR: the triple product of the basis vectors"]),
    ("rot_matrix", &["Found some non-integer element in rotation matrix", "SGRCON"]),
    ("brions", &["BRIONS problems: POTIM should be increased"]),
    ("pricel", &["internal error in subroutine PRICEL"]),
    ("zpotrf", &["LAPACK: Routine ZPOTRF failed", "Routine ZPOTRF ZTRTRI"]),
    ("amin", &["One of the lattice vectors is very long (>50 A), but AMIN"]),
    ("zbrent", &["ZBRENT: fatal internal in", "ZBRENT: fatal error in bracketing"]),
    ("pssyevx", &["ERROR in subspace rotation PSSYEVX"]),
    ("eddrmm", &["WARNING in EDDRMM: call to ZHEGV failed"]),
    ("edddav", &["Error EDDDAV: Call to ZHEGV failed"]),
    ("algo_tet", &["ALGO=A and IALGO=5X tend to fail"]),
    ("grad_not_orth", &["EDWAV: internal error, the gradient is not orthogonal"]),
    ("nicht_konv", &["ERROR: SBESSELITER : nicht konvergent"]),
    ("zheev", &["ERROR EDDIAG: Call to routine ZHEEV failed!"]),
    ("eddiag", &["ERROR in EDDIAG: call to ZHEEV/ZHEEVX/DSYEV/DSYEVX failed"]),
    ("elf_kpar", &["ELF: KPAR>1 not implemented"]),
    ("elf_ncl", &["WARNING: ELF not implemented for non collinear case"]),
    ("rhosyg", &["RHOSYG"]),
    ("posmap", &["POSMAP"]),
    ("point_group", &["group operation missing"]),
    ("symprec_noise", &["determination of the symmetry of your systems shows a strong"]),
    (
        "dfpt_ncore",
        &["PEAD routines do not work for NCORE", "remove the tag NPAR from the INCAR file"],
    ),
    ("bravais", &["Inconsistent Bravais lattice"]),
    ("hnform", &["HNFORM: k-point generating"]),
    ("coef", &["while reading plane", "while reading WAVECAR"]),
    ("set_core_wf", &["internal error in SET_CORE_WF"]),
    ("read_error", &["Error reading item", "Error code was IERR= 5"]),
];

/// Return all known error keys.
pub fn all_error_keys() -> Vec<&'static str> {
    ERROR_MSGS.iter().map(|(k, _)| *k).collect()
}
// messages:1 ends here

// [[file:../vasp-series.note::*base][base:1]]
/// Scan VASP stdout for known error messages.
#[derive(Debug, Clone)]
pub struct VaspErrorHandler {
    output_file: String,
    errors_subset: Vec<&'static str>,
    // errors found in the last check
    errors: BTreeSet<&'static str>,
    // how many times each error was corrected
    error_count: HashMap<&'static str, usize>,
}

impl Default for VaspErrorHandler {
    fn default() -> Self {
        Self {
            output_file: "vasp.out".into(),
            errors_subset: all_error_keys(),
            errors: BTreeSet::new(),
            error_count: HashMap::new(),
        }
    }
}

impl VaspErrorHandler {
    /// Catch all known errors except those in `skipped`.
    pub fn excluding(skipped: &[&str]) -> Result<Self> {
        let known = all_error_keys();
        for k in skipped {
            if !known.contains(k) {
                bail!("unknown VASP error key: {:?}", k);
            }
        }
        let errors_subset = known.into_iter().filter(|k| !skipped.contains(k)).collect();
        Ok(Self {
            errors_subset,
            ..Self::default()
        })
    }

    /// Set the file capturing VASP stdout.
    pub fn with_output_file(mut self, output_file: &str) -> Self {
        self.output_file = output_file.into();
        self
    }

    /// Errors detected in the last check
    pub fn detected(&self) -> Vec<&'static str> {
        self.errors.iter().copied().collect()
    }
}
// base:1 ends here

// [[file:../vasp-series.note::*check][check:1]]
impl VaspErrorHandler {
    fn scan(&self, text: &str) -> BTreeSet<&'static str> {
        let mut found = BTreeSet::new();
        for line in text.lines() {
            for (key, msgs) in ERROR_MSGS.iter() {
                if !self.errors_subset.contains(key) {
                    continue;
                }
                if msgs.iter().any(|m| line.contains(m)) {
                    found.insert(*key);
                }
            }
        }
        found
    }
}
// check:1 ends here

// [[file:../vasp-series.note::*correct][correct:1]]
impl VaspErrorHandler {
    fn count(&mut self, key: &'static str) -> usize {
        let n = self.error_count.entry(key).or_insert(0);
        *n += 1;
        *n
    }

    /// The actions for one error. None for unrecoverable errors.
    fn actions_for(&mut self, key: &'static str, dir: &Path, incar: &Incar) -> Option<Vec<Action>> {
        let nth = self.count(key);
        let algo = incar.get("ALGO").unwrap_or("Normal").to_lowercase();

        let actions = match key {
            "tet" | "dentet" => vec![Action::set_incar("ISMEAR", 0), Action::set_incar("SIGMA", 0.05)],
            "algo_tet" => vec![
                Action::set_incar("ALGO", "Normal"),
                Action::set_incar("ISMEAR", 0),
                Action::set_incar("SIGMA", 0.05),
            ],
            "inv_rot_mat" => vec![Action::set_incar("SYMPREC", "1e-8")],
            "brmix" => match nth {
                1 if incar.get_i64("ISYM") != Some(0) => vec![Action::set_incar("ISYM", 0)],
                1 | 2 => vec![Action::set_incar("IMIX", 1)],
                _ => return None,
            },
            "subspacematrix" => {
                if incar.get("LREAL").map_or(false, |v| v.to_uppercase().contains('F')) {
                    vec![Action::set_incar("PREC", "Accurate")]
                } else {
                    vec![Action::set_incar("LREAL", ".FALSE.")]
                }
            }
            "tetirr" | "incorrect_shift" => vec![Action::GammaCenteredKpoints],
            "real_optlay" | "rspher" | "nicht_konv" => vec![Action::set_incar("LREAL", ".FALSE.")],
            "too_few_bands" => {
                let nbands = incar
                    .get_i64("NBANDS")
                    .map(|n| n as usize)
                    .or_else(|| crate::vasp::outcar::number_of_bands(&dir.join("OUTCAR")).ok())?;
                let nbands = ((nbands as f64) * 1.1).ceil() as usize;
                vec![Action::set_incar("NBANDS", nbands.max(1))]
            }
            "triple_product" => vec![Action::SwapLatticeAB],
            "rot_matrix" | "point_group" | "bravais" | "hnform" => vec![Action::set_incar("ISYM", 0)],
            "pricel" | "posmap" => vec![Action::set_incar("SYMPREC", "1e-8"), Action::set_incar("ISYM", 0)],
            "rhosyg" => {
                if incar.get("SYMPREC").is_some() {
                    vec![Action::set_incar("ISYM", 0)]
                } else {
                    vec![Action::set_incar("SYMPREC", "1e-4")]
                }
            }
            "symprec_noise" => vec![Action::set_incar("SYMPREC", "1e-6")],
            "brions" => {
                let potim = incar.get_f64("POTIM").unwrap_or(0.5) + 0.1;
                vec![Action::set_incar("POTIM", format!("{:.2}", potim))]
            }
            "zpotrf" => {
                let nsteps = crate::vasp::oszicar::Oszicar::from_file(dir.join("OSZICAR"))
                    .map(|o| o.nsteps())
                    .unwrap_or(0);
                let mut actions = if nsteps > 1 || nth > 1 {
                    vec![Action::ScaleIncar {
                        tag: "POTIM".into(),
                        factor: 0.5,
                        default: 0.5,
                    }]
                } else {
                    vec![Action::set_incar("ISYM", 0)]
                };
                actions.push(Action::delete_file("CHGCAR"));
                actions.push(Action::delete_file("WAVECAR"));
                actions
            }
            "amin" => vec![Action::set_incar("AMIN", 0.01)],
            "zbrent" => vec![Action::set_incar("IBRION", 1), Action::copy_file("CONTCAR", "POSCAR")],
            "pssyevx" | "eddiag" | "grad_not_orth" => vec![Action::set_incar("ALGO", "Normal")],
            "eddrmm" => {
                let mut actions = if nth == 1 && (algo == "fast" || algo == "veryfast") {
                    vec![Action::set_incar("ALGO", "Normal")]
                } else {
                    vec![Action::ScaleIncar {
                        tag: "POTIM".into(),
                        factor: 0.5,
                        default: 0.5,
                    }]
                };
                actions.push(Action::delete_file("CHGCAR"));
                actions.push(Action::delete_file("WAVECAR"));
                actions
            }
            "edddav" => vec![Action::delete_file("CHGCAR"), Action::set_incar("ALGO", "All")],
            "zheev" => vec![Action::set_incar("ALGO", "Exact")],
            "elf_kpar" => vec![Action::set_incar("KPAR", 1)],
            "elf_ncl" => vec![Action::set_incar("LELF", ".FALSE.")],
            "dfpt_ncore" => vec![Action::UnsetIncar("NCORE".into()), Action::UnsetIncar("NPAR".into())],
            "coef" => vec![Action::delete_file("WAVECAR"), Action::set_incar("ISTART", 0)],
            // nothing we can do for broken inputs
            "set_core_wf" | "read_error" => return None,
            _ => return None,
        };

        Some(actions)
    }
}
// correct:1 ends here

// [[file:../vasp-series.note::*impl][impl:1]]
impl ErrorHandler for VaspErrorHandler {
    fn name(&self) -> &str {
        "VaspErrorHandler"
    }

    fn is_monitor(&self) -> bool {
        true
    }

    fn check(&mut self, dir: &Path) -> Result<bool> {
        let path = dir.join(&self.output_file);
        if !path.exists() {
            return Ok(false);
        }
        // VASP output may contain invalid UTF-8 bytes
        let bytes = std::fs::read(&path).with_context(|| format!("read {:?}", path))?;
        let text = String::from_utf8_lossy(&bytes);
        self.errors = self.scan(&text);
        if !self.errors.is_empty() {
            info!("found VASP errors in {:?}: {:?}", path, self.errors);
        }

        Ok(!self.errors.is_empty())
    }

    fn correct(&mut self, dir: &Path) -> Result<Correction> {
        let incar_file = dir.join("INCAR");
        let incar = if incar_file.exists() {
            Incar::from_file(&incar_file)?
        } else {
            Incar::default()
        };

        let errors: Vec<_> = self.errors.iter().copied().collect();
        let mut correction = Correction {
            errors: errors.iter().map(|e| e.to_string()).collect(),
            actions: vec![],
        };
        for key in errors {
            match self.actions_for(key, dir, &incar) {
                Some(actions) => correction.actions.extend(actions),
                None => {
                    error!("unrecoverable VASP error: {}", key);
                    correction.actions.clear();
                    return Ok(correction);
                }
            }
        }

        Ok(correction)
    }
}
// impl:1 ends here

// [[file:../vasp-series.note::*test][test:1]]
#[cfg(test)]
mod tests {
    use super::*;

    fn job_dir(vasp_out: &str, incar: &str) -> Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        gut::fs::write_to_file(dir.path().join("vasp.out"), vasp_out)?;
        gut::fs::write_to_file(dir.path().join("INCAR"), incar)?;
        Ok(dir)
    }

    #[test]
    fn test_handler_subset() -> Result<()> {
        let h = VaspErrorHandler::excluding(&["algo_tet"])?;
        assert!(!h.errors_subset.contains(&"algo_tet"));
        assert_eq!(h.errors_subset.len(), ERROR_MSGS.len() - 1);
        assert!(VaspErrorHandler::excluding(&["no_such_error"]).is_err());

        let out = " ALGO=A and IALGO=5X tend to fail with the tetrahedron method\n";
        let dir = job_dir(out, "ISMEAR = -5\n")?;
        let mut h = VaspErrorHandler::excluding(&["algo_tet"])?;
        assert!(!h.check(dir.path())?);
        let mut h = VaspErrorHandler::default();
        assert!(h.check(dir.path())?);
        assert_eq!(h.detected(), vec!["algo_tet"]);

        Ok(())
    }

    #[test]
    fn test_handler_tet() -> Result<()> {
        let out = " running on 8 nodes\n Tetrahedron method fails for NKPT<4. NKPT =   1\n";
        let dir = job_dir(out, "ISMEAR = -5\n")?;
        let mut h = VaspErrorHandler::default();
        assert!(h.check(dir.path())?);
        let c = h.correct(dir.path())?;
        assert_eq!(c.errors, vec!["tet"]);
        assert!(c.is_recoverable());
        assert!(c.actions.contains(&Action::set_incar("ISMEAR", 0)));

        Ok(())
    }

    #[test]
    fn test_handler_brmix_staged() -> Result<()> {
        let dir = job_dir(" BRMIX: very serious problems\n", "ISYM = 2\n")?;
        let mut h = VaspErrorHandler::default();
        assert!(h.check(dir.path())?);
        let c1 = h.correct(dir.path())?;
        assert_eq!(c1.actions, vec![Action::set_incar("ISYM", 0)]);
        let c2 = h.correct(dir.path())?;
        assert_eq!(c2.actions, vec![Action::set_incar("IMIX", 1)]);
        let _ = h.correct(dir.path())?;
        let c4 = h.correct(dir.path())?;
        assert!(!c4.is_recoverable());

        Ok(())
    }

    fn scale_potim() -> Action {
        Action::ScaleIncar {
            tag: "POTIM".into(),
            factor: 0.5,
            default: 0.5,
        }
    }

    #[test]
    fn test_handler_zpotrf_staged() -> Result<()> {
        let dir = job_dir(" LAPACK: Routine ZPOTRF failed\n", "ISYM = 2\n")?;
        let mut h = VaspErrorHandler::default();
        assert!(h.check(dir.path())?);
        assert_eq!(h.detected(), vec!["zpotrf"]);
        // failed in the first ionic step: symmetry first
        let c1 = h.correct(dir.path())?;
        assert_eq!(
            c1.actions,
            vec![
                Action::set_incar("ISYM", 0),
                Action::delete_file("CHGCAR"),
                Action::delete_file("WAVECAR"),
            ]
        );
        // then smaller steps
        let c2 = h.correct(dir.path())?;
        assert_eq!(c2.actions[0], scale_potim());
        assert!(c2.actions.contains(&Action::delete_file("WAVECAR")));

        Ok(())
    }

    #[test]
    fn test_handler_eddrmm_staged() -> Result<()> {
        let out = " WARNING in EDDRMM: call to ZHEGV failed, returncode =   6  3     16\n";
        let dir = job_dir(out, "ALGO = Fast\n")?;
        let mut h = VaspErrorHandler::default();
        assert!(h.check(dir.path())?);
        let c1 = h.correct(dir.path())?;
        assert_eq!(c1.errors, vec!["eddrmm"]);
        assert_eq!(c1.actions[0], Action::set_incar("ALGO", "Normal"));
        assert!(c1.actions.contains(&Action::delete_file("CHGCAR")));
        let c2 = h.correct(dir.path())?;
        assert_eq!(c2.actions[0], scale_potim());

        // normal algorithm goes straight to smaller steps
        let dir = job_dir(out, "ALGO = Normal\n")?;
        let mut h = VaspErrorHandler::default();
        assert!(h.check(dir.path())?);
        assert_eq!(h.correct(dir.path())?.actions[0], scale_potim());

        Ok(())
    }

    #[test]
    fn test_handler_unrecoverable() -> Result<()> {
        let out = " BRIONS problems: POTIM should be increased\n Error reading item 'ENCUT' from file INCAR.\n";
        let dir = job_dir(out, "POTIM = 0.5\n")?;
        let mut h = VaspErrorHandler::default();
        assert!(h.check(dir.path())?);
        let c = h.correct(dir.path())?;
        assert_eq!(c.errors.len(), 2);
        assert!(!c.is_recoverable());

        Ok(())
    }

    #[test]
    fn test_handler_too_few_bands() -> Result<()> {
        let dir = job_dir(" TOO FEW BANDS!! \n", "ENCUT = 400\n")?;
        std::fs::copy("./tests/files/OUTCAR", dir.path().join("OUTCAR"))?;
        let mut h = VaspErrorHandler::default();
        assert!(h.check(dir.path())?);
        let c = h.correct(dir.path())?;
        assert_eq!(c.actions, vec![Action::set_incar("NBANDS", 106)]);

        Ok(())
    }

    #[test]
    fn test_handler_clean_output() -> Result<()> {
        let dir = job_dir(" reached required accuracy - stopping structural energy minimisation\n", "")?;
        let mut h = VaspErrorHandler::default();
        assert!(!h.check(dir.path())?);
        // no output file yet
        let mut h = h.with_output_file("missing.out");
        assert!(!h.check(dir.path())?);

        Ok(())
    }
}
// test:1 ends here
