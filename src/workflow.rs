// [[file:../vasp-series.note::*docs][docs:1]]
//! Three-step relaxation and the volume series chained by WAVECAR/CHGCAR
//! reuse.
// docs:1 ends here

// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;
use crate::custodian::{Custodian, RunLog};
use crate::handlers::ErrorHandler;
use crate::job::VaspJob;
use crate::modder::Action;

use std::time::Duration;
// imports:1 ends here

// [[file:../vasp-series.note::*settings][settings:1]]
/// Settings shared by all relaxations in a run.
#[derive(Debug, Clone)]
pub struct RelaxSettings {
    pub vasp_cmd: Vec<String>,
    /// Total number of corrections allowed in one three-step relaxation
    pub max_errors: usize,
    pub monitor_interval: Duration,
}

impl RelaxSettings {
    pub fn new(vasp_cmd: Vec<String>) -> Self {
        Self {
            vasp_cmd,
            max_errors: 3,
            monitor_interval: Duration::from_secs(30),
        }
    }
}
// settings:1 ends here

// [[file:../vasp-series.note::*relax][relax:1]]
/// The suffix of the final static calculation.
pub const FINAL_SUFFIX: &str = ".3static";

/// Build the relax, relax, static job sequence.
pub fn three_step_jobs(vasp_cmd: &[String], backup: bool) -> Vec<VaspJob> {
    let job = |suffix: &str, final_: bool, settings_override: Vec<Action>| {
        let mut job = VaspJob::new(vasp_cmd);
        job.suffix = suffix.into();
        job.final_ = final_;
        job.backup = backup;
        job.copy_magmom = true;
        job.settings_override = settings_override;
        job
    };

    let step1 = job(".1relax", false, vec![]);
    let step2 = job(".2relax", false, vec![Action::copy_file("CONTCAR", "POSCAR")]);
    let step3 = job(
        FINAL_SUFFIX,
        true,
        vec![
            Action::set_incar("IBRION", -1),
            Action::set_incar("NSW", 0),
            Action::set_incar("ISMEAR", -5),
            Action::copy_file("CONTCAR", "POSCAR"),
        ],
    );

    vec![step1, step2, step3]
}

/// Relax the structure in `path` twice, then run a static calculation on the
/// relaxed structure. `path` should contain all VASP input files.
pub async fn three_step_relaxation(
    path: &Path,
    settings: &RelaxSettings,
    handlers: Vec<Box<dyn ErrorHandler>>,
    backup: bool,
) -> Result<RunLog> {
    for f in &["INCAR", "POSCAR", "POTCAR"] {
        if !path.join(f).is_file() {
            bail!("missing {} in {:?}", f, path);
        }
    }
    let jobs = three_step_jobs(&settings.vasp_cmd, backup);
    let mut custodian =
        Custodian::new(handlers, jobs, settings.max_errors).with_monitor_interval(settings.monitor_interval);
    let log = custodian.run(path).await.with_context(|| format!("relaxation in {:?}", path))?;
    info!("relaxation in {:?} done with {} corrections", path, log.total_corrections());

    Ok(log)
}
// relax:1 ends here

// [[file:../vasp-series.note::*series][series:1]]
/// Return the directory for the `i`th volume.
pub fn volume_dir(path: &Path, i: usize) -> PathBuf {
    path.join(format!("vol_{}", i))
}

/// Return true if the calculation in `dir` finished.
pub fn volume_finished(dir: &Path) -> bool {
    crate::vasp::outcar::outcar_finished(&dir.join(format!("OUTCAR{}", FINAL_SUFFIX)))
}

fn copy_if_exists(src: &Path, dest: &Path) -> Result<()> {
    if src.is_file() {
        std::fs::copy(src, dest).with_context(|| format!("copy {:?} to {:?}", src, dest))?;
    } else {
        debug!("{:?} not found, skipped", src);
    }
    Ok(())
}

/// Populate the input files of the `i`th volume directory `vol_dir`.
fn prepare_volume_inputs(path: &Path, i: usize, vol_dir: &Path) -> Result<()> {
    if i == 0 {
        for f in crate::vasp::VASP_INPUT_FILES {
            copy_if_exists(&path.join(f), &vol_dir.join(f))?;
        }
    } else {
        // start from the previous volume's results
        let prev = volume_dir(path, i - 1);
        let files = [
            ("CONTCAR.3static", "POSCAR"),
            ("INCAR.2relax", "INCAR"),
            ("KPOINTS.1relax", "KPOINTS"),
            ("POTCAR", "POTCAR"),
            ("WAVECAR.3static", "WAVECAR"),
            ("CHGCAR.3static", "CHGCAR"),
        ];
        for (src, dest) in files.iter() {
            copy_if_exists(&prev.join(src), &vol_dir.join(dest))?;
        }
    }

    Ok(())
}

/// Run three-step relaxations for each of `volumes` in turn under `path`. The
/// `i`th volume is calculated in `vol_i` directory, starting from the
/// structure, wave functions and charge density of the previous volume.
///
/// `new_handlers` creates fresh error handlers for each relaxation.
pub async fn wavecar_prop_series<F>(
    path: &Path,
    volumes: &[f64],
    settings: &RelaxSettings,
    new_handlers: F,
) -> Result<Vec<RunLog>>
where
    F: Fn() -> Result<Vec<Box<dyn ErrorHandler>>>,
{
    if let Some(v) = volumes.iter().find(|&&v| !(v > 0.0)) {
        bail!("invalid volume: {}", v);
    }

    let mut logs = vec![];
    for (i, &vol) in volumes.iter().enumerate() {
        let vol_dir = volume_dir(path, i);
        if vol_dir.exists() {
            if volume_finished(&vol_dir) {
                info!("{:?} already finished, skipped.", vol_dir);
                continue;
            }
            bail!("{:?} exists but its calculation did not finish", vol_dir);
        }
        info!("volume {} ({:.3} A^3) in {:?}", i, vol, vol_dir);
        std::fs::create_dir_all(&vol_dir).with_context(|| format!("create {:?}", vol_dir))?;

        prepare_volume_inputs(path, i, &vol_dir)?;
        let poscar = vol_dir.join("POSCAR");
        if !poscar.is_file() {
            bail!("no POSCAR available for {:?}", vol_dir);
        }
        crate::poscar::scale_poscar_file(&poscar, vol)?;

        let log = three_step_relaxation(&vol_dir, settings, new_handlers()?, false).await?;
        logs.push(log);
    }

    Ok(logs)
}
// series:1 ends here

// [[file:../vasp-series.note::*test][test:1]]
#[test]
fn test_three_step_jobs() {
    let cmd = vec!["vasp_std".to_string()];
    let jobs = three_step_jobs(&cmd, true);
    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|j| j.copy_magmom && j.backup));
    assert_eq!(jobs.iter().filter(|j| j.final_).count(), 1);
    assert!(jobs[0].settings_override.is_empty());
    assert_eq!(jobs[1].settings_override, vec![Action::copy_file("CONTCAR", "POSCAR")]);
    assert!(jobs[2].settings_override.contains(&Action::set_incar("ISMEAR", -5)));
    assert_eq!(jobs[2].suffix, FINAL_SUFFIX);
}
// test:1 ends here
