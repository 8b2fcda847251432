// [[file:../vasp-series.note::*test][test:1]]
use gut::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;

use approx::assert_relative_eq;
use vasp_series::custodian::{Custodian, MaxErrorsReached, Unrecoverable};
use vasp_series::handlers::{ErrorHandler, VaspErrorHandler};
use vasp_series::incar::Incar;
use vasp_series::job::VaspJob;
use vasp_series::workflow::*;

fn files_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/files")
}

fn fake_vasp() -> Vec<String> {
    let script = files_dir().join("fake-vasp.sh");
    vec!["sh".into(), script.to_string_lossy().into_owned()]
}

fn settings(vasp_cmd: Vec<String>) -> RelaxSettings {
    let mut settings = RelaxSettings::new(vasp_cmd);
    settings.monitor_interval = Duration::from_millis(50);
    settings
}

fn handlers() -> Result<Vec<Box<dyn ErrorHandler>>> {
    let h: Box<dyn ErrorHandler> = Box::new(VaspErrorHandler::excluding(&["algo_tet"])?);
    Ok(vec![h])
}

/// Copy starting input files into `dir`.
fn prepare_inputs(dir: &Path) -> Result<()> {
    for f in &["INCAR", "KPOINTS", "POSCAR", "POTCAR"] {
        std::fs::copy(files_dir().join(f), dir.join(f))?;
    }
    Ok(())
}
// test:1 ends here

// [[file:../vasp-series.note::*relax][relax:1]]
#[tokio::test]
async fn test_three_step_relaxation() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let d = dir.path();
    prepare_inputs(d)?;

    let log = three_step_relaxation(d, &settings(fake_vasp()), handlers()?, true).await?;
    assert_eq!(log.jobs.len(), 3);
    assert!(log.jobs.iter().all(|j| j.finished.is_some()));
    // the static step fails once with ISMEAR = -5
    assert_eq!(log.jobs[0].corrections.len(), 0);
    assert_eq!(log.jobs[2].corrections.len(), 1);
    assert_eq!(log.jobs[2].attempts, 2);
    assert_eq!(log.jobs[2].corrections[0].correction.errors, vec!["tet"]);
    assert!(d.join("error.1/vasp.out").exists());
    assert!(d.join(vasp_series::custodian::RUN_LOG_FILE).exists());

    for suffix in &[".1relax", ".2relax", ".3static"] {
        for f in &["OUTCAR", "OSZICAR", "CONTCAR", "INCAR", "vasp.out"] {
            let path = d.join(format!("{}{}", f, suffix));
            assert!(path.exists(), "{:?}", path);
        }
    }
    // the final step moves its outputs
    assert!(!d.join("OUTCAR").exists());
    assert!(d.join("POTCAR").exists());
    assert!(d.join("POSCAR.orig").exists());

    let incar = Incar::from_file(d.join("INCAR.3static"))?;
    assert_eq!(incar.get("ISMEAR"), Some("0"));
    assert_eq!(incar.get("NSW"), Some("0"));
    assert_eq!(incar.get("IBRION"), Some("-1"));
    // copied from OUTCAR of the first relaxation
    assert_eq!(incar.get("MAGMOM"), Some("1.000 -1.000"));

    Ok(())
}

#[tokio::test]
async fn test_relaxation_missing_inputs() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let r = three_step_relaxation(dir.path(), &settings(fake_vasp()), handlers()?, true).await;
    assert!(r.is_err());

    Ok(())
}
// relax:1 ends here

// [[file:../vasp-series.note::*custodian][custodian:1]]
fn failing_job(dir: &Path, message: &str) -> Result<VaspJob> {
    prepare_inputs(dir)?;
    let script = format!("echo \" {}\"; exit 1", message);
    let cmd: Vec<String> = vec!["sh".into(), "-c".into(), script];
    Ok(VaspJob::new(&cmd))
}

#[tokio::test]
async fn test_custodian_max_errors() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let d = dir.path();
    let job = failing_job(d, "BRIONS problems: POTIM should be increased")?;

    let mut custodian = Custodian::new(handlers()?, vec![job], 2).with_monitor_interval(Duration::from_millis(50));
    let err = custodian.run(d).await.unwrap_err();
    let e = err.downcast_ref::<MaxErrorsReached>().expect("max errors");
    assert_eq!(e.0, 2);

    // each correction increases POTIM
    let incar = Incar::from_file(d.join("INCAR"))?;
    assert_relative_eq!(incar.get_f64("POTIM").unwrap(), 0.6, epsilon = 1e-8);
    assert!(d.join("error.1").is_dir());
    assert!(d.join("error.2").is_dir());

    Ok(())
}

#[tokio::test]
async fn test_custodian_unrecoverable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let d = dir.path();
    let job = failing_job(d, "Error reading item 'ENCUT' from file INCAR.")?;

    let mut custodian = Custodian::new(handlers()?, vec![job], 5).with_monitor_interval(Duration::from_millis(50));
    let err = custodian.run(d).await.unwrap_err();
    let e = err.downcast_ref::<Unrecoverable>().expect("unrecoverable");
    assert_eq!(e.errors, vec!["read_error"]);

    Ok(())
}

#[tokio::test]
async fn test_custodian_unknown_failure() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let d = dir.path();
    let job = failing_job(d, "segmentation fault")?;

    let mut custodian = Custodian::new(handlers()?, vec![job], 5).with_monitor_interval(Duration::from_millis(50));
    let err = custodian.run(d).await.unwrap_err();
    assert!(err.downcast_ref::<MaxErrorsReached>().is_none());
    assert!(err.downcast_ref::<Unrecoverable>().is_none());

    Ok(())
}

#[tokio::test]
async fn test_custodian_monitor_terminates() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let d = dir.path();
    prepare_inputs(d)?;
    // report an error, then hang until terminated or corrected
    let script = "if grep -q LREAL INCAR; then exit 0; fi; echo ' ERROR RSPHER'; sleep 60";
    let cmd: Vec<String> = vec!["sh".into(), "-c".into(), script.into()];
    let job = VaspJob::new(&cmd);

    let mut custodian = Custodian::new(handlers()?, vec![job], 3).with_monitor_interval(Duration::from_millis(100));
    let log = tokio::time::timeout(Duration::from_secs(30), custodian.run(d)).await??;
    assert_eq!(log.total_corrections(), 1);
    let incar = Incar::from_file(d.join("INCAR"))?;
    assert_eq!(incar.get("LREAL"), Some(".FALSE."));

    Ok(())
}
// custodian:1 ends here

// [[file:../vasp-series.note::*series][series:1]]
#[tokio::test]
async fn test_volume_series() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let d = dir.path();
    prepare_inputs(d)?;

    let volumes = [110.0, 100.0, 90.0];
    let settings = settings(fake_vasp());
    let logs = wavecar_prop_series(d, &volumes, &settings, handlers).await?;
    assert_eq!(logs.len(), 3);

    for i in 0..3 {
        let vd = volume_dir(d, i);
        assert!(volume_finished(&vd), "{:?}", vd);
        // no backup in series
        assert!(!vd.join("POSCAR.orig").exists());
    }
    // chained from the previous volume
    let vd1 = volume_dir(d, 1);
    assert!(vd1.join("WAVECAR.3static").exists());
    assert!(vd1.join("KPOINTS.1relax").exists());
    let incar = Incar::from_file(volume_dir(d, 0).join("INCAR.2relax"))?;
    assert_eq!(incar.get("ISMEAR"), Some("0"));

    let points = vasp_series::summary::collect_series(d)?;
    assert_eq!(points.len(), 3);
    for (p, v) in points.iter().zip(volumes.iter()) {
        assert_relative_eq!(p.volume, *v, epsilon = 1e-3);
    }
    assert_relative_eq!(points[1].energy, -85.0, epsilon = 1e-6);
    assert!(points[0].energy > points[1].energy);

    // finished volumes are skipped when run again
    let logs = wavecar_prop_series(d, &volumes, &settings, handlers).await?;
    assert!(logs.is_empty());

    // an unfinished directory is not reused
    std::fs::create_dir(volume_dir(d, 3))?;
    let r = wavecar_prop_series(d, &[110.0, 100.0, 90.0, 80.0], &settings, handlers).await;
    assert!(r.is_err());

    Ok(())
}

#[tokio::test]
async fn test_volume_series_invalid() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let d = dir.path();
    let settings = settings(fake_vasp());

    let r = wavecar_prop_series(d, &[100.0, -1.0], &settings, handlers).await;
    assert!(r.is_err());
    assert!(!volume_dir(d, 0).exists());

    // no POSCAR to start with
    let r = wavecar_prop_series(d, &[100.0], &settings, handlers).await;
    assert!(r.is_err());

    Ok(())
}
// series:1 ends here
