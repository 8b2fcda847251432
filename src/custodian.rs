// [[file:../vasp-series.note::*docs][docs:1]]
//! Run a sequence of VASP jobs with error detection and recovery.
// docs:1 ends here

// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;
use crate::handlers::{Correction, ErrorHandler};
use crate::job::{RunningJob, VaspJob};
use crate::modder::apply_actions;

use serde::Serialize;
use std::future::Future;
use std::process::ExitStatus;
use std::time::Duration;
// imports:1 ends here

// [[file:../vasp-series.note::*errors][errors:1]]
/// The total number of corrections reached the limit.
#[derive(Debug, thiserror::Error)]
#[error("max errors reached: {0} corrections applied")]
pub struct MaxErrorsReached(pub usize);

/// Errors found that no handler knows how to fix.
#[derive(Debug, thiserror::Error)]
#[error("unrecoverable errors from {handler}: {errors:?}")]
pub struct Unrecoverable {
    pub handler: String,
    pub errors: Vec<String>,
}
// errors:1 ends here

// [[file:../vasp-series.note::*log][log:1]]
/// The run log file written into job directory.
pub const RUN_LOG_FILE: &str = "vasp-series.json";

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionRecord {
    pub handler: String,
    pub time: String,
    #[serde(flatten)]
    pub correction: Correction,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job: String,
    pub vasp_cmd: Vec<String>,
    pub started: String,
    pub finished: Option<String>,
    pub attempts: usize,
    pub corrections: Vec<CorrectionRecord>,
}

/// What happened to each job in a `Custodian` run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunLog {
    pub jobs: Vec<JobRecord>,
}

fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

impl RunLog {
    fn save(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        gut::fs::write_to_file(dir.join(RUN_LOG_FILE), &json)?;
        Ok(())
    }

    /// The number of corrections in all jobs.
    pub fn total_corrections(&self) -> usize {
        self.jobs.iter().map(|j| j.corrections.len()).sum()
    }
}
// log:1 ends here

// [[file:../vasp-series.note::*base][base:1]]
/// Run `jobs` in order. Each job is watched by `handlers` and rerun after its
/// errors are corrected.
pub struct Custodian {
    handlers: Vec<Box<dyn ErrorHandler>>,
    jobs: Vec<VaspJob>,
    max_errors: usize,
    monitor_interval: Duration,
    total_errors: usize,
}

impl Custodian {
    /// `max_errors` is the total number of corrections allowed for all jobs.
    pub fn new(handlers: Vec<Box<dyn ErrorHandler>>, jobs: Vec<VaspJob>, max_errors: usize) -> Self {
        Self {
            handlers,
            jobs,
            max_errors,
            monitor_interval: Duration::from_secs(30),
            total_errors: 0,
        }
    }

    /// Set the time between two checks of monitor handlers.
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval.max(Duration::from_millis(10));
        self
    }
}
// base:1 ends here

// [[file:../vasp-series.note::*watch][watch:1]]
/// Wait for VASP to exit while checking monitor handlers. Return None if the
/// job was terminated for errors. VASP is terminated with an error when
/// `shutdown` completes first.
async fn watch<S>(
    running: &mut RunningJob,
    handlers: &mut [Box<dyn ErrorHandler>],
    dir: &Path,
    interval: Duration,
    shutdown: S,
) -> Result<Option<ExitStatus>>
where
    S: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(interval);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            status = running.wait() => {
                return Ok(Some(status?));
            }
            _ = ticker.tick() => {
                for h in handlers.iter_mut().filter(|h| h.is_monitor()) {
                    if h.check(dir)? {
                        info!("{} found errors in running job, terminating ...", h.name());
                        running.terminate().await?;
                        return Ok(None);
                    }
                }
            }
            _ = &mut shutdown => {
                info!("User interrupted. Shutting down ...");
                running.terminate().await?;
                bail!("interrupted by user");
            }
        }
    }
}

/// Check all handlers, and ask the positive ones for corrections.
fn collect_corrections(handlers: &mut [Box<dyn ErrorHandler>], dir: &Path) -> Result<Vec<(String, Correction)>> {
    let mut corrections = vec![];
    for h in handlers.iter_mut() {
        if h.check(dir)? {
            let c = h.correct(dir)?;
            corrections.push((h.name().to_string(), c));
        }
    }
    Ok(corrections)
}

/// Save files of a failed run into the first unused `error.N` directory.
fn backup_errors(dir: &Path, job: &VaspJob) -> Result<PathBuf> {
    let backup_dir = (1usize..)
        .map(|n| dir.join(format!("error.{}", n)))
        .find(|d| !d.exists())
        .ok_or_else(|| format_err!("no backup directory available in {:?}", dir))?;
    std::fs::create_dir_all(&backup_dir).with_context(|| format!("create {:?}", backup_dir))?;
    let files = crate::vasp::VASP_BACKUP_FILES
        .iter()
        .copied()
        .chain(vec![job.output_file.as_str(), job.stderr_file.as_str()]);
    for f in files {
        let src = dir.join(f);
        if src.is_file() {
            std::fs::copy(&src, backup_dir.join(f)).with_context(|| format!("backup {:?}", src))?;
        }
    }
    info!("files of failed run saved in {:?}", backup_dir);

    Ok(backup_dir)
}
// watch:1 ends here

// [[file:../vasp-series.note::*run][run:1]]
impl Custodian {
    /// Run all jobs in `dir`. The run log is also written into `dir`.
    pub async fn run(&mut self, dir: &Path) -> Result<RunLog> {
        let mut log = RunLog::default();
        let Self {
            handlers,
            jobs,
            max_errors,
            monitor_interval,
            total_errors,
        } = self;

        for job in jobs.iter() {
            info!("{}: setting up in {:?}", job.name(), dir);
            job.setup(dir)?;
            log.jobs.push(JobRecord {
                job: job.name(),
                vasp_cmd: job.vasp_cmd.clone(),
                started: now(),
                finished: None,
                attempts: 0,
                corrections: vec![],
            });
            log.save(dir)?;

            loop {
                let record = log.jobs.last_mut().ok_or_else(|| format_err!("no job record"))?;
                record.attempts += 1;

                let mut running = job.run(dir)?;
                let status = watch(&mut running, handlers, dir, *monitor_interval, tokio::signal::ctrl_c()).await?;
                // release pid lock before touching the inputs
                drop(running);

                let corrections = collect_corrections(handlers, dir)?;
                if corrections.is_empty() {
                    match status {
                        Some(s) if s.success() => {
                            job.postprocess(dir)?;
                            record.finished = now().into();
                            log.save(dir)?;
                            info!("{}: done", job.name());
                            break;
                        }
                        Some(s) => {
                            log.save(dir)?;
                            bail!("{}: VASP exited with {} without known errors", job.name(), s);
                        }
                        None => bail!("{}: job terminated, but no error found after exit", job.name()),
                    }
                }

                *total_errors += corrections.len();
                backup_errors(dir, job)?;
                for (handler, correction) in corrections.iter() {
                    record.corrections.push(CorrectionRecord {
                        handler: handler.clone(),
                        time: now(),
                        correction: correction.clone(),
                    });
                }
                log.save(dir)?;

                if let Some((handler, c)) = corrections.iter().find(|(_, c)| !c.is_recoverable()) {
                    return Err(Unrecoverable {
                        handler: handler.clone(),
                        errors: c.errors.clone(),
                    }
                    .into());
                }
                if *total_errors >= *max_errors {
                    return Err(MaxErrorsReached(*total_errors).into());
                }

                for (handler, c) in corrections.iter() {
                    info!("{}: correct {:?} with {:?}", handler, c.errors, c.actions);
                    apply_actions(dir, &c.actions)?;
                }
                info!("{}: rerun after {} corrections in total", job.name(), total_errors);
            }
        }

        Ok(log)
    }
}
// run:1 ends here

// [[file:../vasp-series.note::*test][test:1]]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::VaspErrorHandler;

    fn handlers() -> Result<Vec<Box<dyn ErrorHandler>>> {
        let h: Box<dyn ErrorHandler> = Box::new(VaspErrorHandler::default());
        Ok(vec![h])
    }

    fn sh(script: &str) -> VaspJob {
        let cmd: Vec<String> = vec!["sh".into(), "-c".into(), script.into()];
        VaspJob::new(&cmd)
    }

    #[tokio::test]
    async fn test_watch_shutdown() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let d = dir.path();
        let mut running = sh("sleep 60").run(d)?;
        let mut handlers = handlers()?;

        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok::<_, std::io::Error>(())
        };
        let t0 = std::time::Instant::now();
        let r = watch(&mut running, &mut handlers, d, Duration::from_millis(50), shutdown).await;
        let err = r.unwrap_err();
        assert!(err.to_string().contains("interrupted"), "{:?}", err);
        assert!(t0.elapsed() < Duration::from_secs(20));
        // VASP is gone already
        let status = running.wait().await?;
        assert!(!status.success());

        Ok(())
    }

    #[tokio::test]
    async fn test_watch_normal_exit() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let d = dir.path();
        let mut running = sh("echo done").run(d)?;
        let mut handlers = handlers()?;
        let status = watch(&mut running, &mut handlers, d, Duration::from_millis(50), never_shutdown()).await?;
        assert!(status.map_or(false, |s| s.success()));

        Ok(())
    }

    async fn never_shutdown() -> std::io::Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_backup_errors_unused_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let d = dir.path();
        // left by an earlier run in the same directory
        std::fs::create_dir(d.join("error.1"))?;
        gut::fs::write_to_file(d.join("error.1/vasp.out"), "old")?;
        gut::fs::write_to_file(d.join("INCAR"), "POTIM = 0.5\n")?;

        let job = sh("echo ' BRIONS problems: POTIM should be increased'; exit 1");
        let mut custodian = Custodian::new(handlers()?, vec![job], 1).with_monitor_interval(Duration::from_millis(50));
        let err = custodian.run(d).await.unwrap_err();
        assert!(err.downcast_ref::<MaxErrorsReached>().is_some());

        assert_eq!(gut::fs::read_file(d.join("error.1/vasp.out"))?, "old");
        assert!(gut::fs::read_file(d.join("error.2/vasp.out"))?.contains("BRIONS"));
        assert!(d.join("error.2/INCAR").exists());
        assert!(!d.join("error.3").exists());

        Ok(())
    }
}
// test:1 ends here
