// [[file:../vasp-series.note::*docs][docs:1]]
//! One VASP run in a directory: set up inputs, run, and archive outputs with
//! a suffix.
// docs:1 ends here

// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;
use crate::modder::{apply_actions, Action};
use crate::process::{signal_process_group, PidFile, ProcessGroupExt};
use crate::vasp::{VASP_INPUT_FILES, VASP_OUTPUT_FILES};

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
// imports:1 ends here

// [[file:../vasp-series.note::*base][base:1]]
/// A VASP calculation step.
#[derive(Debug, Clone)]
pub struct VaspJob {
    /// The command line to run VASP, such as `srun vasp_std`
    pub vasp_cmd: Vec<String>,
    /// The file capturing VASP stdout
    pub output_file: String,
    /// The file capturing VASP stderr
    pub stderr_file: String,
    /// Appended to output files after the run
    pub suffix: String,
    /// The final step moves output files to suffixed names, others copy them.
    pub final_: bool,
    /// Keep `*.orig` copies of the input files before setup.
    pub backup: bool,
    /// Copy final magnetic moments in OUTCAR into INCAR for the next step.
    pub copy_magmom: bool,
    /// Applied to inputs before the first run of this job.
    pub settings_override: Vec<Action>,
}

impl VaspJob {
    pub fn new(vasp_cmd: &[String]) -> Self {
        Self {
            vasp_cmd: vasp_cmd.to_vec(),
            output_file: "vasp.out".into(),
            stderr_file: "std_err.txt".into(),
            suffix: String::new(),
            final_: true,
            backup: true,
            copy_magmom: false,
            settings_override: vec![],
        }
    }

    /// A short name for logging.
    pub fn name(&self) -> String {
        if self.suffix.is_empty() {
            "vasp".into()
        } else {
            format!("vasp{}", self.suffix)
        }
    }
}
// base:1 ends here

// [[file:../vasp-series.note::*setup][setup:1]]
impl VaspJob {
    /// Prepare input files in `dir` before running.
    pub fn setup(&self, dir: &Path) -> Result<()> {
        if self.backup {
            for f in VASP_INPUT_FILES {
                let src = dir.join(f);
                if src.is_file() {
                    let dest = dir.join(format!("{}.orig", f));
                    std::fs::copy(&src, &dest).with_context(|| format!("backup {:?}", src))?;
                }
            }
        }
        if !self.settings_override.is_empty() {
            info!("{}: apply {} settings overrides", self.name(), self.settings_override.len());
            apply_actions(dir, &self.settings_override)?;
        }

        Ok(())
    }
}
// setup:1 ends here

// [[file:../vasp-series.note::*run][run:1]]
/// A started VASP process.
#[derive(Debug)]
pub struct RunningJob {
    child: tokio::process::Child,
    pgid: u32,
    _pidfile: PidFile,
}

impl VaspJob {
    /// Start VASP in `dir` with stdout and stderr redirected into files.
    pub fn run(&self, dir: &Path) -> Result<RunningJob> {
        let (program, args) = self
            .vasp_cmd
            .split_first()
            .ok_or_else(|| format_err!("empty VASP command"))?;

        let mut pidfile = PidFile::lock(&dir.join("vasp.pid"))?;
        let stdout = std::fs::File::create(dir.join(&self.output_file))
            .with_context(|| format!("create {:?} in {:?}", self.output_file, dir))?;
        let stderr = std::fs::File::create(dir.join(&self.stderr_file))
            .with_context(|| format!("create {:?} in {:?}", self.stderr_file, dir))?;

        info!("{}: run {:?} in {:?}", self.name(), self.vasp_cmd, dir);
        let child = tokio::process::Command::new(program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .new_process_group()
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {:?}", self.vasp_cmd))?;

        let pgid = child.id().ok_or_else(|| format_err!("VASP process exited too early"))?;
        pidfile.record(pgid)?;
        debug!("VASP started in process group {}", pgid);

        Ok(RunningJob {
            child,
            pgid,
            _pidfile: pidfile,
        })
    }
}

impl RunningJob {
    /// Wait for VASP to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await.context("wait for VASP")?;
        debug!("VASP process group {} exited: {:?}", self.pgid, status);
        Ok(status)
    }

    /// Terminate all processes in the group, and wait for VASP to exit.
    pub async fn terminate(&mut self) -> Result<()> {
        if let Ok(Some(status)) = self.child.try_wait() {
            info!("VASP already exited with {:?}", status);
            return Ok(());
        }
        info!("terminate VASP in process group {}", self.pgid);
        // a paused process cannot handle SIGTERM
        if let Err(e) = signal_process_group(self.pgid, "SIGCONT") {
            warn!("{:?}", e);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        if let Err(e) = signal_process_group(self.pgid, "SIGTERM") {
            warn!("{:?}; kill VASP directly", e);
            self.child.start_kill().context("kill VASP")?;
        }

        match tokio::time::timeout(Duration::from_secs(30), self.child.wait()).await {
            Ok(status) => {
                debug!("VASP terminated: {:?}", status?);
            }
            Err(_) => {
                warn!("VASP did not exit in time, kill it.");
                let _ = signal_process_group(self.pgid, "SIGKILL");
                self.child.kill().await.context("kill VASP")?;
            }
        }

        Ok(())
    }
}
// run:1 ends here

// [[file:../vasp-series.note::*postprocess][postprocess:1]]
impl VaspJob {
    /// Archive outputs with suffix, and copy magnetic moments if required.
    pub fn postprocess(&self, dir: &Path) -> Result<()> {
        if !self.suffix.is_empty() {
            let files = VASP_OUTPUT_FILES.iter().copied().chain(std::iter::once(self.output_file.as_str()));
            for f in files {
                let src = dir.join(f);
                if !src.is_file() {
                    continue;
                }
                let dest = dir.join(format!("{}{}", f, self.suffix));
                if self.final_ {
                    std::fs::rename(&src, &dest).with_context(|| format!("move {:?} to {:?}", src, dest))?;
                } else {
                    std::fs::copy(&src, &dest).with_context(|| format!("copy {:?} to {:?}", src, dest))?;
                }
            }
        }

        if self.copy_magmom && !self.final_ {
            if let Err(e) = copy_magmom(dir) {
                error!("MAGMOM copy from OUTCAR to INCAR failed: {:?}", e);
            }
        }

        Ok(())
    }
}

fn copy_magmom(dir: &Path) -> Result<()> {
    let magmom = crate::vasp::outcar::final_magnetization(&dir.join("OUTCAR"))?;
    let magmom: Vec<_> = magmom.iter().map(|m| format!("{:.3}", m)).collect();
    crate::incar::update_incar_file(&dir.join("INCAR"), |incar| {
        incar.set("MAGMOM", &magmom.join(" "));
    })?;
    info!("copied {} magnetic moments into INCAR", magmom.len());

    Ok(())
}
// postprocess:1 ends here

// test:1 ends here
