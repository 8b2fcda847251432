// [[file:../vasp-series.note::*docs][docs:1]]
//! Run VASP in a new process group for easy control.
// docs:1 ends here

// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;

use std::io::prelude::*;
// imports:1 ends here

// [[file:../vasp-series.note::*process group][process group:1]]
pub trait ProcessGroupExt<T> {
    fn new_process_group(&mut self) -> &mut T;
}

impl ProcessGroupExt<tokio::process::Command> for tokio::process::Command {
    fn new_process_group(&mut self) -> &mut tokio::process::Command {
        // the child becomes the leader of a new group, so pgid == pid
        self.process_group(0)
    }
}

/// Call `pkill` to send signal to all processes in group `pgid`.
pub fn signal_process_group(pgid: u32, signal: &str) -> Result<()> {
    trace!("signal process group {} using {:?}", pgid, signal);
    duct::cmd!("pkill", "--signal", signal, "-g", pgid.to_string())
        .unchecked()
        .run()
        .with_context(|| format!("pkill {} for group {}", signal, pgid))?;

    Ok(())
}
// process group:1 ends here

// [[file:../vasp-series.note::*pidfile][pidfile:1]]
/// A locked file holding the pid of running VASP. It is removed on drop.
#[derive(Debug)]
pub struct PidFile {
    file: std::fs::File,
    path: PathBuf,
}

impl PidFile {
    fn create(path: &Path) -> Result<PidFile> {
        use fs2::*;

        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("Could not create PID file: {:?}", path))?;

        file.try_lock_exclusive()
            .with_context(|| format!("Could not lock PID file {:?}; Is VASP already running here?", path))?;

        Ok(PidFile {
            file,
            path: path.to_owned(),
        })
    }

    fn write_pid(&mut self, pid: u32) -> Result<()> {
        self.file.set_len(0)?;
        writeln!(&mut self.file, "{}", pid).context("Could not write PID file")?;
        self.file.flush().context("Could not flush PID file")
    }

    /// Lock `path` before the process starts.
    pub fn lock(path: &Path) -> Result<Self> {
        Self::create(path)
    }

    /// Record the pid of started process.
    pub fn record(&mut self, pid: u32) -> Result<()> {
        self.write_pid(pid)
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
// pidfile:1 ends here

// [[file:../vasp-series.note::*test][test:1]]
#[test]
fn test_pidfile_lock() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("vasp.pid");
    {
        let mut pidfile = PidFile::lock(&path)?;
        pidfile.record(12345)?;
        assert_eq!(gut::fs::read_file(&path)?.trim(), "12345");
        // a second lock fails while the first is alive
        assert!(PidFile::lock(&path).is_err());
    }
    assert!(!path.exists());

    Ok(())
}
// test:1 ends here
