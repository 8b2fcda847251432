// [[file:../vasp-series.note::*docs][docs:1]]
//! Run settings from `.env` file in the working directory.
// docs:1 ends here

// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;
use crate::handlers::{ErrorHandler, VaspErrorHandler};
use crate::workflow::RelaxSettings;

use std::time::Duration;
// imports:1 ends here

// [[file:../vasp-series.note::*base][base:1]]
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// VASP_CMD
    pub vasp_cmd: Vec<String>,
    /// VASP_MAX_ERRORS
    pub max_errors: usize,
    /// VASP_MONITOR_INTERVAL, in seconds
    pub monitor_interval: u64,
    /// VASP_SKIP_ERRORS
    pub skip_errors: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vasp_cmd: vec!["srun".into(), "vasp_std".into()],
            max_errors: 3,
            monitor_interval: 30,
            skip_errors: vec!["algo_tet".into()],
        }
    }
}
// base:1 ends here

// [[file:../vasp-series.note::*env][env:1]]
pub(crate) fn split_cmd(s: &str) -> Vec<String> {
    s.split_whitespace().map(|x| x.to_string()).collect()
}

pub(crate) fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(|x| x.trim()).filter(|x| !x.is_empty()).map(|x| x.to_string()).collect()
}

impl Config {
    /// Update settings with `key`=`value` pair. Unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "VASP_CMD" => {
                let cmd = split_cmd(value);
                if cmd.is_empty() {
                    bail!("empty VASP_CMD");
                }
                self.vasp_cmd = cmd;
            }
            "VASP_MAX_ERRORS" => {
                self.max_errors = value.parse().with_context(|| format!("invalid VASP_MAX_ERRORS: {:?}", value))?;
            }
            "VASP_MONITOR_INTERVAL" => {
                self.monitor_interval = value
                    .parse()
                    .with_context(|| format!("invalid VASP_MONITOR_INTERVAL: {:?}", value))?;
            }
            "VASP_SKIP_ERRORS" => self.skip_errors = split_list(value),
            _ => debug!("ignored env var: {}", key),
        }
        Ok(())
    }

    /// Read settings from `.env` file in `dir` if it exists, or use the
    /// defaults.
    pub fn from_dotenv(dir: &Path) -> Result<Self> {
        let mut config = Self::default();
        let path = dir.join(".env");
        if !path.is_file() {
            debug!("no .env found in {:?}, using default settings", dir);
            return Ok(config);
        }

        let envfile = envfile::EnvFile::new(path.clone()).with_context(|| format!("read {:?}", path))?;
        for (key, value) in &envfile.store {
            info!("found env var from {:?}: {}={}", &envfile.path, key, value);
            config.set(key, value)?;
        }

        Ok(config)
    }
}
// env:1 ends here

// [[file:../vasp-series.note::*build][build:1]]
impl Config {
    pub fn relax_settings(&self) -> RelaxSettings {
        RelaxSettings {
            vasp_cmd: self.vasp_cmd.clone(),
            max_errors: self.max_errors,
            monitor_interval: Duration::from_secs(self.monitor_interval),
        }
    }

    /// Create error handlers for one relaxation.
    pub fn new_handlers(&self) -> Result<Vec<Box<dyn ErrorHandler>>> {
        let skipped: Vec<&str> = self.skip_errors.iter().map(|x| x.as_str()).collect();
        let handler: Box<dyn ErrorHandler> = Box::new(VaspErrorHandler::excluding(&skipped)?);
        Ok(vec![handler])
    }
}
// build:1 ends here

// [[file:../vasp-series.note::*test][test:1]]
#[test]
fn test_config_dotenv() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = Config::from_dotenv(dir.path())?;
    assert_eq!(config, Config::default());

    let txt = "VASP_CMD=mpirun -np 4 vasp_std\nVASP_MAX_ERRORS=5\nVASP_SKIP_ERRORS=algo_tet, brmix\n";
    gut::fs::write_to_file(dir.path().join(".env"), txt)?;
    let config = Config::from_dotenv(dir.path())?;
    assert_eq!(config.vasp_cmd, vec!["mpirun", "-np", "4", "vasp_std"]);
    assert_eq!(config.max_errors, 5);
    assert_eq!(config.monitor_interval, 30);
    assert_eq!(config.skip_errors, vec!["algo_tet", "brmix"]);
    assert_eq!(config.new_handlers()?.len(), 1);

    let mut config = Config::default();
    assert!(config.set("VASP_MAX_ERRORS", "many").is_err());
    assert!(config.set("VASP_CMD", "  ").is_err());
    config.set("VASP_SKIP_ERRORS", "no_such_error")?;
    assert!(config.new_handlers().is_err());

    Ok(())
}
// test:1 ends here
