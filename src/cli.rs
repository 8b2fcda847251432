// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;
use crate::config::Config;

use structopt::*;
// imports:1 ends here

// [[file:../vasp-series.note::*opts][opts:1]]
/// Options for running VASP, overriding those in `.env` file.
#[derive(Debug, StructOpt)]
struct VaspOpts {
    /// The command line to run VASP, such as "srun vasp_std"
    #[structopt(short = "x", long = "vasp-cmd")]
    vasp_cmd: Option<String>,

    /// The total number of corrections allowed in one relaxation
    #[structopt(long)]
    max_errors: Option<usize>,

    /// Seconds between two checks on VASP output while it is running
    #[structopt(long)]
    monitor_interval: Option<u64>,

    /// Comma separated VASP error keys to ignore, such as "algo_tet,brmix"
    #[structopt(long)]
    skip_errors: Option<String>,
}

impl VaspOpts {
    fn config(&self, dir: &Path) -> Result<Config> {
        let mut config = Config::from_dotenv(dir)?;
        if let Some(cmd) = &self.vasp_cmd {
            config.set("VASP_CMD", cmd)?;
        }
        if let Some(n) = self.max_errors {
            config.max_errors = n;
        }
        if let Some(n) = self.monitor_interval {
            config.monitor_interval = n;
        }
        if let Some(s) = &self.skip_errors {
            config.set("VASP_SKIP_ERRORS", s)?;
        }
        debug!("{:?}", config);
        Ok(config)
    }
}

/// 360, 350, ..., 260
fn default_volumes() -> Vec<f64> {
    (0..=10).map(|i| 360.0 - 10.0 * i as f64).collect()
}
// opts:1 ends here

// [[file:../vasp-series.note::*series][series:1]]
/// Relax structures at a series of cell volumes with VASP, reusing the
/// wave functions of the previous volume.
#[derive(Debug, StructOpt)]
struct SeriesCli {
    #[structopt(flatten)]
    verbose: gut::cli::Verbosity,

    /// The directory containing starting INCAR, KPOINTS, POSCAR and POTCAR
    #[structopt(short = "d", long = "dir", default_value = ".")]
    dir: PathBuf,

    #[structopt(flatten)]
    opts: VaspOpts,

    /// Target cell volumes in A^3, in calculation order. Default: 360 to 260
    /// in steps of 10.
    volumes: Vec<f64>,
}

#[tokio::main]
pub async fn run_series_enter_main() -> Result<()> {
    let args = SeriesCli::from_args();
    args.verbose.setup_logger();

    let config = args.opts.config(&args.dir)?;
    let volumes = if args.volumes.is_empty() {
        default_volumes()
    } else {
        args.volumes.clone()
    };
    info!("{} volumes to calculate in {:?}", volumes.len(), args.dir);

    let settings = config.relax_settings();
    let logs = crate::workflow::wavecar_prop_series(&args.dir, &volumes, &settings, || config.new_handlers()).await?;
    info!("{} volumes calculated.", logs.len());

    let points = crate::summary::collect_series(&args.dir)?;
    print!("{}", crate::summary::format_table(&points));

    Ok(())
}
// series:1 ends here

// [[file:../vasp-series.note::*relax][relax:1]]
/// Run VASP relaxation twice then a static calculation in a directory.
#[derive(Debug, StructOpt)]
struct RelaxCli {
    #[structopt(flatten)]
    verbose: gut::cli::Verbosity,

    /// The directory containing VASP input files
    #[structopt(default_value = ".")]
    dir: PathBuf,

    #[structopt(flatten)]
    opts: VaspOpts,

    /// Do not keep `*.orig` copies of input files
    #[structopt(long)]
    no_backup: bool,
}

#[tokio::main]
pub async fn relax_enter_main() -> Result<()> {
    let args = RelaxCli::from_args();
    args.verbose.setup_logger();

    let config = args.opts.config(&args.dir)?;
    let settings = config.relax_settings();
    let handlers = config.new_handlers()?;
    crate::workflow::three_step_relaxation(&args.dir, &settings, handlers, !args.no_backup).await?;

    Ok(())
}
// relax:1 ends here

// [[file:../vasp-series.note::*summary][summary:1]]
/// Print volume, pressure and energy of a volume series calculation.
#[derive(Debug, StructOpt)]
struct SummaryCli {
    #[structopt(flatten)]
    verbose: gut::cli::Verbosity,

    /// The directory containing vol_0, vol_1, ...
    #[structopt(default_value = ".")]
    dir: PathBuf,

    /// Print in JSON format
    #[structopt(long)]
    json: bool,

    /// Plot energy against volume in terminal (requires gnuplot)
    #[structopt(long)]
    plot: bool,
}

pub fn summary_enter_main() -> Result<()> {
    let args = SummaryCli::from_args();
    args.verbose.setup_logger();

    let points = crate::summary::collect_series(&args.dir)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&points)?);
    } else {
        print!("{}", crate::summary::format_table(&points));
    }
    if args.plot {
        println!("{}", crate::summary::plot_energy_volume(&points)?);
    }

    Ok(())
}
// summary:1 ends here

// [[file:../vasp-series.note::*test][test:1]]
#[test]
fn test_cli_args() -> Result<()> {
    let args = SeriesCli::from_iter_safe(&["vasp-series", "-x", "mpirun vasp_std", "--max-errors", "5", "350", "340.5"])?;
    assert_eq!(args.volumes, vec![350.0, 340.5]);
    assert_eq!(args.opts.max_errors, Some(5));
    assert_eq!(args.dir, PathBuf::from("."));

    let dir = tempfile::tempdir()?;
    let config = args.opts.config(dir.path())?;
    assert_eq!(config.vasp_cmd, vec!["mpirun", "vasp_std"]);
    assert_eq!(config.max_errors, 5);

    let v = default_volumes();
    assert_eq!(v.len(), 11);
    assert_eq!(v[0], 360.0);
    assert_eq!(v[10], 260.0);

    let args = RelaxCli::from_iter_safe(&["vasp-relax", "--no-backup", "calc"])?;
    assert!(args.no_backup);
    assert_eq!(args.dir, PathBuf::from("calc"));

    Ok(())
}
// test:1 ends here
