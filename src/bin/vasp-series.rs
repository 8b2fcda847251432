// [[file:../../vasp-series.note::*bin/vasp-series.rs][bin/vasp-series.rs:1]]
use gut::prelude::*;

fn main() -> Result<()> {
    vasp_series::run_series_enter_main()?;

    Ok(())
}
// bin/vasp-series.rs:1 ends here
