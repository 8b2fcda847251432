// [[file:../../vasp-series.note::*bin/vasp-series-summary.rs][bin/vasp-series-summary.rs:1]]
use gut::prelude::*;

fn main() -> Result<()> {
    vasp_series::summary_enter_main()?;

    Ok(())
}
// bin/vasp-series-summary.rs:1 ends here
