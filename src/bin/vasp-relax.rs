// [[file:../../vasp-series.note::*bin/vasp-relax.rs][bin/vasp-relax.rs:1]]
use gut::prelude::*;

fn main() -> Result<()> {
    vasp_series::relax_enter_main()?;

    Ok(())
}
// bin/vasp-relax.rs:1 ends here
