// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;

use std::fmt::Write;
// imports:1 ends here

// [[file:../vasp-series.note::*gnuplot][gnuplot:1]]
/// Plot in terminal using gnuplot's dumb terminal.
pub struct AsciiPlot {
    xlabel: String,
    ylabel: String,
    title: String,
}

impl Default for AsciiPlot {
    fn default() -> Self {
        Self {
            xlabel: "x".into(),
            ylabel: "y".into(),
            title: String::new(),
        }
    }
}

impl AsciiPlot {
    pub fn xlabel(mut self, label: &str) -> Self {
        self.xlabel = label.into();
        self
    }

    pub fn ylabel(mut self, label: &str) -> Self {
        self.ylabel = label.into();
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    fn script(&self, data_file: &str) -> Result<String> {
        let mut script = String::new();
        writeln!(&mut script, "set terminal dumb")?;
        writeln!(&mut script, "set title \"{}\"", self.title)?;
        writeln!(&mut script, "set xlabel \"{}\"", self.xlabel)?;
        writeln!(&mut script, "set ylabel \"{}\"", self.ylabel)?;
        writeln!(&mut script, "set format y \"%-0.3f\"")?;
        writeln!(&mut script, "set tics scale 0")?;
        writeln!(&mut script, "unset key")?;
        writeln!(&mut script, "plot \"{}\" using 1:2 with linespoints", data_file)?;
        Ok(script)
    }

    /// Plot points (`x`, `y`), and return the text output from gnuplot.
    pub fn plot(&self, x: &[f64], y: &[f64]) -> Result<String> {
        if x.len() != y.len() {
            bail!("x and y differ in length: {} vs {}", x.len(), y.len());
        }
        let data_file = "plot.dat";
        let script = self.script(data_file)?;

        // write data in a temporary directory, removed on drop
        let dir = tempfile::tempdir()?;
        let data: String = x.iter().zip(y).map(|(a, b)| format!("{}\t{}\n", a, b)).collect();
        gut::fs::write_to_file(dir.path().join(data_file), &data)?;

        let output = duct::cmd!("gnuplot")
            .dir(dir.path())
            .stdin_bytes(script.as_str())
            .read()
            .context("run gnuplot")?;
        Ok(output)
    }
}
// gnuplot:1 ends here

// [[file:../vasp-series.note::*test][test:1]]
#[test]
fn test_plot_script() -> Result<()> {
    let p = AsciiPlot::default().title("E-V").xlabel("volume").ylabel("energy");
    let s = p.script("plot.dat")?;
    assert!(s.contains("set title \"E-V\""));
    assert!(s.contains("plot \"plot.dat\""));
    assert!(p.plot(&[1.0], &[]).is_err());

    Ok(())
}

#[test]
#[ignore]
fn test_gnuplot_ascii_plot() -> Result<()> {
    let v = vec![360.0, 350.0, 340.0, 330.0, 320.0];
    let e = vec![-84.10, -84.62, -84.95, -85.02, -84.80];
    let s = AsciiPlot::default()
        .title("E-V")
        .xlabel("volume (A^3)")
        .ylabel("energy (eV)")
        .plot(&v, &e)?;
    println!("{}", s);

    Ok(())
}
// test:1 ends here
