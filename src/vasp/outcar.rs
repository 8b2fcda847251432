// [[file:../../vasp-series.note::*imports][imports:1]]
use crate::common::*;

use text_parser::GrepReader;
// imports:1 ends here

// [[file:../../vasp-series.note::*base][base:1]]
const OUTCAR_FOOTER: &str = "General timing and accounting informations for this job";

fn grep_reader(path: &Path) -> Result<GrepReader> {
    GrepReader::try_from_path(path).with_context(|| format!("open {:?}", path))
}

/// Return the last line in `path` containing `pattern`. OUTCAR can be very
/// large, so only the marked line is read.
fn last_line_containing(path: &Path, pattern: &str) -> Result<String> {
    let mut reader = grep_reader(path)?;
    let n = reader.mark(&[pattern])?;
    if n == 0 {
        bail!("no line containing {:?} found in {:?}", pattern, path);
    }
    reader.goto_marker(n - 1)?;
    let mut line = String::new();
    reader.read_lines(1, &mut line)?;
    Ok(line)
}

/// Parse the `i`th whitespace separated token (negative from the end) in
/// `line` as f64.
fn nth_token_as_f64(line: &str, i: isize) -> Result<f64> {
    let tokens: Vec<_> = line.split_whitespace().collect();
    let n = tokens.len() as isize;
    let k = if i < 0 { n + i } else { i };
    if k < 0 || k >= n {
        bail!("token {} out of range in line: {:?}", i, line);
    }
    let t = tokens[k as usize];
    t.parse().map_err(|e| format_err!("invalid number {:?} in line {:?}: {}", t, line, e))
}
// base:1 ends here

// [[file:../../vasp-series.note::*extract][extract:1]]
/// Extract the last reported cell volume (Å^3) from OUTCAR in `path`.
///
/// ```text
///   volume of cell :      336.00
/// ```
pub fn extract_volume(path: &Path) -> Result<f64> {
    let line = last_line_containing(path, "volume")?;
    nth_token_as_f64(&line, -1).with_context(|| format!("parse volume from {:?}", path))
}

/// Extract the last reported external pressure (kB) from OUTCAR in `path`.
///
/// ```text
///   external pressure =       -6.17 kB  Pullay stress =        0.00 kB
/// ```
pub fn extract_pressure(path: &Path) -> Result<f64> {
    let line = last_line_containing(path, "pressure")?;
    nth_token_as_f64(&line, 3).with_context(|| format!("parse pressure from {:?}", path))
}

/// Extract the last energy (E0, eV) from OSZICAR in `path`.
///
/// ```text
///    1 F= -.84780990E+02 E0= -.84775142E+02  d E =-.847810E+02  mag=     3.2666
/// ```
pub fn extract_energy(path: &Path) -> Result<f64> {
    let line = last_line_containing(path, "F=")?;
    nth_token_as_f64(&line, 4).with_context(|| format!("parse energy from {:?}", path))
}
// extract:1 ends here

// [[file:../../vasp-series.note::*outcar][outcar:1]]
/// Return true if VASP finished normally with timing footer written in OUTCAR.
pub fn outcar_finished(path: &Path) -> bool {
    match grep_reader(path).and_then(|mut r| r.mark(&[OUTCAR_FOOTER])) {
        Ok(n) => n > 0,
        Err(_) => false,
    }
}

/// Parse the number of bands from OUTCAR.
///
/// ```text
///    k-points           NKPTS =      1   k-points in BZ     NKDIM =      1   number of bands    NBANDS=     96
/// ```
pub fn number_of_bands(path: &Path) -> Result<usize> {
    let line = last_line_containing(path, "NBANDS=")?;
    let rest = line.splitn(2, "NBANDS=").nth(1).unwrap_or("");
    let t = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| format_err!("missing NBANDS value: {:?}", line))?;
    let n = t.parse().with_context(|| format!("invalid NBANDS: {:?}", line))?;
    Ok(n)
}

/// Read total magnetic moment of each ion from the last `magnetization (x)`
/// block in OUTCAR.
///
/// ```text
///  magnetization (x)
///
/// # of ion       s       p       d       tot
/// ------------------------------------------
///     1       -0.006  -0.032   2.154   2.116
///     2        0.006   0.032  -2.154  -2.116
/// --------------------------------------------------
/// tot          0.000   0.000   0.000   0.000
/// ```
pub fn final_magnetization(path: &Path) -> Result<Vec<f64>> {
    let mut reader = grep_reader(path)?;
    // also marks lines like "number of electron  16.0 magnetization  2.0"
    let n = reader.mark(&["magnetization"])?;
    let mut line = String::new();
    let mut found = false;
    for i in (0..n).rev() {
        reader.goto_marker(i)?;
        line.clear();
        reader.read_lines(1, &mut line)?;
        if line.contains("magnetization (x)") {
            found = true;
            break;
        }
    }
    if !found {
        bail!("no magnetization found in {:?}", path);
    }

    let mut magmom = vec![];
    let mut in_table = false;
    loop {
        line.clear();
        if reader.read_lines(1, &mut line).is_err() {
            break;
        }
        let s = line.trim();
        if !in_table {
            if s.starts_with("# of ion") {
                // skip the dashes below the header
                reader.read_lines(1, &mut String::new())?;
                in_table = true;
            }
            continue;
        }
        if s.starts_with("--") || s.is_empty() {
            break;
        }
        magmom.push(nth_token_as_f64(s, -1)?);
    }
    if magmom.is_empty() {
        bail!("empty magnetization block in {:?}", path);
    }

    Ok(magmom)
}
// outcar:1 ends here

// test:1 ends here
