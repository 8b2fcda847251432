// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;
// imports:1 ends here

// [[file:../vasp-series.note::*gamma][gamma:1]]
/// Switch automatic Monkhorst-Pack mesh in KPOINTS `path` to Gamma centered
/// one. Return false if nothing changed.
pub fn set_gamma_centered(path: &Path) -> Result<bool> {
    let s = gut::fs::read_file(path).with_context(|| format!("read KPOINTS {:?}", path))?;
    let mut lines: Vec<&str> = s.lines().collect();

    // Automatic mesh
    // 0
    // Monkhorst-Pack
    // 4 4 4
    if lines.len() < 4 {
        info!("KPOINTS {:?} is not an automatic mesh", path);
        return Ok(false);
    }
    let nkpts: Option<usize> = lines[1].trim().parse().ok();
    if nkpts != Some(0) {
        info!("KPOINTS {:?}: explicit k-points left unchanged", path);
        return Ok(false);
    }
    if !lines[2].trim_start().starts_with(|c| c == 'M' || c == 'm') {
        return Ok(false);
    }
    lines[2] = "Gamma";
    let mut txt = lines.join("\n");
    txt.push('\n');
    gut::fs::write_to_file(path, &txt).with_context(|| format!("write KPOINTS {:?}", path))?;

    Ok(true)
}
// gamma:1 ends here

// [[file:../vasp-series.note::*test][test:1]]
#[test]
fn test_kpoints_gamma() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("KPOINTS");
    gut::fs::write_to_file(&path, "Automatic mesh\n0\nMonkhorst-Pack\n  4 4 4\n  0 0 0\n")?;
    assert!(set_gamma_centered(&path)?);
    let s = gut::fs::read_file(&path)?;
    assert_eq!(s.lines().nth(2), Some("Gamma"));
    assert_eq!(s.lines().nth(3), Some("  4 4 4"));
    // already Gamma centered
    assert!(!set_gamma_centered(&path)?);

    gut::fs::write_to_file(&path, "explicit\n2\nReciprocal\n0 0 0 1\n0.5 0 0 1\n")?;
    assert!(!set_gamma_centered(&path)?);

    Ok(())
}
// test:1 ends here
