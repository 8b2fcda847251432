// [[file:../../vasp-series.note::*imports][imports:1]]
use crate::common::*;
// imports:1 ends here

// [[file:../../vasp-series.note::*base][base:1]]
/// The summary line of one ionic step in OSZICAR
#[derive(Debug, Clone, PartialEq)]
pub struct IonicStep {
    pub n: usize,
    /// free energy, F
    pub free_energy: f64,
    /// energy(sigma->0), E0
    pub energy: f64,
    /// energy change from the last ionic step
    pub delta: Option<f64>,
    /// total magnetic moment
    pub mag: Option<f64>,
}

/// Represent a VASP produced OSZICAR file
#[derive(Debug, Clone, Default)]
pub struct Oszicar {
    pub ionic_steps: Vec<IonicStep>,
}
// base:1 ends here

// [[file:../../vasp-series.note::*parse][parse:1]]
mod parse {
    use super::*;
    use text_parser::parsers::*;

    //    1 F= -.85097948E+02 E0= -.85096866E+02  d E =-.850979E+02  mag=     2.9646
    fn read_energy(s: &str) -> IResult<&str, (usize, f64, f64)> {
        let (s, (_, n, _, _, _, f, _, _, _, e0)) = tuple((
            space0,
            unsigned_digit,
            space1,
            tag("F="),
            space0,
            double,
            space0,
            tag("E0="),
            space0,
            double,
        ))(s)?;
        Ok((s, (n, f, e0)))
    }

    // the first token after `key`
    fn value_after(s: &str, key: &str) -> Option<f64> {
        let rest = s.splitn(2, key).nth(1)?;
        rest.split_whitespace().next()?.parse().ok()
    }

    /// Parse one ionic step line. Return None for other lines.
    pub fn parse_ionic_step(line: &str) -> Option<IonicStep> {
        let (rest, (n, free_energy, energy)) = read_energy(line).ok()?;
        Some(IonicStep {
            n,
            free_energy,
            energy,
            delta: value_after(rest, "d E ="),
            mag: value_after(rest, "mag="),
        })
    }

    #[test]
    fn test_parse_ionic_step() {
        let s = "   1 F= -.84780990E+02 E0= -.84775142E+02  d E =-.847810E+02  mag=     3.2666";
        let step = parse_ionic_step(s).unwrap();
        assert_eq!(step.n, 1);
        assert_eq!(step.free_energy, -0.84780990E+02);
        assert_eq!(step.energy, -0.84775142E+02);
        assert_eq!(step.delta, Some(-0.847810E+02));
        assert_eq!(step.mag, Some(3.2666));

        let s = "  12 F= -.12345678E+03 E0= -.12345000E+03  d E =-.123457E+03";
        let step = parse_ionic_step(s).unwrap();
        assert_eq!(step.n, 12);
        assert_eq!(step.mag, None);

        let s = "RMM:   3    -0.850979389745E+02   -0.56772E+00   -0.10203E+00   340   0.227E+00";
        assert!(parse_ionic_step(s).is_none());
    }
}
// parse:1 ends here

// [[file:../../vasp-series.note::*api][api:1]]
impl Oszicar {
    /// Read all ionic steps from OSZICAR in `path`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = gut::fs::read_file(path).with_context(|| format!("read OSZICAR {:?}", path))?;
        let ionic_steps = s.lines().filter_map(parse::parse_ionic_step).collect();
        Ok(Self { ionic_steps })
    }

    /// The last ionic step if any.
    pub fn last_step(&self) -> Option<&IonicStep> {
        self.ionic_steps.last()
    }

    pub fn nsteps(&self) -> usize {
        self.ionic_steps.len()
    }
}

#[test]
fn test_oszicar_file() -> Result<()> {
    let oszicar = Oszicar::from_file("./tests/files/OSZICAR")?;
    assert_eq!(oszicar.nsteps(), 2);
    let last = oszicar.last_step().unwrap();
    assert_eq!(last.n, 2);
    assert_eq!(last.energy, -0.85096866E+02);

    // agrees with the token based energy extraction
    let e = crate::vasp::outcar::extract_energy("./tests/files/OSZICAR".as_ref())?;
    assert_eq!(e, last.energy);

    Ok(())
}
// api:1 ends here
