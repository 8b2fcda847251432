// [[file:../vasp-series.note::*docs][docs:1]]
//! Handle VASP INCAR file
// docs:1 ends here

// [[file:../vasp-series.note::*imports][imports:1]]
use crate::common::*;
// imports:1 ends here

// [[file:../vasp-series.note::*base][base:1]]
/// Parameters in VASP INCAR file, in the order they appear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Incar {
    // in tag = value pair
    params: Vec<(String, String)>,
}
// base:1 ends here

// [[file:../vasp-series.note::*parse][parse:1]]
impl Incar {
    /// Read VASP INCAR from `path`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        // INCAR file may contains invalid UTF-8 characters, so we handle it
        // using byte string
        let bytes = std::fs::read(path).with_context(|| format!("read INCAR {:?}", path))?;
        Ok(Self::parse_bytes(&bytes))
    }

    fn parse_bytes(bytes: &[u8]) -> Self {
        use bstr::ByteSlice;

        let mut params: Vec<(String, String)> = vec![];
        for line in bytes.lines() {
            // strip comments starting with "#" or "!"
            let line = match line.find_byteset(b"#!") {
                Some(i) => &line[..i],
                None => line,
            };
            // multiple tag = value pairs could appear in the same line,
            // separated by ";"
            for part in line.split_str(";") {
                let s = part.to_str_lossy();
                let kv: Vec<_> = s.splitn(2, '=').collect();
                if kv.len() != 2 {
                    continue;
                }
                let tag = kv[0].trim().to_uppercase();
                let value = kv[1].trim();
                if tag.is_empty() {
                    continue;
                }
                upsert(&mut params, &tag, value);
            }
        }

        Self { params }
    }
}

impl std::str::FromStr for Incar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self::parse_bytes(s.as_bytes()))
    }
}

fn upsert(params: &mut Vec<(String, String)>, tag: &str, value: &str) {
    if let Some(p) = params.iter_mut().find(|(t, _)| t == tag) {
        p.1 = value.to_string();
    } else {
        params.push((tag.to_string(), value.to_string()));
    }
}
// parse:1 ends here

// [[file:../vasp-series.note::*edit][edit:1]]
impl Incar {
    /// Return the value of `tag` (case insensitive).
    pub fn get(&self, tag: &str) -> Option<&str> {
        let tag = tag.to_uppercase();
        self.params.iter().find(|(t, _)| t == &tag).map(|(_, v)| v.as_str())
    }

    /// Parse the value of `tag` as f64, accepting Fortran style exponents.
    pub fn get_f64(&self, tag: &str) -> Option<f64> {
        let v = self.get(tag)?;
        v.replace(|c| c == 'd' || c == 'D', "e").parse().ok()
    }

    /// Parse the value of `tag` as i64.
    pub fn get_i64(&self, tag: &str) -> Option<i64> {
        self.get(tag)?.parse().ok()
    }

    /// Set `tag` to `value`, in place if the tag exists already, or append at
    /// the end.
    pub fn set(&mut self, tag: &str, value: &str) {
        upsert(&mut self.params, &tag.to_uppercase(), value);
    }

    /// Remove `tag`. Return the removed value if any.
    pub fn remove(&mut self, tag: &str) -> Option<String> {
        let tag = tag.to_uppercase();
        let i = self.params.iter().position(|(t, _)| t == &tag)?;
        Some(self.params.remove(i).1)
    }

    /// Iterate over all tag/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(t, v)| (t.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
// edit:1 ends here

// [[file:../vasp-series.note::*save][save:1]]
impl std::fmt::Display for Incar {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let n = self.params.iter().map(|(tag, _)| tag.len()).max().unwrap_or(0);
        for (tag, value) in self.params.iter() {
            writeln!(f, "{:n$} = {}", tag, value, n = n)?;
        }
        Ok(())
    }
}

impl Incar {
    /// Save as INCAR file in `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if self.params.is_empty() {
            bail!("refuse to write empty INCAR: {:?}", path);
        }
        gut::fs::write_to_file(path, &self.to_string()).with_context(|| format!("write INCAR {:?}", path))?;
        Ok(())
    }
}

/// Read INCAR in `path`, apply `f`, and write it back.
pub fn update_incar_file<F>(path: &Path, f: F) -> Result<()>
where
    F: FnOnce(&mut Incar),
{
    let mut incar = Incar::from_file(path)?;
    f(&mut incar);
    incar.save(path)?;

    Ok(())
}
// save:1 ends here

// test:1 ends here
