// [[file:../vasp-series.note::*docs][docs:1]]
//! VASP files involved in a calculation
// docs:1 ends here

// [[file:../vasp-series.note::*mods][mods:1]]
pub mod oszicar;
pub mod outcar;
// mods:1 ends here

// [[file:../vasp-series.note::*files][files:1]]
/// Input files VASP reads from the working directory.
pub const VASP_INPUT_FILES: &[&str] = &["INCAR", "KPOINTS", "POSCAR", "POTCAR"];

/// Files renamed or copied with the job suffix after a run. POTCAR is left
/// out on purpose, as following calculations read it under its plain name.
pub const VASP_OUTPUT_FILES: &[&str] = &[
    "INCAR",
    "KPOINTS",
    "POSCAR",
    "CONTCAR",
    "OUTCAR",
    "OSZICAR",
    "vasprun.xml",
    "WAVECAR",
    "CHGCAR",
    "CHG",
    "DOSCAR",
    "EIGENVAL",
    "PROCAR",
    "PCDAT",
    "XDATCAR",
    "IBZKPT",
    "REPORT",
];

/// Files saved into `error.N` directory when an error is corrected.
pub const VASP_BACKUP_FILES: &[&str] = &[
    "INCAR",
    "KPOINTS",
    "POSCAR",
    "OUTCAR",
    "CONTCAR",
    "OSZICAR",
    "vasprun.xml",
];
// files:1 ends here
