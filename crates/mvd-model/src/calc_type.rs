//! Calculation classification for VASP-style INCAR parameter sets.
//!
//! The classification is an opaque label carried through the cache
//! unchanged (`"<run type> <task type>"`, e.g. `"PBEsol+U Static"`).
//! Run types are decided in a fixed evaluation order: hybrid functionals,
//! van der Waals functionals, meta-GGAs, then plain GGAs. Parameters absent
//! from the INCAR fall back to VASP defaults.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Exchange-correlation functional family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Functional {
    Gga,
    PbeSol,
    Am05,
    Pw91,
    RevPbe,
    OptB88,
    OptB86b,
    VdwDf,
    Scan,
    R2Scan,
    Hse06,
    Pbe0,
    Hf,
    Lda,
}

impl fmt::Display for Functional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Functional::Gga => "GGA",
            Functional::PbeSol => "PBEsol",
            Functional::Am05 => "AM05",
            Functional::Pw91 => "PW91",
            Functional::RevPbe => "revPBE",
            Functional::OptB88 => "optB88",
            Functional::OptB86b => "optB86b",
            Functional::VdwDf => "vdW-DF",
            Functional::Scan => "SCAN",
            Functional::R2Scan => "r2SCAN",
            Functional::Hse06 => "HSE06",
            Functional::Pbe0 => "PBE0",
            Functional::Hf => "HF",
            Functional::Lda => "LDA",
        };
        write!(f, "{}", name)
    }
}

/// Functional plus Hubbard correction flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunType {
    pub functional: Functional,
    pub hubbard: bool,
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hubbard {
            write!(f, "{}+U", self.functional)
        } else {
            write!(f, "{}", self.functional)
        }
    }
}

/// Kind of calculation performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    NscfLine,
    NscfUniform,
    Dielectric,
    DfptDielectric,
    Dfpt,
    NmrNuclearShielding,
    NmrElectricFieldGradient,
    Static,
    StructureOptimization,
    Deformation,
    Unrecognized,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskType::NscfLine => "NSCF Line",
            TaskType::NscfUniform => "NSCF Uniform",
            TaskType::Dielectric => "Dielectric",
            TaskType::DfptDielectric => "DFPT Dielectric",
            TaskType::Dfpt => "DFPT",
            TaskType::NmrNuclearShielding => "NMR Nuclear Shielding",
            TaskType::NmrElectricFieldGradient => "NMR Electric Field Gradient",
            TaskType::Static => "Static",
            TaskType::StructureOptimization => "Structure Optimization",
            TaskType::Deformation => "Deformation",
            TaskType::Unrecognized => "Unrecognized",
        };
        write!(f, "{}", name)
    }
}

/// Combined run type and task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalcType {
    pub run_type: RunType,
    pub task_type: TaskType,
}

impl fmt::Display for CalcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.run_type, self.task_type)
    }
}

/// Determine the run type from INCAR parameters.
pub fn run_type(incar: &Map<String, Value>) -> RunType {
    let hubbard = flag(incar, "LDAU");

    let functional = if flag(incar, "LHFCALC") {
        if number(incar, "HFSCREEN").map_or(false, |v| v > 0.0) {
            Functional::Hse06
        } else if number(incar, "AEXX").map_or(false, |v| (v - 1.0).abs() < 1e-6) {
            Functional::Hf
        } else {
            Functional::Pbe0
        }
    } else if flag(incar, "LUSE_VDW") {
        match text(incar, "GGA").as_deref() {
            Some("BO") => Functional::OptB88,
            Some("MK") => Functional::OptB86b,
            _ => Functional::VdwDf,
        }
    } else if let Some(meta) = text(incar, "METAGGA") {
        match meta.as_str() {
            "SCAN" => Functional::Scan,
            "R2SCAN" => Functional::R2Scan,
            _ => gga_functional(incar),
        }
    } else {
        gga_functional(incar)
    };

    RunType {
        functional,
        hubbard,
    }
}

fn gga_functional(incar: &Map<String, Value>) -> Functional {
    match text(incar, "GGA").as_deref() {
        // Functional comes from the POTCAR headers (PBE in practice)
        None | Some("PE") | Some("--") => Functional::Gga,
        Some("PS") => Functional::PbeSol,
        Some("AM") => Functional::Am05,
        Some("91") => Functional::Pw91,
        Some("RE") => Functional::RevPbe,
        Some(_) => Functional::Lda,
    }
}

/// Determine the task type from INCAR parameters.
///
/// `kpoints_line_mode` is true when the KPOINTS file describes a band
/// structure path.
pub fn task_type(incar: &Map<String, Value>, kpoints_line_mode: bool) -> TaskType {
    let ibrion = number(incar, "IBRION").unwrap_or(0.0);

    if number(incar, "ICHARG").unwrap_or(0.0) > 10.0 {
        if kpoints_line_mode {
            TaskType::NscfLine
        } else {
            TaskType::NscfUniform
        }
    } else if flag(incar, "LEPSILON") {
        if ibrion > 6.0 {
            TaskType::DfptDielectric
        } else {
            TaskType::Dielectric
        }
    } else if ibrion > 6.0 {
        TaskType::Dfpt
    } else if flag(incar, "LCHIMAG") {
        TaskType::NmrNuclearShielding
    } else if flag(incar, "LEFG") {
        TaskType::NmrElectricFieldGradient
    } else if number(incar, "NSW").unwrap_or(1.0) == 0.0 {
        TaskType::Static
    } else if number(incar, "ISIF").unwrap_or(2.0) == 3.0 && ibrion > 0.0 {
        TaskType::StructureOptimization
    } else if number(incar, "ISIF").unwrap_or(3.0) == 2.0 && ibrion > 0.0 {
        TaskType::Deformation
    } else {
        TaskType::Unrecognized
    }
}

/// Determine the combined calculation type.
pub fn calc_type(incar: &Map<String, Value>, kpoints_line_mode: bool) -> CalcType {
    CalcType {
        run_type: run_type(incar),
        task_type: task_type(incar, kpoints_line_mode),
    }
}

fn flag(incar: &Map<String, Value>, key: &str) -> bool {
    match incar.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => {
            let s = s.trim().trim_start_matches('.').to_uppercase();
            s.starts_with('T')
        }
        _ => false,
    }
}

fn number(incar: &Map<String, Value>, key: &str) -> Option<f64> {
    match incar.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(incar: &Map<String, Value>, key: &str) -> Option<String> {
    match incar.get(key)? {
        Value::String(s) => Some(s.trim().to_uppercase()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn incar(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_is_gga() {
        let rt = run_type(&incar(json!({"ENCUT": 520})));
        assert_eq!(rt.to_string(), "GGA");
    }

    #[test]
    fn test_hubbard_suffix() {
        let rt = run_type(&incar(json!({"LDAU": true, "GGA": "PS"})));
        assert_eq!(rt.to_string(), "PBEsol+U");
    }

    #[test]
    fn test_hybrid_before_vdw() {
        let rt = run_type(&incar(json!({"LHFCALC": true, "HFSCREEN": 0.2, "LUSE_VDW": true})));
        assert_eq!(rt.functional, Functional::Hse06);
    }

    #[test]
    fn test_metagga_case_insensitive() {
        let rt = run_type(&incar(json!({"METAGGA": "r2scan"})));
        assert_eq!(rt.functional, Functional::R2Scan);
    }

    #[test]
    fn test_relax_task_type() {
        let params = incar(json!({"NSW": 99, "IBRION": 2, "ISIF": 3}));
        assert_eq!(task_type(&params, false), TaskType::StructureOptimization);
    }

    #[test]
    fn test_static_task_type() {
        let params = incar(json!({"NSW": 0, "IBRION": -1}));
        assert_eq!(task_type(&params, false), TaskType::Static);
    }

    #[test]
    fn test_nscf_line_mode() {
        let params = incar(json!({"ICHARG": 11}));
        assert_eq!(task_type(&params, true), TaskType::NscfLine);
        assert_eq!(task_type(&params, false), TaskType::NscfUniform);
    }

    #[test]
    fn test_dfpt_dielectric() {
        let params = incar(json!({"LEPSILON": ".TRUE.", "IBRION": 8}));
        assert_eq!(task_type(&params, false), TaskType::DfptDielectric);
    }

    #[test]
    fn test_isif_two_is_deformation() {
        let params = incar(json!({"NSW": 10, "IBRION": 2, "ISIF": 2}));
        assert_eq!(task_type(&params, false), TaskType::Deformation);
    }

    #[test]
    fn test_ionic_steps_without_isif_unrecognized() {
        let params = incar(json!({"NSW": 10, "IBRION": 2}));
        assert_eq!(task_type(&params, false), TaskType::Unrecognized);
    }

    #[test]
    fn test_calc_type_label() {
        let params = incar(json!({"NSW": 0, "LDAU": "T"}));
        assert_eq!(calc_type(&params, false).to_string(), "GGA+U Static");
    }
}
