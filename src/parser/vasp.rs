//! Shallow VASP directory parser.
//!
//! Reads the input files (`INCAR`, `POSCAR`, optional `KPOINTS` and
//! `POTCAR` headers) into the hashed input description, transfers the raw
//! output files into the staging directory, and classifies the calculation
//! from its INCAR tags. Output files are not decoded beyond a line count
//! and a completion probe on `OUTCAR`.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use mvd_model::{calc_type, InputDescription, JFData, TaskState};
use mvd_store::{transfer, write_sidecar_json};
use serde_json::{json, Map, Number, Value};
use tracing::debug;

use super::{ParseError, ParseOptions, ParsedTask, TaskParser};

/// Output files kept when the caller does not choose.
pub const DEFAULT_OUTPUTS: &[&str] = &["CONTCAR", "OSZICAR", "OUTCAR", "vasprun.xml"];

/// Longest numeric array an INCAR value may expand to; longer values
/// are kept as strings.
const MAX_INCAR_ARRAY: usize = 100_000;

/// Footer VASP prints after a completed run.
const OUTCAR_FOOTER: &[u8] = b"General timing and accounting";

/// Parser for the `vasp` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaspParser;

impl VaspParser {
    pub fn new() -> Self {
        Self
    }
}

impl TaskParser for VaspParser {
    fn format(&self) -> &str {
        "vasp"
    }

    fn parse(
        &self,
        source_dir: &Path,
        staging_dir: &Path,
        options: &ParseOptions,
    ) -> Result<ParsedTask, ParseError> {
        let incar = parse_incar(&read_required(source_dir, "INCAR")?)?;
        let potcar = match read_optional(source_dir, "POTCAR")? {
            Some(text) => Some(parse_potcar(&text)?),
            None => None,
        };
        let poscar = parse_poscar(&read_required(source_dir, "POSCAR")?, potcar.as_ref())?;
        let kpoints = read_optional(source_dir, "KPOINTS")?.map(|text| parse_kpoints(&text));

        let line_mode = kpoints.as_ref().map_or(false, |k| k.line_mode);
        let calc = calc_type(&incar, line_mode);
        debug!(calc_type = %calc, "classified");

        let input = build_input(&incar, &poscar, kpoints.as_ref(), potcar.as_ref());

        let mut files = Map::new();
        let names: Vec<String> = match &options.outputs {
            Some(names) => names.clone(),
            None => DEFAULT_OUTPUTS.iter().map(|s| s.to_string()).collect(),
        };
        for name in &names {
            let entry = keep_output(name, source_dir, staging_dir, options)?;
            files.insert(output_key(name), serde_json::to_value(entry)?);
        }

        let state = probe_state(source_dir)?;
        let output = json!({
            "state": state,
            "files": files,
        });

        let mut extra = Map::new();
        extra.insert("run_type".to_string(), json!(calc.run_type.to_string()));
        extra.insert("task_type".to_string(), json!(calc.task_type.to_string()));
        extra.insert("state".to_string(), json!(state));

        Ok(ParsedTask {
            input: InputDescription::new(Value::Object(input)),
            output,
            classification: calc.to_string(),
            extra,
        })
    }
}

/// `vasprun.xml` is recorded as `VASPRUN`; other outputs by file name.
fn output_key(name: &str) -> String {
    if name == "vasprun.xml" {
        "VASPRUN".to_string()
    } else {
        name.to_string()
    }
}

fn read_required(dir: &Path, name: &str) -> Result<String, ParseError> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(ParseError::MissingFile(path));
    }
    decode(name, fs::read(&path)?)
}

fn read_optional(dir: &Path, name: &str) -> Result<Option<String>, ParseError> {
    let path = dir.join(name);
    if !path.is_file() {
        return Ok(None);
    }
    decode(name, fs::read(&path)?).map(Some)
}

fn decode(name: &str, bytes: Vec<u8>) -> Result<String, ParseError> {
    String::from_utf8(bytes).map_err(|_| ParseError::malformed(name, "not valid UTF-8"))
}

// ===== INCAR =====

fn parse_incar(text: &str) -> Result<Map<String, Value>, ParseError> {
    let mut tags = Map::new();
    for raw in text.lines() {
        let line = match raw.find(|c| c == '!' || c == '#') {
            Some(i) => &raw[..i],
            None => raw,
        };
        for statement in line.split(';') {
            let Some((key, value)) = statement.split_once('=') else {
                continue;
            };
            let key = key.trim().to_uppercase();
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(ParseError::malformed(
                    "INCAR",
                    format!("bad tag name in {:?}", statement.trim()),
                ));
            }
            tags.insert(key, incar_value(value.trim()));
        }
    }

    if tags.is_empty() {
        return Err(ParseError::malformed("INCAR", "no tags found"));
    }
    Ok(tags)
}

/// Numeric lists (with `N*x` repeats) become arrays; anything else, or a
/// list longer than [`MAX_INCAR_ARRAY`], is a scalar.
fn incar_value(raw: &str) -> Value {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() > 1 || raw.contains('*') {
        let mut items = Vec::new();
        for token in &tokens {
            let room = MAX_INCAR_ARRAY - items.len();
            match expand_repeat(token, room) {
                Some(values) => items.extend(values),
                None => return Value::String(raw.to_string()),
            }
        }
        return Value::Array(items);
    }
    scalar_value(raw)
}

/// Expand one token, or `None` if it is not numeric or would produce more
/// than `room` values.
fn expand_repeat(token: &str, room: usize) -> Option<Vec<Value>> {
    let (count, value) = match token.split_once('*') {
        Some((count, value)) => (count.parse::<usize>().ok()?, value),
        None => (1, token),
    };
    if count > room {
        return None;
    }
    let value = number_value(value)?;
    Some(vec![value; count])
}

fn scalar_value(raw: &str) -> Value {
    match raw.to_uppercase().as_str() {
        ".TRUE." | "TRUE" | "T" => return Value::Bool(true),
        ".FALSE." | "FALSE" | "F" => return Value::Bool(false),
        _ => {}
    }
    number_value(raw).unwrap_or_else(|| Value::String(raw.to_string()))
}

fn number_value(raw: &str) -> Option<Value> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::from(i));
    }
    // Fortran exponent spelling: 1.0D-5
    let f: f64 = raw.replace(['d', 'D'], "e").parse().ok()?;
    Number::from_f64(f).map(Value::Number)
}

// ===== POSCAR =====

#[derive(Debug)]
struct Poscar {
    lattice: [[f64; 3]; 3],
    species: Vec<String>,
    counts: Vec<u64>,
    cartesian: bool,
    positions: Vec<[f64; 3]>,
}

impl Poscar {
    /// Species → atom count, in order of first appearance.
    fn composition(&self) -> Vec<(String, u64)> {
        let mut out: Vec<(String, u64)> = Vec::new();
        for (species, count) in self.species.iter().zip(&self.counts) {
            match out.iter_mut().find(|(s, _)| s == species) {
                Some((_, n)) => *n += count,
                None => out.push((species.clone(), *count)),
            }
        }
        out
    }

    fn formula(&self) -> String {
        self.composition()
            .iter()
            .map(|(species, n)| {
                if *n == 1 {
                    species.clone()
                } else {
                    format!("{}{}", species, n)
                }
            })
            .collect()
    }
}

fn parse_poscar(text: &str, potcar: Option<&Potcar>) -> Result<Poscar, ParseError> {
    let bad = |reason: String| ParseError::malformed("POSCAR", reason);
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < 7 {
        return Err(bad(format!("expected at least 7 lines, found {}", lines.len())));
    }

    let scale: f64 = lines[1]
        .split_whitespace()
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| bad(format!("bad scale factor {:?}", lines[1].trim())))?;

    let mut lattice = [[0.0; 3]; 3];
    for (row, line) in lattice.iter_mut().zip(&lines[2..5]) {
        *row = parse_vector(line).ok_or_else(|| bad(format!("bad lattice vector {:?}", line.trim())))?;
    }

    let factor = if scale > 0.0 {
        scale
    } else if scale < 0.0 {
        // Negative scale is the target cell volume
        let volume = determinant(&lattice).abs();
        if volume == 0.0 {
            return Err(bad("degenerate lattice".to_string()));
        }
        (scale.abs() / volume).cbrt()
    } else {
        return Err(bad("zero scale factor".to_string()));
    };
    for row in lattice.iter_mut() {
        for x in row.iter_mut() {
            *x *= factor;
        }
    }

    // VASP 5 puts species names before the counts line; VASP 4 does not.
    let mut cursor = 5;
    let first: Vec<&str> = lines[cursor].split_whitespace().collect();
    let names_line = first.iter().any(|t| t.parse::<u64>().is_err());
    let mut species: Vec<String> = Vec::new();
    if names_line {
        species = first.iter().map(|s| s.to_string()).collect();
        cursor += 1;
    }

    let counts: Vec<u64> = lines
        .get(cursor)
        .ok_or_else(|| bad("missing atom counts".to_string()))?
        .split_whitespace()
        .map(|t| t.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|_| bad(format!("bad atom counts {:?}", lines[cursor].trim())))?;
    cursor += 1;

    if species.is_empty() {
        species = potcar.map(Potcar::labels).unwrap_or_default();
    }
    if species.len() != counts.len() {
        return Err(bad(format!(
            "{} species for {} atom counts",
            species.len(),
            counts.len()
        )));
    }

    let mut mode = lines
        .get(cursor)
        .ok_or_else(|| bad("missing coordinate mode".to_string()))?
        .trim();
    if mode.starts_with(['S', 's']) {
        cursor += 1;
        mode = lines
            .get(cursor)
            .ok_or_else(|| bad("missing coordinate mode".to_string()))?
            .trim();
    }
    let cartesian = mode.starts_with(['C', 'c', 'K', 'k']);
    cursor += 1;

    let total = counts
        .iter()
        .try_fold(0u64, |acc, &n| acc.checked_add(n))
        .ok_or_else(|| bad("atom counts overflow".to_string()))?;
    let available = lines.len().saturating_sub(cursor);
    if total > available as u64 {
        return Err(bad(format!("expected {} positions, found {}", total, available)));
    }
    let mut positions = Vec::with_capacity(total as usize);
    for i in 0..total as usize {
        let line = lines
            .get(cursor + i)
            .ok_or_else(|| bad(format!("expected {} positions, found {}", total, i)))?;
        let mut xyz = parse_vector(line).ok_or_else(|| bad(format!("bad position {:?}", line.trim())))?;
        if cartesian {
            for x in xyz.iter_mut() {
                *x *= factor;
            }
        }
        positions.push(xyz);
    }

    Ok(Poscar {
        lattice,
        species,
        counts,
        cartesian,
        positions,
    })
}

fn parse_vector(line: &str) -> Option<[f64; 3]> {
    let mut it = line.split_whitespace().map(|t| t.parse::<f64>());
    let x = it.next()?.ok()?;
    let y = it.next()?.ok()?;
    let z = it.next()?.ok()?;
    Some([x, y, z])
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

// ===== KPOINTS / POTCAR =====

#[derive(Debug)]
struct Kpoints {
    /// Non-empty lines after the comment
    lines: Vec<String>,
    line_mode: bool,
}

fn parse_kpoints(text: &str) -> Kpoints {
    let line_mode = text
        .lines()
        .nth(2)
        .map_or(false, |l| l.trim_start().starts_with(['L', 'l']));
    let lines = text
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    Kpoints { lines, line_mode }
}

#[derive(Debug)]
struct Potcar {
    /// `TITEL` values, e.g. `PAW_PBE Fe 06Sep2000`
    symbols: Vec<String>,
}

impl Potcar {
    fn labels(&self) -> Vec<String> {
        self.symbols
            .iter()
            .filter_map(|s| s.split_whitespace().nth(1))
            .map(str::to_string)
            .collect()
    }

    fn summary(&self) -> Value {
        let head = self
            .symbols
            .first()
            .and_then(|s| s.split_whitespace().next())
            .unwrap_or_default();
        let mut parts = head.split('_');
        let pot_type = parts.next().unwrap_or_default();
        let functional = parts.next().unwrap_or("LDA");
        json!({
            "pot_type": pot_type,
            "functional": functional,
            "labels": self.labels(),
        })
    }
}

fn parse_potcar(text: &str) -> Result<Potcar, ParseError> {
    let symbols: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("TITEL"))
        .filter_map(|l| l.split_once('='))
        .map(|(_, v)| v.trim().to_string())
        .collect();
    if symbols.is_empty() {
        return Err(ParseError::malformed("POTCAR", "no TITEL lines"));
    }
    Ok(Potcar { symbols })
}

// ===== Input description =====

fn build_input(
    incar: &Map<String, Value>,
    poscar: &Poscar,
    kpoints: Option<&Kpoints>,
    potcar: Option<&Potcar>,
) -> Map<String, Value> {
    let sites: Vec<Value> = poscar
        .species
        .iter()
        .zip(&poscar.counts)
        .flat_map(|(species, n)| std::iter::repeat(species).take(*n as usize))
        .zip(&poscar.positions)
        .map(|(species, xyz)| json!({"species": species, "xyz": xyz}))
        .collect();

    let composition: Map<String, Value> = poscar
        .composition()
        .into_iter()
        .map(|(species, n)| (species, json!(n)))
        .collect();

    let is_hubbard = matches!(incar.get("LDAU"), Some(Value::Bool(true)));
    let mut hubbards = Map::new();
    if is_hubbard {
        if let Some(Value::Array(u)) = incar.get("LDAUU") {
            for (species, value) in poscar.species.iter().zip(u) {
                hubbards.insert(species.clone(), value.clone());
            }
        }
    }

    let mut input = Map::new();
    input.insert("code".to_string(), json!("vasp"));
    input.insert("parameters".to_string(), Value::Object(incar.clone()));
    input.insert(
        "structure".to_string(),
        json!({
            "lattice": poscar.lattice,
            "coords": if poscar.cartesian { "cartesian" } else { "direct" },
            "sites": sites,
        }),
    );
    input.insert("composition".to_string(), Value::Object(composition));
    input.insert("formula".to_string(), json!(poscar.formula()));
    input.insert("is_hubbard".to_string(), json!(is_hubbard));
    input.insert("hubbards".to_string(), Value::Object(hubbards));
    if let Some(k) = kpoints {
        input.insert("kpoints".to_string(), json!(k.lines));
    }
    if let Some(p) = potcar {
        input.insert("pseudo_potentials".to_string(), p.summary());
    }
    input
}

// ===== Outputs =====

fn keep_output(
    name: &str,
    source_dir: &Path,
    staging_dir: &Path,
    options: &ParseOptions,
) -> Result<JFData, ParseError> {
    let path = source_dir.join(name);
    if !path.is_file() {
        debug!(file = %name, "output absent");
        return Ok(JFData::default());
    }

    let stored = transfer(name, source_dir, staging_dir, &options.transfer)?;
    let (size, lines) = file_stats(&path)?;
    let summary = json!({"file": name, "size": size, "lines": lines});
    let json_file_name = write_sidecar_json(&summary, name, staging_dir)?;

    Ok(JFData {
        description: format!("VASP {}", name),
        file_fmt: options.transfer.compress.map(|c| c.extension().to_string()),
        file_name: Some(stored),
        json_file_name: Some(json_file_name),
    })
}

fn file_stats(path: &Path) -> Result<(u64, u64), ParseError> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 64 * 1024];
    let mut size = 0u64;
    let mut lines = 0u64;
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        size += n as u64;
        lines += buffer[..n].iter().filter(|&&b| b == b'\n').count() as u64;
    }
    Ok((size, lines))
}

fn probe_state(source_dir: &Path) -> Result<TaskState, ParseError> {
    let path = source_dir.join("OUTCAR");
    if !path.is_file() {
        return Ok(TaskState::Unknown);
    }
    let reader = BufReader::new(File::open(&path)?);
    for line in reader.split(b'\n') {
        let line = line?;
        if line.windows(OUTCAR_FOOTER.len()).any(|w| w == OUTCAR_FOOTER) {
            return Ok(TaskState::Successful);
        }
    }
    Ok(TaskState::Failed)
}
