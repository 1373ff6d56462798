//! Integration tests: built-in VASP parser through the ingestor

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use matvird_ingest::model::{JFData, TaskRecord, TASK_FILENAME};
use matvird_ingest::store::{read_tag, Compression, TransferOptions};
use matvird_ingest::{IngestConfig, IngestError, ParseOptions, ParserRegistry, TaskIngestor};
use tempfile::TempDir;

const POSCAR: &str = "Si2\n5.43\n0.0 0.5 0.5\n0.5 0.0 0.5\n0.5 0.5 0.0\nSi\n2\nDirect\n0.00 0.00 0.00\n0.25 0.25 0.25\n";
const POTCAR: &str = "  PAW_PBE Si 05Jan2001\n   TITEL  = PAW_PBE Si 05Jan2001\n";
const OUTCAR_DONE: &str = " free energy TOTEN = -10.8 eV\n General timing and accounting informations for this job:\n";

fn write_calc(dir: &Path, incar: &str, kpoints: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("INCAR"), incar).unwrap();
    fs::write(dir.join("POSCAR"), POSCAR).unwrap();
    fs::write(dir.join("POTCAR"), POTCAR).unwrap();
    fs::write(dir.join("KPOINTS"), kpoints).unwrap();
    fs::write(dir.join("OUTCAR"), OUTCAR_DONE).unwrap();
    fs::write(dir.join("OSZICAR"), "   1 F= -.108E+02 E0= -.108E+02\n").unwrap();
    fs::write(dir.join("vasprun.xml"), "<modeling></modeling>\n").unwrap();
}

fn setup() -> (TempDir, TaskIngestor) {
    let temp = TempDir::new().unwrap();
    let config = IngestConfig::new(temp.path().join("repository"));
    let ingestor = TaskIngestor::new(config, ParserRegistry::with_builtin()).unwrap();
    (temp, ingestor)
}

fn options(ingestor: &TaskIngestor) -> ParseOptions {
    ParseOptions {
        transfer: ingestor.config().transfer_options(),
        tags: vec!["si".to_string()],
        ..ParseOptions::default()
    }
}

fn static_calc(temp: &TempDir, name: &str) -> PathBuf {
    let dir = temp.path().join(name);
    write_calc(&dir, "ENCUT = 520\nNSW = 0\nISMEAR = 0\n", "Automatic\n0\nGamma\n8 8 8\n");
    dir
}

#[test]
fn test_static_calculation() {
    let (temp, ingestor) = setup();
    let src = static_calc(&temp, "si-static");

    let outcome = ingestor.ingest(&src, "vasp", &options(&ingestor)).unwrap();

    assert_eq!(outcome.classification, "GGA Static");
    assert_eq!(outcome.entry_dir, ingestor.config().tasks_root().join(&outcome.digest));

    let record = TaskRecord::from_file(&outcome.entry_dir.join(TASK_FILENAME)).unwrap();
    assert_eq!(record.task_id, outcome.digest);
    assert_eq!(record.format, "vasp");
    assert_eq!(record.input.get("formula").unwrap(), "Si2");
    assert_eq!(record.input.get("pseudo_potentials").unwrap()["functional"], "PBE");
    assert_eq!(record.output["state"], "successful");
    assert_eq!(record.meta.tags, vec!["si"]);
    assert_eq!(record.meta.extra["run_type"], "GGA");

    let tag = read_tag(&src).unwrap().unwrap();
    assert_eq!(tag.digest, outcome.digest);
    assert_eq!(tag.format(), Some("vasp"));
}

#[test]
fn test_outputs_compressed_into_entry() {
    let (temp, ingestor) = setup();
    let src = static_calc(&temp, "si-static");

    let outcome = ingestor.ingest(&src, "vasp", &options(&ingestor)).unwrap();
    let record = ingestor.load(&outcome.digest).unwrap();

    let vasprun: JFData = serde_json::from_value(record.output["files"]["VASPRUN"].clone()).unwrap();
    let stored = vasprun.file_name.unwrap();
    assert!(stored.ends_with("-vasprun.xml.gz"));
    assert_eq!(vasprun.file_fmt.as_deref(), Some(Compression::Gzip.extension()));

    let mut text = String::new();
    GzDecoder::new(fs::File::open(outcome.entry_dir.join(&stored)).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "<modeling></modeling>\n");

    let sidecar = outcome.entry_dir.join(vasprun.json_file_name.unwrap());
    let summary: serde_json::Value = serde_json::from_str(&fs::read_to_string(sidecar).unwrap()).unwrap();
    assert_eq!(summary["lines"], 1);

    // CONTCAR absent from the source: recorded without a file
    let contcar: JFData = serde_json::from_value(record.output["files"]["CONTCAR"].clone()).unwrap();
    assert!(!contcar.is_present());
}

#[test]
fn test_plain_transfer_keeps_names() {
    let (temp, ingestor) = setup();
    let src = static_calc(&temp, "si-static");
    let options = ParseOptions {
        transfer: TransferOptions::plain(),
        outputs: Some(vec!["OUTCAR".to_string()]),
        ..ParseOptions::default()
    };

    let outcome = ingestor.ingest(&src, "vasp", &options).unwrap();

    assert_eq!(fs::read_to_string(outcome.entry_dir.join("OUTCAR")).unwrap(), OUTCAR_DONE);
}

#[test]
fn test_copied_directory_is_cache_hit_by_content() {
    let (temp, ingestor) = setup();
    let a = static_calc(&temp, "original");
    let b = static_calc(&temp, "archive/copy");

    let first = ingestor.ingest(&a, "vasp", &options(&ingestor)).unwrap();
    let second = ingestor.ingest(&b, "vasp", &options(&ingestor)).unwrap();
    let again = ingestor.ingest(&a, "vasp", &options(&ingestor)).unwrap();

    assert_eq!(first.digest, second.digest);
    assert!(!second.cached);
    assert!(again.cached);
    assert_eq!(ingestor.stager().list_entries().unwrap().len(), 1);
}

#[test]
fn test_band_structure_classification() {
    let (temp, ingestor) = setup();
    let src = temp.path().join("si-bands");
    write_calc(
        &src,
        "ICHARG = 11\nLORBIT = 11\n",
        "G-X\n20\nLine-mode\nReciprocal\n0 0 0 ! G\n0.5 0 0.5 ! X\n",
    );

    let outcome = ingestor.ingest(&src, "vasp", &options(&ingestor)).unwrap();

    assert_eq!(outcome.classification, "GGA NSCF Line");
}

#[test]
fn test_hybrid_relaxation_classification() {
    let (temp, ingestor) = setup();
    let src = temp.path().join("si-hse");
    write_calc(
        &src,
        "LHFCALC = .TRUE.\nHFSCREEN = 0.2\nIBRION = 2\nISIF = 3\nNSW = 50\n",
        "Automatic\n0\nGamma\n4 4 4\n",
    );

    let outcome = ingestor.ingest(&src, "vasp", &options(&ingestor)).unwrap();

    assert_eq!(outcome.classification, "HSE06 Structure Optimization");
}

#[test]
fn test_missing_poscar_is_parse_error() {
    let (temp, ingestor) = setup();
    let src = static_calc(&temp, "broken");
    fs::remove_file(src.join("POSCAR")).unwrap();

    let err = ingestor.ingest(&src, "vasp", &options(&ingestor)).unwrap_err();

    assert!(matches!(err, IngestError::Parse { ref format, .. } if format == "vasp"));
    assert!(err.to_string().contains("POSCAR"));
    assert!(ingestor.stager().list_entries().unwrap().is_empty());
    assert!(ingestor.stager().list_staging().unwrap().is_empty());
    assert!(read_tag(&src).unwrap().is_none());
}

#[test]
fn test_oversized_counts_are_parse_errors() {
    let (temp, ingestor) = setup();
    let counts = ["18446744073709551615 1", "4000000000000000000 1"];

    for (i, line) in counts.iter().enumerate() {
        let src = static_calc(&temp, &format!("bad-{}", i));
        let poscar = format!("cell\n1.0\n1 0 0\n0 1 0\n0 0 1\nSi O\n{}\nDirect\n0 0 0\n", line);
        fs::write(src.join("POSCAR"), poscar).unwrap();

        let err = ingestor.ingest(&src, "vasp", &options(&ingestor)).unwrap_err();

        assert!(matches!(err, IngestError::Parse { .. }), "{}: {}", line, err);
        assert!(read_tag(&src).unwrap().is_none());
    }
    assert!(ingestor.stager().list_entries().unwrap().is_empty());
    assert!(ingestor.stager().list_staging().unwrap().is_empty());
}

#[test]
fn test_oversized_incar_repeat_is_kept_verbatim() {
    let (temp, ingestor) = setup();
    let src = static_calc(&temp, "si-magmom");
    fs::write(src.join("INCAR"), "NSW = 0\nMAGMOM = 100000000000*1\n").unwrap();

    let outcome = ingestor.ingest(&src, "vasp", &options(&ingestor)).unwrap();
    let record = ingestor.load(&outcome.digest).unwrap();

    assert_eq!(record.input.get("parameters").unwrap()["MAGMOM"], "100000000000*1");
}
