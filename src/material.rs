//! Refractive-index data sources.
//!
//! The [`CriProvider`] trait is the seam between stack assembly and wherever
//! index data lives. [`MaterialLibrary`] is the file-backed implementation used
//! by the binary; tests supply in-memory providers.

use ndarray::Array1;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Result, StackError};
use crate::helpers::{resample, sort_by_abscissa};
use crate::layer::{CriSource, GradingReference};
use crate::stack::EffectiveLayer;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_nk_file_in_micrometres() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "si.dat",
            "wvl [mum]\tn\tk\n0.6\t3.9\t0.02\n0.4\t5.6\t0.3\n0.5\t4.3\t0.07\n",
        );
        let raw = read_nk_file(&path, "layer 'si'").unwrap();
        assert_eq!(raw.wavelength, vec![400.0, 500.0, 600.0]);
        assert_eq!(raw.n, vec![5.6, 4.3, 3.9]);
        assert_eq!(raw.k, vec![0.3, 0.07, 0.02]);
    }

    #[test]
    fn rejects_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "bad.dat", "400\t1.5\n");
        let err = read_nk_file(&path, "layer 'bad'").unwrap_err();
        assert!(matches!(err, StackError::Load { .. }));
        assert!(err.to_string().contains("bad.dat"));
    }

    #[test]
    fn alpha_file_in_inverse_centimetres() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "a.dat", "wvl alpha [cm^-1]\n500\t1e4\n600\t1e3\n");
        let raw = read_alpha_file(&path, 3.0, "layer 'a'").unwrap();
        let expected = 1e4 * 1e-7 * 500.0 / (4.0 * std::f64::consts::PI);
        assert!((raw.k[0] - expected).abs() < 1e-15);
        assert_eq!(raw.n, vec![3.0, 3.0]);
    }

    #[test]
    fn resampling_requires_coverage() {
        let raw = RawCri {
            wavelength: vec![400.0, 800.0],
            n: vec![1.4, 1.6],
            k: vec![0.0, 0.0],
        };
        let (n, _) = raw.resample(&Array1::from(vec![400.0, 600.0]), "glass").unwrap();
        assert!((n[1] - 1.5).abs() < 1e-12);
        let err = raw.resample(&Array1::from(vec![300.0, 600.0]), "glass").unwrap_err();
        assert!(err.to_string().contains("glass"));
    }

    #[test]
    fn two_column_table_keeps_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "r.txt", "> header\n500 0.3 extra\n400 0.2\n");
        let (x, y) = read_two_columns(&path, "reflection reference").unwrap();
        assert_eq!(x, vec![500.0, 400.0]);
        assert_eq!(y, vec![0.3, 0.2]);
    }
}

/// Index data on its own wavelength sampling, wavelength in nm.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCri {
    pub wavelength: Vec<f64>,
    pub n: Vec<f64>,
    pub k: Vec<f64>,
}

impl RawCri {
    /// Constant index on the given grid.
    pub fn constant(grid: &Array1<f64>, n: f64, k: f64) -> Self {
        Self {
            wavelength: grid.to_vec(),
            n: vec![n; grid.len()],
            k: vec![k; grid.len()],
        }
    }

    /// Linear resampling onto the master grid. The data must span the whole grid.
    pub fn resample(&self, grid: &Array1<f64>, subject: &str) -> Result<(Array1<f64>, Array1<f64>)> {
        let coverage = || {
            StackError::load(
                subject,
                format!(
                    "insufficient spectral coverage: data spans {:.1}-{:.1} nm, grid needs {:.1}-{:.1} nm",
                    self.wavelength.first().copied().unwrap_or(f64::NAN),
                    self.wavelength.last().copied().unwrap_or(f64::NAN),
                    grid.first().copied().unwrap_or(f64::NAN),
                    grid.last().copied().unwrap_or(f64::NAN),
                ),
            )
        };
        let n = resample(&self.wavelength, &self.n, grid).ok_or_else(coverage)?;
        let k = resample(&self.wavelength, &self.k, grid).ok_or_else(coverage)?;
        Ok((n, k))
    }

    fn sorted(wavelength: Vec<f64>, n: Vec<f64>, k: Vec<f64>) -> Self {
        let (w1, n) = sort_by_abscissa(wavelength.clone(), n);
        let (_, k) = sort_by_abscissa(wavelength, k);
        Self { wavelength: w1, n, k }
    }
}

/// Supplies raw refractive-index data for effective layers.
pub trait CriProvider {
    /// Raw index data for a non-graded layer's source.
    fn raw_cri(&self, layer: &EffectiveLayer, grid: &Array1<f64>) -> Result<RawCri>;

    /// Reference curve of one composition of a graded layer.
    fn grading_curve(&self, layer: &EffectiveLayer, reference: &GradingReference) -> Result<RawCri>;
}

/// File-backed provider. Relative paths resolve against `base_dir`; named
/// materials live in `database_dir` as `<name>.dat`.
#[derive(Debug, Clone)]
pub struct MaterialLibrary {
    pub database_dir: PathBuf,
    pub base_dir: PathBuf,
}

impl MaterialLibrary {
    pub fn new(database_dir: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_dir: database_dir.into(),
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl CriProvider for MaterialLibrary {
    fn raw_cri(&self, layer: &EffectiveLayer, grid: &Array1<f64>) -> Result<RawCri> {
        let subject = format!("refractive index of layer '{}'", layer.name);
        match &layer.source {
            CriSource::Constant { n, k } => Ok(RawCri::constant(grid, *n, *k)),
            CriSource::Material { name } => {
                let path = self.database_dir.join(format!("{name}.dat"));
                read_nk_file(&path, &subject)
            }
            CriSource::File { path } => read_nk_file(&self.resolve(path), &subject),
            CriSource::Absorption { path, n } => read_alpha_file(&self.resolve(path), *n, &subject),
            CriSource::DielectricFunction(df) => Ok(df.evaluate()),
            CriSource::Graded(_) => Err(StackError::load(
                subject,
                "graded layers are resolved from their reference curves",
            )),
        }
    }

    fn grading_curve(&self, layer: &EffectiveLayer, reference: &GradingReference) -> Result<RawCri> {
        let subject = format!(
            "grading reference x={} of layer '{}'",
            reference.fraction, layer.parent
        );
        read_nk_file(&self.resolve(&reference.path), &subject)
    }
}

fn read_text(path: &Path, subject: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|e| StackError::load_file(subject, path, e.to_string()))
}

fn parse_number(field: &str, path: &Path, subject: &str, line: usize) -> Result<f64> {
    field.trim().parse::<f64>().map_err(|_| {
        StackError::load_file(subject, path, format!("line {line}: '{field}' is not a number"))
    })
}

fn starts_with_digit(line: &str) -> bool {
    line.trim_start().chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Reads a wavelength/n/k table. Lines not starting with a digit are headers;
/// a header containing `[mum]` or `µm` switches wavelengths to micrometres.
pub fn read_nk_file(path: &Path, subject: &str) -> Result<RawCri> {
    let text = read_text(path, subject)?;
    let mut scale = 1.0;
    let (mut wavelength, mut n, mut k) = (Vec::new(), Vec::new(), Vec::new());
    for (no, line) in text.lines().enumerate() {
        if !starts_with_digit(line) {
            if line.contains("[mum]") || line.contains("µm") {
                scale = 1000.0;
            }
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(StackError::load_file(
                subject,
                path,
                format!("line {}: expected columns wavelength, n, k", no + 1),
            ));
        }
        wavelength.push(parse_number(fields[0], path, subject, no + 1)? * scale);
        n.push(parse_number(fields[1], path, subject, no + 1)?);
        k.push(parse_number(fields[2], path, subject, no + 1)?);
    }
    if wavelength.is_empty() {
        return Err(StackError::load_file(subject, path, "no data rows"));
    }
    Ok(RawCri::sorted(wavelength, n, k))
}

/// Reads a wavelength/absorption-coefficient table; k = αλ/4π with a constant `n`.
/// α is in 1/m unless a header mentions `cm^-1` or `1/cm`.
pub fn read_alpha_file(path: &Path, n: f64, subject: &str) -> Result<RawCri> {
    let text = read_text(path, subject)?;
    let mut wvl_scale = 1.0;
    // to 1/nm
    let mut alpha_scale = 1e-9;
    let (mut wavelength, mut k) = (Vec::new(), Vec::new());
    for (no, line) in text.lines().enumerate() {
        if !starts_with_digit(line) {
            if line.contains("[mum]") || line.contains("µm") {
                wvl_scale = 1000.0;
            }
            if line.contains("cm^-1") || line.contains("1/cm") {
                alpha_scale = 1e-7;
            }
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 2 {
            return Err(StackError::load_file(
                subject,
                path,
                format!("line {}: expected columns wavelength, alpha", no + 1),
            ));
        }
        let w = parse_number(fields[0], path, subject, no + 1)? * wvl_scale;
        let alpha = parse_number(fields[1], path, subject, no + 1)? * alpha_scale;
        wavelength.push(w);
        k.push(alpha * w / (4.0 * std::f64::consts::PI));
    }
    if wavelength.is_empty() {
        return Err(StackError::load_file(subject, path, "no data rows"));
    }
    let len = wavelength.len();
    Ok(RawCri::sorted(wavelength, vec![n; len], k))
}

/// Reads a two-column table in file order. Header and comment lines are skipped
/// and extra columns ignored.
pub fn read_two_columns(path: &Path, subject: &str) -> Result<(Vec<f64>, Vec<f64>)> {
    let text = read_text(path, subject)?;
    let (mut x, mut y) = (Vec::new(), Vec::new());
    for (no, line) in text.lines().enumerate() {
        if !starts_with_digit(line) {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            return Err(StackError::load_file(
                subject,
                path,
                format!("line {}: expected two columns", no + 1),
            ));
        }
        x.push(parse_number(fields[0], path, subject, no + 1)?);
        y.push(parse_number(fields[1], path, subject, no + 1)?);
    }
    if x.len() < 2 {
        return Err(StackError::load_file(subject, path, "fewer than two data rows"));
    }
    Ok((x, y))
}
