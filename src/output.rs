use itertools::Itertools;
use ndarray::{Array1, Axis};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::errors::{Result, StackError};
use crate::helpers::trapz;
use crate::result::OpticsResult;
use crate::scalars::{LayerScalars, Scalars};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nk_export_has_one_row_per_wavelength() {
        let dir = tempfile::tempdir().unwrap();
        let grid = Array1::from(vec![400.0, 500.0]);
        let n = Array1::from(vec![1.5, 1.45]);
        let k = Array1::from(vec![0.01, 0.0]);
        write_nk(dir.path(), "glass", &grid, &n, &k).unwrap();
        let text = fs::read_to_string(dir.path().join("tmp_nk_glass.txt")).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows, vec!["400\t1.5\t0.01", "500\t1.45\t0"]);
    }

    #[test]
    fn nk_export_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let grid = Array1::from(vec![400.0]);
        write_nk(&nested, "x", &grid, &grid, &grid).unwrap();
        assert!(nested.join("tmp_nk_x.txt").exists());
    }

    #[test]
    fn unwritable_target_is_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "not a directory").unwrap();
        let grid = Array1::from(vec![400.0]);
        let err = write_nk(&blocker, "x", &grid, &grid, &grid).unwrap_err();
        assert!(matches!(err, StackError::Write { .. }));
    }

    #[test]
    fn mean_over_wavelength() {
        let wavelength = Array1::from(vec![400.0, 600.0]);
        let values = ndarray::array![[1.0, 3.0], [2.0, 2.0]];
        assert_eq!(row_means(&values, &wavelength), Array1::from(vec![2.0, 2.0]));
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| StackError::write(dir, e))
}

/// Writes a file through a buffered writer, attaching the path to any failure.
fn write_file(path: &Path, body: impl FnOnce(&mut BufWriter<File>) -> io::Result<()>) -> Result<()> {
    let file = File::create(path).map_err(|e| StackError::write(path, e))?;
    let mut writer = BufWriter::new(file);
    body(&mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| StackError::write(path, e))
}

/// Debug export `tmp_nk_<name>.txt` with columns wavelength, n, k.
pub fn write_nk(dir: &Path, name: &str, grid: &Array1<f64>, n: &Array1<f64>, k: &Array1<f64>) -> Result<()> {
    create_dir(dir)?;
    write_file(&dir.join(format!("tmp_nk_{name}.txt")), |writer| {
        for ((w, n), k) in grid.iter().zip(n).zip(k) {
            writeln!(writer, "{w}\t{n}\t{k}")?;
        }
        Ok(())
    })
}

/// Mean of every depth row over the wavelength grid.
fn row_means(values: &ndarray::Array2<f64>, wavelength: &Array1<f64>) -> Array1<f64> {
    let span = wavelength[wavelength.len() - 1] - wavelength[0];
    values.map_axis(Axis(1), |row| match span > 0.0 {
        true => trapz(row, wavelength.view()) / span,
        false => row[0],
    })
}

/// Tab-separated table of every computed spectrum against wavelength.
pub fn write_spectra(dir: &Path, result: &OpticsResult) -> Result<()> {
    let spectra = &result.spectra;
    let mut columns: Vec<(&str, &Array1<f64>)> = vec![
        ("R", &spectra.reflection),
        ("T", &spectra.transmission),
        ("A", &spectra.absorption),
    ];
    let optional = [
        ("R_diffuse", spectra.reflection_diffuse.as_ref()),
        ("T_diffuse", spectra.transmission_diffuse.as_ref()),
        ("EQE", spectra.eqe.as_ref()),
        ("IQE", spectra.iqe.as_ref()),
        ("psi", result.ellipsometry.as_ref().map(|e| &e.psi)),
        ("delta", result.ellipsometry.as_ref().map(|e| &e.delta)),
        ("A_LB", result.lambert_beer.as_ref().map(|lb| &lb.absorption)),
        ("EQE_LB", result.lambert_beer.as_ref().map(|lb| &lb.eqe)),
    ];
    columns.extend(optional.into_iter().filter_map(|(name, c)| c.map(|c| (name, c))));
    let absorption: Vec<(String, &Array1<f64>)> = result
        .layer_absorption
        .iter()
        .map(|(name, curve)| (format!("A_{name}"), curve))
        .chain(
            result
                .layer_collection
                .iter()
                .map(|(name, curve)| (format!("C_{name}"), curve)),
        )
        .collect();

    write_file(&dir.join("spectra.txt"), |writer| {
        let header = std::iter::once("wavelength")
            .chain(columns.iter().map(|(name, _)| *name))
            .chain(absorption.iter().map(|(name, _)| name.as_str()))
            .join("\t");
        writeln!(writer, "{header}")?;
        for (w, wavelength) in result.wavelength.iter().enumerate() {
            let row = columns
                .iter()
                .map(|(_, c)| c[w])
                .chain(absorption.iter().map(|(_, c)| c[w]))
                .map(|v| format!("{v:.6e}"))
                .join("\t");
            writeln!(writer, "{wavelength}\t{row}")?;
        }
        Ok(())
    })
}

/// Depth profiles, one table per user layer. Requires the field intensity.
pub fn write_profiles(dir: &Path, result: &OpticsResult) -> Result<()> {
    let mut offset = 0;
    let groups = result.layers.iter().chunk_by(|l| l.parent.clone());
    for (parent, members) in &groups {
        let path = dir.join(format!("profile_{parent}.txt"));
        let members: Vec<_> = members.collect();
        write_file(&path, |writer| {
            writeln!(writer, "depth\tintensity\tgeneration\tcollected_generation")?;
            for layer in members {
                let nodes = layer.intensity.nrows();
                let intensity = row_means(&layer.intensity, &result.wavelength);
                for i in 0..nodes {
                    let generation = layer.generation_profile.get(i).copied().unwrap_or(f64::NAN);
                    let collected = layer
                        .collected_generation_profile
                        .get(i)
                        .copied()
                        .unwrap_or(f64::NAN);
                    writeln!(
                        writer,
                        "{:.4}\t{:.6e}\t{:.6e}\t{:.6e}",
                        result.depth[offset + i],
                        intensity[i],
                        generation,
                        collected
                    )?;
                }
                offset += nodes;
            }
            Ok(())
        })?;
    }
    Ok(())
}

#[derive(Serialize)]
struct Summary<'a> {
    scalars: &'a Scalars,
    layers: &'a [LayerScalars],
    lambert_beer_layers: Option<&'a [LayerScalars]>,
    diffuse_iterations: Option<usize>,
}

/// Scalars and per-layer scalars as JSON.
pub fn write_json(dir: &Path, result: &OpticsResult) -> Result<()> {
    let summary = Summary {
        scalars: &result.scalars,
        layers: &result.layer_scalars,
        lambert_beer_layers: result.lambert_beer.as_ref().map(|lb| lb.layers.as_slice()),
        diffuse_iterations: result.diffuse_iterations,
    };
    write_file(&dir.join("results.json"), |writer| {
        serde_json::to_writer_pretty(&mut *writer, &summary).map_err(io::Error::other)?;
        writeln!(writer)
    })
}

/// Writes every available output into `dir`.
pub fn writeup(dir: &Path, result: &OpticsResult) -> Result<()> {
    create_dir(dir)?;
    write_spectra(dir, result)?;
    if result.layers.iter().any(|l| l.intensity.nrows() > 0) {
        write_profiles(dir, result)?;
    }
    write_json(dir, result)
}
