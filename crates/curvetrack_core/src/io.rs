//! Plain-text dumps of witness sets, vertex sets, edges and samples, and the
//! per-component results directory that collects them.
//!
//! Real numbers are written as C's `%.15e` would print them, one complex
//! coordinate per line as `re im`.

use crate::curve::{Curve, VertexSet};
use crate::error::FatalError;
use crate::witness::WitnessSet;
use anyhow::{anyhow, bail, Context, Result};
use num_complex::Complex;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const VERTEX_FILE: &str = "V.vert";
pub const EDGE_FILE: &str = "E.edge";
pub const SAMPLE_FILE: &str = "samp.curvesamp";
pub const DIR_NAME_FILE: &str = "Dir_Name";

/// Formats `x` like `printf("%.15e", x)`.
pub fn format_real(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let rust = format!("{:.15e}", x);
    match rust.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        None => rust,
    }
}

fn push_coordinates(out: &mut String, coords: &[Complex<f64>]) -> std::fmt::Result {
    for z in coords {
        writeln!(out, "{} {}", format_real(z.re), format_real(z.im))?;
    }
    Ok(())
}

/// Whitespace token stream over a dump file.
struct Tokens<'a> {
    inner: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.split_whitespace(),
        }
    }

    fn next_token(&mut self, what: &str) -> Result<&'a str> {
        self.inner.next().ok_or_else(|| anyhow!("Unexpected end of file reading {}", what))
    }

    fn next_usize(&mut self, what: &str) -> Result<usize> {
        let token = self.next_token(what)?;
        token.parse().with_context(|| format!("Bad {}: {:?}", what, token))
    }

    fn next_real(&mut self, what: &str) -> Result<f64> {
        let token = self.next_token(what)?;
        token.parse().with_context(|| format!("Bad {}: {:?}", what, token))
    }

    fn next_coordinates(&mut self, n: usize, what: &str) -> Result<Vec<Complex<f64>>> {
        (0..n)
            .map(|_| Ok(Complex::new(self.next_real(what)?, self.next_real(what)?)))
            .collect()
    }

    fn at_end(&mut self) -> bool {
        self.inner.clone().next().is_none()
    }
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).map_err(|e| FatalError::resource(path, e))?;
    debug!(path = %path.display(), bytes = text.len(), "file written");
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path).map_err(|e| FatalError::resource(path, e))?)
}

pub fn witness_set_to_string(witness: &WitnessSet) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "{} {}\n", witness.num_points(), witness.num_variables())?;
    for point in witness.points() {
        push_coordinates(&mut out, point)?;
        out.push('\n');
    }
    for section in [witness.linears(), witness.patches()] {
        writeln!(out, "{}\n", section.len())?;
        for coeffs in section {
            push_coordinates(&mut out, coeffs)?;
            out.push('\n');
        }
    }
    Ok(out)
}

/// Parses a witness set dump. Missing trailing linear or patch sections are
/// read as empty.
pub fn parse_witness_set(text: &str) -> Result<WitnessSet> {
    let mut tokens = Tokens::new(text);
    let num_points = tokens.next_usize("point count")?;
    let num_variables = tokens.next_usize("variable count")?;
    let mut witness = WitnessSet::new(num_variables);
    for _ in 0..num_points {
        witness = witness.with_point(tokens.next_coordinates(num_variables, "point coordinate")?)?;
    }
    if !tokens.at_end() {
        for _ in 0..tokens.next_usize("linear count")? {
            witness = witness.with_linear(tokens.next_coordinates(num_variables, "linear coefficient")?)?;
        }
    }
    if !tokens.at_end() {
        for _ in 0..tokens.next_usize("patch count")? {
            witness = witness.with_patch(tokens.next_coordinates(num_variables, "patch coefficient")?)?;
        }
    }
    if !tokens.at_end() {
        bail!("Trailing data after the patch section.");
    }
    Ok(witness)
}

pub fn write_witness_set(path: &Path, witness: &WitnessSet) -> Result<()> {
    write_text(path, &witness_set_to_string(witness)?)
}

pub fn read_witness_set(path: &Path) -> Result<WitnessSet> {
    let text = read_text(path)?;
    parse_witness_set(&text).with_context(|| format!("Malformed witness set file {}", path.display()))
}

pub fn vertices_to_string(vertices: &VertexSet) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "{}\n", vertices.len())?;
    for vertex in vertices.vertices() {
        push_coordinates(&mut out, &vertex.point)?;
        out.push('\n');
    }
    Ok(out)
}

pub fn edges_to_string(curve: &Curve, vertices: &VertexSet) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "{}", curve.num_variables())?;
    writeln!(out, "{}", curve.num_edges())?;
    writeln!(out, "{}", curve.input_filename().len())?;
    writeln!(out, "{}", curve.input_filename())?;
    for (index, edge) in curve.edges().iter().enumerate() {
        let midpoint = vertices
            .get(edge.midpt)
            .ok_or_else(|| anyhow!("Edge {} has no midpoint vertex {}", index, edge.midpt))?;
        writeln!(out, "{}", edge.left)?;
        writeln!(out, "{}\n", edge.right)?;
        push_coordinates(&mut out, &midpoint.point)?;
        out.push('\n');
        push_coordinates(&mut out, curve.projection())?;
        out.push('\n');
    }
    Ok(out)
}

pub fn samples_to_string(curve: &Curve) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "{}\n", curve.num_edges())?;
    for edge in 0..curve.num_edges() {
        let samples = curve.samples(edge);
        writeln!(out, "{}", samples.len())?;
        for index in samples {
            write!(out, "{} ", index)?;
        }
        out.push_str("\n\n");
    }
    Ok(out)
}

pub fn parse_samples(text: &str) -> Result<Vec<Vec<usize>>> {
    let mut tokens = Tokens::new(text);
    let num_edges = tokens.next_usize("edge count")?;
    let mut table = Vec::with_capacity(num_edges);
    for _ in 0..num_edges {
        let count = tokens.next_usize("sample count")?;
        table.push(
            (0..count)
                .map(|_| tokens.next_usize("sample index"))
                .collect::<Result<Vec<_>>>()?,
        );
    }
    Ok(table)
}

pub fn write_vertices(path: &Path, vertices: &VertexSet) -> Result<()> {
    write_text(path, &vertices_to_string(vertices)?)
}

pub fn write_edges(path: &Path, curve: &Curve, vertices: &VertexSet) -> Result<()> {
    write_text(path, &edges_to_string(curve, vertices)?)
}

pub fn write_samples(path: &Path, curve: &Curve) -> Result<()> {
    write_text(path, &samples_to_string(curve)?)
}

pub fn read_samples(path: &Path) -> Result<Vec<Vec<usize>>> {
    let text = read_text(path)?;
    parse_samples(&text).with_context(|| format!("Malformed sample file {}", path.display()))
}

pub fn results_dir_name(input_name: &str, component: usize) -> String {
    format!("{}_comp{}_curve", input_name, component)
}

/// Creates `parent/{input_name}_comp{component}_curve`, removing everything
/// in it except dotfiles.
pub fn prepare_results_dir(parent: &Path, input_name: &str, component: usize) -> Result<PathBuf> {
    let dir = parent.join(results_dir_name(input_name, component));
    fs::create_dir_all(&dir).map_err(|e| FatalError::resource(&dir, e))?;
    let entries = fs::read_dir(&dir).map_err(|e| FatalError::resource(&dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| FatalError::resource(&dir, e))?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| FatalError::resource(&path, e))?;
    }
    Ok(dir)
}

/// Writes the results directory of one sampled curve component and the
/// `Dir_Name` index next to it. Each of `copies` is copied in under its own
/// file name. Returns the directory path.
pub fn write_curve_results(
    parent: &Path,
    input_name: &str,
    component: usize,
    curve: &Curve,
    vertices: &VertexSet,
    copies: &[&Path],
) -> Result<PathBuf> {
    let dir = prepare_results_dir(parent, input_name, component)?;
    for source in copies {
        let name = source
            .file_name()
            .ok_or_else(|| anyhow!("Cannot copy {}: no file name", source.display()))?;
        let target = dir.join(name);
        fs::copy(source, &target).map_err(|e| FatalError::resource(*source, e))?;
    }
    write_vertices(&dir.join(VERTEX_FILE), vertices)?;
    write_edges(&dir.join(EDGE_FILE), curve, vertices)?;
    write_samples(&dir.join(SAMPLE_FILE), curve)?;

    // Dir_Name counts the C string terminator.
    let dir_name = results_dir_name(input_name, component);
    write_text(
        &parent.join(DIR_NAME_FILE),
        &format!("{}\n{}\n", dir_name.len() + 1, dir_name),
    )?;
    info!(dir = %dir.display(), vertices = vertices.len(), edges = curve.num_edges(), "results written");
    Ok(dir)
}
