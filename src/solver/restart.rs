//! Restart files: one row per grid point, ordered by global point index,
//! holding the coordinates followed by the transported variables of every
//! solver of the zone.
//!
//! The ASCII form is tab-separated with a header line. The binary form is
//! laid out as
//!
//! ```text
//! "FVRS1" | u8 float size | u32 nDim | u32 nFields | u64 nPoints
//!         | nFields x (u32 length, name bytes) | FF FF FF FF
//!         | nPoints x (u64 global index, (nDim + nFields) x f64) | FF FF FF FF
//! ```
//!
//! in native byte order.

use std::{
    collections::BTreeMap,
    io::{Read, Write},
};

use bytemuck::{bytes_of, cast_slice, pod_read_unaligned, Pod};

use crate::{
    comm::Communicator,
    error::SolverError,
    geometry::Geometry,
    solver::{base::SolverCore, Solver},
};

const MAGIC: &[u8] = b"FVRS1";
const SEPARATOR: [u8; 4] = [0xFF; 4];
const COORDINATE_NAMES: [&str; 3] = ["x", "y", "z"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartFormat {
    Ascii,
    Binary,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RestartTable {
    n_dim: usize,
    names: Vec<String>,
    /// Coordinates then values, by global point index.
    rows: BTreeMap<usize, Vec<f64>>,
}

impl RestartTable {
    pub fn new(n_dim: usize, names: Vec<String>) -> Self {
        Self {
            n_dim,
            names,
            rows: BTreeMap::new(),
        }
    }

    /// Gathers the owned points of every rank. Each rank ends up with the
    /// complete table.
    pub fn collect(
        geometry: &Geometry,
        comm: &dyn Communicator,
        solvers: &[&dyn Solver],
    ) -> Result<Self, SolverError> {
        let n_dim = geometry.n_dim();
        let names: Vec<String> = solvers.iter().flat_map(|s| s.field_names(n_dim)).collect();
        let width = 1 + n_dim + names.len();

        let mut local = Vec::with_capacity(geometry.n_point_domain() * width);
        for i in 0..geometry.n_point_domain() {
            local.push(geometry.point(i).global_index() as f64);
            local.extend_from_slice(geometry.coord(i));
            for solver in solvers {
                local.extend_from_slice(solver.core().nodes().solution(i));
            }
        }

        let mut table = Self::new(n_dim, names);
        for chunk in comm.all_gather(&local)?.iter().flat_map(|rank| rank.chunks_exact(width)) {
            table.insert(chunk[0] as usize, chunk[1..].to_vec());
        }
        Ok(table)
    }

    pub fn n_dim(&self) -> usize {
        self.n_dim
    }

    /// Variable names, without the point index and the coordinates.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_points(&self) -> usize {
        self.rows.len()
    }

    /// Replaces the row of `global`; `row` holds the coordinates and the
    /// values.
    pub fn insert(&mut self, global: usize, row: Vec<f64>) {
        debug_assert_eq!(row.len(), self.n_dim + self.names.len());
        self.rows.insert(global, row);
    }

    pub fn coordinates(&self, global: usize) -> Option<&[f64]> {
        self.rows.get(&global).map(|r| &r[..self.n_dim])
    }

    pub fn values(&self, global: usize) -> Option<&[f64]> {
        self.rows.get(&global).map(|r| &r[self.n_dim..])
    }

    pub fn write(&self, output: impl Write, format: RestartFormat) -> Result<(), SolverError> {
        match format {
            RestartFormat::Ascii => self.write_ascii(output),
            RestartFormat::Binary => self.write_binary(output),
        }
    }

    pub fn write_ascii(&self, mut output: impl Write) -> Result<(), SolverError> {
        write!(output, "PointID")?;
        let coordinates = COORDINATE_NAMES[..self.n_dim].iter().copied();
        for name in coordinates.chain(self.names.iter().map(String::as_str)) {
            write!(output, "\t{name}")?;
        }
        writeln!(output)?;
        for (global, row) in &self.rows {
            write!(output, "{global}")?;
            for v in row {
                write!(output, "\t{v:e}")?;
            }
            writeln!(output)?;
        }
        output.flush()?;
        Ok(())
    }

    pub fn write_binary(&self, mut output: impl Write) -> Result<(), SolverError> {
        output.write_all(MAGIC)?;
        output.write_all(bytes_of(&(std::mem::size_of::<f64>() as u8)))?;
        output.write_all(bytes_of(&(self.n_dim as u32)))?;
        output.write_all(bytes_of(&(self.names.len() as u32)))?;
        output.write_all(bytes_of(&(self.rows.len() as u64)))?;
        for name in &self.names {
            output.write_all(bytes_of(&(name.len() as u32)))?;
            output.write_all(name.as_bytes())?;
        }
        output.write_all(&SEPARATOR)?;
        for (global, row) in &self.rows {
            output.write_all(bytes_of(&(*global as u64)))?;
            output.write_all(cast_slice(row))?;
        }
        output.write_all(&SEPARATOR)?;
        output.flush()?;
        Ok(())
    }
}

/// Reads a restart file in either format, told apart by the magic bytes.
///
/// Error lines are text lines for ASCII files and record numbers (header
/// is 0) for binary ones.
pub fn read_restart(mut input: impl Read) -> Result<RestartTable, SolverError> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    if bytes.starts_with(MAGIC) {
        read_binary(&bytes[MAGIC.len()..])
    } else {
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| SolverError::restart(0, "not UTF-8 text"))?;
        read_ascii(text)
    }
}

fn read_ascii(text: &str) -> Result<RestartTable, SolverError> {
    let mut lines = text.lines().enumerate().map(|(n, l)| (n + 1, l));
    let (_, header) = lines.next().ok_or_else(|| SolverError::restart(1, "empty file"))?;
    let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
    if columns.first() != Some(&"PointID") {
        return Err(SolverError::restart(1, "header must start with `PointID`"));
    }
    let n_dim = columns[1..]
        .iter()
        .zip(COORDINATE_NAMES)
        .take_while(|(c, name)| *c == name)
        .count();
    if n_dim < 2 {
        return Err(SolverError::restart(1, "missing coordinate columns"));
    }
    let names = columns[1 + n_dim..].iter().map(|s| s.to_string()).collect();
    let mut table = RestartTable::new(n_dim, names);
    let width = columns.len();

    for (line, text) in lines {
        if text.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = text.split('\t').map(str::trim).collect();
        if fields.len() != width {
            return Err(SolverError::restart(
                line,
                format!("expected {width} columns, found {}", fields.len()),
            ));
        }
        let global: usize = fields[0]
            .parse()
            .map_err(|_| {
                SolverError::restart(line, format!("`{}` is not a point index", fields[0]))
            })?;
        let row = fields[1..]
            .iter()
            .map(|f| {
                f.parse::<f64>()
                    .map_err(|_| SolverError::restart(line, format!("`{f}` is not a number")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if table.rows.contains_key(&global) {
            return Err(SolverError::restart(line, format!("point {global} appears twice")));
        }
        table.insert(global, row);
    }
    Ok(table)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    record: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SolverError> {
        if self.bytes.len() < n {
            return Err(SolverError::restart(self.record, "unexpected end of file"));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn read<T: Pod>(&mut self) -> Result<T, SolverError> {
        Ok(pod_read_unaligned(self.take(std::mem::size_of::<T>())?))
    }

    fn separator(&mut self) -> Result<(), SolverError> {
        if self.take(SEPARATOR.len())? != SEPARATOR {
            return Err(SolverError::restart(self.record, "missing section marker"));
        }
        Ok(())
    }
}

fn read_binary(bytes: &[u8]) -> Result<RestartTable, SolverError> {
    let mut cursor = Cursor { bytes, record: 0 };
    let float_size: u8 = cursor.read()?;
    if float_size as usize != std::mem::size_of::<f64>() {
        return Err(SolverError::restart(0, format!("unsupported float size {float_size}")));
    }
    let n_dim = cursor.read::<u32>()? as usize;
    let n_fields = cursor.read::<u32>()? as usize;
    let n_points = cursor.read::<u64>()? as usize;
    let names = (0..n_fields)
        .map(|_| {
            let len = cursor.read::<u32>()? as usize;
            let raw = cursor.take(len)?;
            String::from_utf8(raw.to_vec())
                .map_err(|_| SolverError::restart(0, "field name is not UTF-8"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    cursor.separator()?;

    let mut table = RestartTable::new(n_dim, names);
    let width = n_dim + n_fields;
    for record in 1..=n_points {
        cursor.record = record;
        let global = cursor.read::<u64>()? as usize;
        if table.rows.contains_key(&global) {
            return Err(SolverError::restart(record, format!("point {global} appears twice")));
        }
        let row = (0..width).map(|_| cursor.read::<f64>()).collect::<Result<Vec<_>, _>>()?;
        table.insert(global, row);
    }
    cursor.record = n_points + 1;
    cursor.separator()?;
    Ok(table)
}

/// Copies columns `offset..offset + nVar` of the table into the solution of
/// every owned point. Table rows of points this rank does not own are
/// ignored; an owned point missing from the table is an error.
pub(crate) fn load_into(
    core: &mut SolverCore,
    geometry: &Geometry,
    comm: &dyn Communicator,
    table: &RestartTable,
    offset: usize,
) -> Result<(), SolverError> {
    let n_var = core.n_var();
    if table.n_dim() != geometry.n_dim() {
        return Err(SolverError::restart(
            0,
            format!("{}D restart for a {}D grid", table.n_dim(), geometry.n_dim()),
        ));
    }
    if offset + n_var > table.names().len() {
        return Err(SolverError::restart(
            0,
            format!("{} variables, {} needed", table.names().len(), offset + n_var),
        ));
    }
    for i in 0..geometry.n_point_domain() {
        let global = geometry.point(i).global_index();
        let values = table
            .values(global)
            .ok_or_else(|| SolverError::restart(0, format!("point {global} is missing")))?;
        core.nodes.solution_mut(i).copy_from_slice(&values[offset..offset + n_var]);
    }
    core.nodes.set_old_solution();
    core.set_mpi_solution(geometry, comm)?;
    core.set_mpi_solution_old(geometry, comm)?;
    tracing::info!(points = geometry.n_point_domain(), offset, "solution loaded from restart");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RestartTable {
        let mut t = RestartTable::new(2, vec!["Density".into(), "Energy".into()]);
        t.insert(7, vec![1.0, 0.5, 1.25, 2.5e5]);
        t.insert(3, vec![0.0, -0.5, 0.1, 1.0 / 3.0]);
        t
    }

    #[test]
    fn ascii_is_ordered_by_global_index() {
        let mut out = Vec::new();
        table().write_ascii(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "PointID\tx\ty\tDensity\tEnergy");
        assert!(lines[1].starts_with("3\t"));
        assert!(lines[2].starts_with("7\t"));
        assert_eq!(read_restart(text.as_bytes()).unwrap(), table());
    }

    #[test]
    fn binary_reads_back_exactly() {
        let mut out = Vec::new();
        table().write_binary(&mut out).unwrap();
        assert!(out.starts_with(b"FVRS1"));
        assert_eq!(read_restart(&out[..]).unwrap(), table());
    }

    #[test]
    fn malformed_ascii_reports_the_line() {
        let text = "PointID\tx\ty\tDensity\n0\t0\t0\t1\n1\t0\tnope\t1\n";
        match read_restart(text.as_bytes()) {
            Err(SolverError::Restart { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truncated_binary_is_an_error() {
        let mut out = Vec::new();
        table().write_binary(&mut out).unwrap();
        out.truncate(out.len() - 6);
        assert!(matches!(read_restart(&out[..]), Err(SolverError::Restart { .. })));
    }

    #[test]
    fn repeated_points_are_rejected_in_both_formats() {
        let text = "PointID\tx\ty\tDensity\n4\t0\t0\t1\n4\t1\t0\t1\n";
        match read_restart(text.as_bytes()) {
            Err(SolverError::Restart { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }

        let mut out = Vec::new();
        table().write_binary(&mut out).unwrap();
        // records are [global: u64, x, y, Density, Energy], the last one is point 7
        let last = out.len() - SEPARATOR.len() - 5 * 8;
        out[last..last + 8].copy_from_slice(bytes_of(&3u64));
        match read_restart(&out[..]) {
            Err(SolverError::Restart { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
    }
}
