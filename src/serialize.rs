//! Text and binary serialization of diagrams.
//!
//! Both formats open with a version marker, then the root edge weight,
//! then one record per node in bottom-up order (children always precede
//! their parents). Child references are the indices assigned during
//! serialization; `-1` refers to the terminal and `-2` marks an omitted
//! (zero) edge. The text format is line-oriented:
//!
//! ```text
//! 0.1
//! 0.7071067811865476+0i
//! 0 0 (-1 1+0i) ()
//! 1 1 (0 1+0i) ()
//! ```
//!
//! The binary format is little-endian: `f64` version, two `f64`s of root
//! weight, then per node an `i64` index, an `i8` variable, and per edge an
//! `i64` child index plus two `f64`s of weight.

use std::io::{BufRead, ErrorKind, Read, Write};

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::complex_value::ComplexValue;
use crate::node::{Edge, NodeIx};
use crate::package::Package;
use crate::types::{DdError, Qubit, NEDGE, RADIX};

/// Format version accepted and produced.
pub const SERIALIZATION_VERSION: f64 = 0.1;

const NUMBER: &str = r"[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?";

static WEIGHT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*({number})?((?:[+-] ?)?(?:\d+(?:\.\d*)?|\.\d+)?(?:[eE][+-]?\d+)?[iI])?\s*$",
        number = NUMBER
    ))
    .unwrap()
});

fn line_regex(arity: usize) -> Regex {
    let edge = r" \((?:(-?\d+) ([^)]+))?\)";
    let mut pattern = String::from(r"^(\d+) (\d+)");
    for _ in 0..arity {
        pattern.push_str(edge);
    }
    pattern.push_str(r"\s*(?:#.*)?$");
    Regex::new(&pattern).unwrap()
}

static V_LINE_RE: Lazy<Regex> = Lazy::new(|| line_regex(RADIX));
static M_LINE_RE: Lazy<Regex> = Lazy::new(|| line_regex(NEDGE));

fn format_error(message: impl Into<String>) -> DdError {
    DdError::Serialization { message: message.into() }
}

fn parse_weight(s: &str) -> Result<ComplexValue, DdError> {
    let caps = WEIGHT_RE
        .captures(s)
        .ok_or_else(|| format_error(format!("malformed complex weight: {:?}", s)))?;
    let real = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let imag = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    ComplexValue::from_string(real, imag)
}

fn read_f64<R: Read>(reader: &mut R) -> Result<f64, DdError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_i64<R: Read>(reader: &mut R) -> Result<i64, DdError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

// i64 read that treats a clean end of stream as "no more nodes"
fn try_read_i64<R: Read>(reader: &mut R) -> Result<Option<i64>, DdError> {
    let mut buf = [0u8; 8];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(i64::from_le_bytes(buf))),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_i8<R: Read>(reader: &mut R) -> Result<i8, DdError> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0] as i8)
}

fn check_version(version: f64) -> Result<(), DdError> {
    if version != SERIALIZATION_VERSION {
        return Err(format_error(format!(
            "wrong serialization format version: file has {}, current is {}",
            version, SERIALIZATION_VERSION
        )));
    }
    Ok(())
}

impl Package {
    /// Writes the state DD `e` to `writer`.
    pub fn serialize_v<W: Write>(&self, e: Edge, writer: &mut W, binary: bool) -> Result<(), DdError> {
        if binary {
            writer.write_all(&SERIALIZATION_VERSION.to_le_bytes())?;
            self.cn.value_of(e.w).write_binary(writer)?;
        } else {
            writeln!(writer, "{}", SERIALIZATION_VERSION)?;
            writeln!(writer, "{}", self.cn.value_of(e.w))?;
        }
        if e.is_terminal() {
            return Ok(());
        }
        let mut indices: HashMap<NodeIx, i64> = HashMap::new();
        let mut next_index = 0i64;
        self.serialize_node_v(e, &mut indices, &mut next_index, writer, binary)?;
        Ok(())
    }

    fn serialize_node_v<W: Write>(
        &self,
        e: Edge,
        indices: &mut HashMap<NodeIx, i64>,
        next_index: &mut i64,
        writer: &mut W,
        binary: bool,
    ) -> Result<i64, DdError> {
        if e.is_terminal() {
            return Ok(-1);
        }
        if let Some(&idx) = indices.get(&e.p) {
            return Ok(idx);
        }

        let edges = self.vnode(e.p).e;
        let v = self.vnode(e.p).v;
        let mut child_idx = [-2i64; RADIX];
        for i in 0..RADIX {
            if edges[i].w != crate::complex::Complex::ZERO {
                child_idx[i] = self.serialize_node_v(edges[i], indices, next_index, writer, binary)?;
            }
        }

        let idx = *next_index;
        *next_index += 1;
        indices.insert(e.p, idx);

        if binary {
            writer.write_all(&idx.to_le_bytes())?;
            writer.write_all(&[v as u8])?;
            for i in 0..RADIX {
                writer.write_all(&child_idx[i].to_le_bytes())?;
                let w = if child_idx[i] == -2 {
                    ComplexValue::zero()
                } else {
                    self.cn.value_of(edges[i].w)
                };
                w.write_binary(writer)?;
            }
        } else {
            write!(writer, "{} {}", idx, v)?;
            for i in 0..RADIX {
                if child_idx[i] == -2 {
                    write!(writer, " ()")?;
                } else {
                    write!(writer, " ({} {})", child_idx[i], self.cn.value_of(edges[i].w))?;
                }
            }
            writeln!(writer)?;
        }
        Ok(idx)
    }

    /// Writes the operator DD `e` to `writer`.
    pub fn serialize_m<W: Write>(&self, e: Edge, writer: &mut W, binary: bool) -> Result<(), DdError> {
        if binary {
            writer.write_all(&SERIALIZATION_VERSION.to_le_bytes())?;
            self.cn.value_of(e.w).write_binary(writer)?;
        } else {
            writeln!(writer, "{}", SERIALIZATION_VERSION)?;
            writeln!(writer, "{}", self.cn.value_of(e.w))?;
        }
        if e.is_terminal() {
            return Ok(());
        }
        let mut indices: HashMap<NodeIx, i64> = HashMap::new();
        let mut next_index = 0i64;
        self.serialize_node_m(e, &mut indices, &mut next_index, writer, binary)?;
        Ok(())
    }

    fn serialize_node_m<W: Write>(
        &self,
        e: Edge,
        indices: &mut HashMap<NodeIx, i64>,
        next_index: &mut i64,
        writer: &mut W,
        binary: bool,
    ) -> Result<i64, DdError> {
        if e.is_terminal() {
            return Ok(-1);
        }
        if let Some(&idx) = indices.get(&e.p) {
            return Ok(idx);
        }

        let edges = self.mnode(e.p).e;
        let v = self.mnode(e.p).v;
        let mut child_idx = [-2i64; NEDGE];
        for i in 0..NEDGE {
            if edges[i].w != crate::complex::Complex::ZERO {
                child_idx[i] = self.serialize_node_m(edges[i], indices, next_index, writer, binary)?;
            }
        }

        let idx = *next_index;
        *next_index += 1;
        indices.insert(e.p, idx);

        if binary {
            writer.write_all(&idx.to_le_bytes())?;
            writer.write_all(&[v as u8])?;
            for i in 0..NEDGE {
                writer.write_all(&child_idx[i].to_le_bytes())?;
                let w = if child_idx[i] == -2 {
                    ComplexValue::zero()
                } else {
                    self.cn.value_of(edges[i].w)
                };
                w.write_binary(writer)?;
            }
        } else {
            write!(writer, "{} {}", idx, v)?;
            for i in 0..NEDGE {
                if child_idx[i] == -2 {
                    write!(writer, " ()")?;
                } else {
                    write!(writer, " ({} {})", child_idx[i], self.cn.value_of(edges[i].w))?;
                }
            }
            writeln!(writer)?;
        }
        Ok(idx)
    }

    /// Reads a state DD from `reader`. Fails on a version mismatch or an
    /// unparseable record.
    pub fn deserialize_v<R: BufRead>(&mut self, reader: &mut R, binary: bool) -> Result<Edge, DdError> {
        if binary {
            check_version(read_f64(reader)?)?;
            let root_weight = match try_read_i64(reader)? {
                Some(bits) => {
                    let r = f64::from_le_bytes(bits.to_le_bytes());
                    let i = read_f64(reader)?;
                    ComplexValue::new(r, i)
                }
                None => ComplexValue::zero(),
            };

            let mut nodes: HashMap<i64, NodeIx> = HashMap::new();
            let mut result = Edge::ONE;
            while let Some(index) = try_read_i64(reader)? {
                let v = read_i8(reader)?;
                let mut edge_idx = [-2i64; RADIX];
                let mut weights = [ComplexValue::zero(); RADIX];
                for i in 0..RADIX {
                    edge_idx[i] = read_i64(reader)?;
                    weights[i] = ComplexValue::read_binary(reader)?;
                }
                result = self.deserialize_node_v(index, v, &edge_idx, &weights, &mut nodes)?;
            }
            Ok(self.apply_root_weight(result, root_weight))
        } else {
            let mut lines = reader.lines();
            let version_line = lines
                .next()
                .ok_or_else(|| format_error("empty input, missing version line"))??;
            let version: f64 = version_line
                .trim()
                .parse()
                .map_err(|_| format_error(format!("malformed version line: {:?}", version_line)))?;
            check_version(version)?;

            let mut root_weight = ComplexValue::zero();
            let mut nodes: HashMap<i64, NodeIx> = HashMap::new();
            let mut result = Edge::ONE;
            let mut weight_line_seen = false;
            for line in lines {
                let line = line?;
                if !weight_line_seen {
                    weight_line_seen = true;
                    root_weight = parse_weight(&line)?;
                    continue;
                }
                if line.len() <= 1 {
                    continue;
                }
                let caps = V_LINE_RE
                    .captures(&line)
                    .ok_or_else(|| format_error(format!("unmatched line: {:?}", line)))?;
                let index: i64 = caps[1]
                    .parse()
                    .map_err(|_| format_error(format!("bad node index in line: {:?}", line)))?;
                let v: Qubit = caps[2]
                    .parse()
                    .map_err(|_| format_error(format!("bad variable in line: {:?}", line)))?;
                let mut edge_idx = [-2i64; RADIX];
                let mut weights = [ComplexValue::zero(); RADIX];
                for i in 0..RADIX {
                    if let Some(m) = caps.get(3 + 2 * i) {
                        edge_idx[i] = m
                            .as_str()
                            .parse()
                            .map_err(|_| format_error(format!("bad edge index in line: {:?}", line)))?;
                        weights[i] = parse_weight(&caps[4 + 2 * i])?;
                    }
                }
                result = self.deserialize_node_v(index, v, &edge_idx, &weights, &mut nodes)?;
            }
            Ok(self.apply_root_weight(result, root_weight))
        }
    }

    /// Reads an operator DD from `reader`.
    pub fn deserialize_m<R: BufRead>(&mut self, reader: &mut R, binary: bool) -> Result<Edge, DdError> {
        if binary {
            check_version(read_f64(reader)?)?;
            let root_weight = match try_read_i64(reader)? {
                Some(bits) => {
                    let r = f64::from_le_bytes(bits.to_le_bytes());
                    let i = read_f64(reader)?;
                    ComplexValue::new(r, i)
                }
                None => ComplexValue::zero(),
            };

            let mut nodes: HashMap<i64, NodeIx> = HashMap::new();
            let mut result = Edge::ONE;
            while let Some(index) = try_read_i64(reader)? {
                let v = read_i8(reader)?;
                let mut edge_idx = [-2i64; NEDGE];
                let mut weights = [ComplexValue::zero(); NEDGE];
                for i in 0..NEDGE {
                    edge_idx[i] = read_i64(reader)?;
                    weights[i] = ComplexValue::read_binary(reader)?;
                }
                result = self.deserialize_node_m(index, v, &edge_idx, &weights, &mut nodes)?;
            }
            Ok(self.apply_root_weight(result, root_weight))
        } else {
            let mut lines = reader.lines();
            let version_line = lines
                .next()
                .ok_or_else(|| format_error("empty input, missing version line"))??;
            let version: f64 = version_line
                .trim()
                .parse()
                .map_err(|_| format_error(format!("malformed version line: {:?}", version_line)))?;
            check_version(version)?;

            let mut root_weight = ComplexValue::zero();
            let mut nodes: HashMap<i64, NodeIx> = HashMap::new();
            let mut result = Edge::ONE;
            let mut weight_line_seen = false;
            for line in lines {
                let line = line?;
                if !weight_line_seen {
                    weight_line_seen = true;
                    root_weight = parse_weight(&line)?;
                    continue;
                }
                if line.len() <= 1 {
                    continue;
                }
                let caps = M_LINE_RE
                    .captures(&line)
                    .ok_or_else(|| format_error(format!("unmatched line: {:?}", line)))?;
                let index: i64 = caps[1]
                    .parse()
                    .map_err(|_| format_error(format!("bad node index in line: {:?}", line)))?;
                let v: Qubit = caps[2]
                    .parse()
                    .map_err(|_| format_error(format!("bad variable in line: {:?}", line)))?;
                let mut edge_idx = [-2i64; NEDGE];
                let mut weights = [ComplexValue::zero(); NEDGE];
                for i in 0..NEDGE {
                    if let Some(m) = caps.get(3 + 2 * i) {
                        edge_idx[i] = m
                            .as_str()
                            .parse()
                            .map_err(|_| format_error(format!("bad edge index in line: {:?}", line)))?;
                        weights[i] = parse_weight(&caps[4 + 2 * i])?;
                    }
                }
                result = self.deserialize_node_m(index, v, &edge_idx, &weights, &mut nodes)?;
            }
            Ok(self.apply_root_weight(result, root_weight))
        }
    }

    fn deserialize_node_v(
        &mut self,
        index: i64,
        v: Qubit,
        edge_idx: &[i64; RADIX],
        weights: &[ComplexValue; RADIX],
        nodes: &mut HashMap<i64, NodeIx>,
    ) -> Result<Edge, DdError> {
        if index == -1 {
            return Ok(Edge::ZERO);
        }
        let mut edges = [Edge::ZERO; RADIX];
        for i in 0..RADIX {
            if edge_idx[i] == -2 {
                continue;
            }
            let p = if edge_idx[i] == -1 {
                NodeIx::TERMINAL
            } else {
                *nodes.get(&edge_idx[i]).ok_or_else(|| {
                    format_error(format!("node {} references undefined node {}", index, edge_idx[i]))
                })?
            };
            let w = self.cn.lookup_value(weights[i]);
            edges[i] = Edge { p, w };
        }
        let edge = self.mk_vector_node(v, edges, false);
        nodes.insert(index, edge.p);
        Ok(edge)
    }

    fn deserialize_node_m(
        &mut self,
        index: i64,
        v: Qubit,
        edge_idx: &[i64; NEDGE],
        weights: &[ComplexValue; NEDGE],
        nodes: &mut HashMap<i64, NodeIx>,
    ) -> Result<Edge, DdError> {
        if index == -1 {
            return Ok(Edge::ZERO);
        }
        let mut edges = [Edge::ZERO; NEDGE];
        for i in 0..NEDGE {
            if edge_idx[i] == -2 {
                continue;
            }
            let p = if edge_idx[i] == -1 {
                NodeIx::TERMINAL
            } else {
                *nodes.get(&edge_idx[i]).ok_or_else(|| {
                    format_error(format!("node {} references undefined node {}", index, edge_idx[i]))
                })?
            };
            let w = self.cn.lookup_value(weights[i]);
            edges[i] = Edge { p, w };
        }
        let edge = self.mk_matrix_node(v, edges, false);
        nodes.insert(index, edge.p);
        Ok(edge)
    }

    fn apply_root_weight(&mut self, mut result: Edge, root_weight: ComplexValue) -> Edge {
        let w = self.cn.value_of(result.w) * root_weight;
        result.w = self.cn.lookup_value(w);
        result
    }
}
