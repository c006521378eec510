//! Line-oriented wire protocol shared by every routing engine.
//!
//! ```text
//! <node_count> <edge_count> <source_id> <destination_id> <time_budget_seconds>
//! <node_id> <longitude> <latitude>      (one line per node)
//! <u> <v>                               (one line per directed edge, parallel edges repeated)
//! ```
//!
//! Engines answer on stdout with whitespace-separated node ids in traversal order.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{DomainError, DomainResult};
use crate::domains::routing::graph::{RoadGraph, RoadGraphBuilder, RouteQuery};
use crate::domains::routing::types::NodeId;

/// Decimal places written for coordinates; OSM stores 1e-7 degree resolution.
pub const COORDINATE_DECIMALS: usize = 7;

/// Serialized query, computed once and shared by every engine of a request.
#[derive(Debug, Clone)]
pub struct EncodedQuery(Arc<[u8]>);

impl EncodedQuery {
    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        // encode_query only ever writes ASCII
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryHeader {
    pub node_count: usize,
    pub edge_count: usize,
    pub source: NodeId,
    pub destination: NodeId,
    /// Absent in inputs written before the budget field existed.
    pub time_budget: Option<Duration>,
}

pub fn encode_query(query: &RouteQuery) -> EncodedQuery {
    let graph = &query.graph;
    // ~40 bytes per node line, ~20 per edge line
    let mut out = String::with_capacity(64 + graph.node_count() * 40 + graph.edge_count() * 20);

    // Writing into a String cannot fail.
    let _ = writeln!(
        out,
        "{} {} {} {} {}",
        graph.node_count(),
        graph.edge_count(),
        query.source,
        query.destination,
        query.time_budget.as_secs()
    );
    for node in graph.nodes() {
        let _ = writeln!(
            out,
            "{} {:.prec$} {:.prec$}",
            node.id,
            node.lon,
            node.lat,
            prec = COORDINATE_DECIMALS
        );
    }
    for (u, v) in graph.edges() {
        let _ = writeln!(out, "{} {}", u, v);
    }

    EncodedQuery(Arc::from(out.into_bytes()))
}

/// Parse an engine's stdout. Empty output is a valid "no path" answer.
pub fn decode_path(output: &[u8]) -> DomainResult<Vec<NodeId>> {
    let text = std::str::from_utf8(output)
        .map_err(|e| DomainError::Protocol(format!("engine output is not UTF-8: {}", e)))?;
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<NodeId>()
                .map_err(|_| DomainError::Protocol(format!("invalid node id token {:?}", token)))
        })
        .collect()
}

/// Parse a complete engine input back into its header and graph.
pub fn decode_query(input: &str) -> DomainResult<(QueryHeader, RoadGraph)> {
    let mut lines = input.lines();
    let header_line = lines
        .by_ref()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| DomainError::Protocol("empty input".to_string()))?;

    let fields: Vec<&str> = header_line.split_whitespace().collect();
    if fields.len() != 4 && fields.len() != 5 {
        return Err(DomainError::Protocol(format!(
            "header must have 4 or 5 fields, found {}",
            fields.len()
        )));
    }
    let header = QueryHeader {
        node_count: parse_field(fields[0], "node count")?,
        edge_count: parse_field(fields[1], "edge count")?,
        source: parse_field(fields[2], "source id")?,
        destination: parse_field(fields[3], "destination id")?,
        time_budget: match fields.get(4) {
            Some(f) => Some(Duration::from_secs(parse_field(f, "time budget")?)),
            None => None,
        },
    };

    let mut tokens = lines.flat_map(str::split_whitespace);
    // a node line needs at least 6 bytes and an edge line 4; the header counts are untrusted
    let mut builder = RoadGraphBuilder::with_capacity(
        header.node_count.min(input.len() / 6),
        header.edge_count.min(input.len() / 4),
    );

    for _ in 0..header.node_count {
        let id: NodeId = next_field(&mut tokens, "node id")?;
        let lon: f64 = next_field(&mut tokens, "longitude")?;
        let lat: f64 = next_field(&mut tokens, "latitude")?;
        builder
            .add_node(id, lon, lat)
            .map_err(|e| DomainError::Protocol(e.to_string()))?;
    }
    for _ in 0..header.edge_count {
        let u: NodeId = next_field(&mut tokens, "edge source")?;
        let v: NodeId = next_field(&mut tokens, "edge target")?;
        builder
            .add_edge(u, v)
            .map_err(|e| DomainError::Protocol(e.to_string()))?;
    }
    if let Some(extra) = tokens.next() {
        return Err(DomainError::Protocol(format!(
            "unexpected trailing token {:?}",
            extra
        )));
    }

    Ok((header, builder.build()))
}

fn parse_field<T: std::str::FromStr>(token: &str, what: &str) -> DomainResult<T> {
    token
        .parse()
        .map_err(|_| DomainError::Protocol(format!("invalid {}: {:?}", what, token)))
}

fn next_field<'a, T: std::str::FromStr>(
    tokens: &mut impl Iterator<Item = &'a str>,
    what: &str,
) -> DomainResult<T> {
    let token = tokens
        .next()
        .ok_or_else(|| DomainError::Protocol(format!("input ended before {}", what)))?;
    parse_field(token, what)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_path_accepts_surrounding_whitespace() {
        assert_eq!(decode_path(b"  1 2\n3 \n").unwrap(), vec![1, 2, 3]);
        assert_eq!(decode_path(b"-7").unwrap(), vec![-7]);
    }

    #[test]
    fn decode_path_empty_is_no_path() {
        assert!(decode_path(b"").unwrap().is_empty());
        assert!(decode_path(b"\n  \n").unwrap().is_empty());
    }

    #[test]
    fn decode_path_rejects_garbage() {
        let err = decode_path(b"1 2 x3").unwrap_err();
        assert!(matches!(err, DomainError::Protocol(msg) if msg.contains("x3")));
        assert!(decode_path(b"1.5").is_err());
    }

    #[test]
    fn decode_query_accepts_legacy_four_field_header() {
        let (header, graph) = decode_query("2 1 10 20\n10 1.0 2.0\n20 3.0 4.0\n10 20\n").unwrap();
        assert_eq!(header.time_budget, None);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edges().collect::<Vec<_>>(), vec![(10, 20)]);
    }

    #[test]
    fn decode_query_rejects_truncated_input() {
        let err = decode_query("2 1 10 20 5\n10 1.0 2.0\n").unwrap_err();
        assert!(matches!(err, DomainError::Protocol(_)));
    }

    #[test]
    fn decode_query_with_oversized_counts_reports_truncation() {
        let err = decode_query("99999999999999999 0 1 1 5\n1 0 0\n").unwrap_err();
        assert!(matches!(err, DomainError::Protocol(msg) if msg.contains("node id")));

        let err = decode_query("1 99999999999999999 1 1 5\n1 0 0\n").unwrap_err();
        assert!(matches!(err, DomainError::Protocol(msg) if msg.contains("edge source")));
    }
}
