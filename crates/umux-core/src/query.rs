//! Terminal-query auto-responder.
//!
//! Full-screen programs probe their terminal (cursor position, device
//! attributes, palette colors) and block until a reply arrives. With no
//! human terminal attached, the session answers a fixed set of queries
//! itself by writing synthetic replies into the PTY input. Matching is
//! best-effort over a rolling tail so a query split across read chunks is
//! still recognized; unmatched queries pass through untouched.

/// Bytes of previously seen output kept for cross-chunk matching.
const TAIL_LEN: usize = 64;

/// A recognized query and the synthetic reply to write to the PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReply {
    /// Short name for the JSONL record, e.g. `cursor-position`.
    pub query: &'static str,
    pub reply: Vec<u8>,
}

/// Scans session output for terminal queries.
pub struct QueryResponder {
    tail: Vec<u8>,
}

impl QueryResponder {
    pub fn new() -> Self {
        Self { tail: Vec::new() }
    }

    /// Scan one output chunk, returning replies for every query that ends
    /// inside it. `cols`/`rows` feed the size reports.
    pub fn scan(&mut self, chunk: &[u8], cols: u16, rows: u16) -> Vec<QueryReply> {
        let mut window = Vec::with_capacity(self.tail.len() + chunk.len());
        window.extend_from_slice(&self.tail);
        window.extend_from_slice(chunk);
        let boundary = self.tail.len();

        let mut hits: Vec<(usize, QueryReply)> = Vec::new();
        for (name, needle, reply) in recognized_queries(cols, rows) {
            for pos in find_all(&window, &needle) {
                // A match that ends inside the tail was reported by the
                // scan that first saw it.
                if pos + needle.len() > boundary {
                    hits.push((
                        pos,
                        QueryReply {
                            query: name,
                            reply: reply.clone(),
                        },
                    ));
                }
            }
        }
        hits.sort_by_key(|(pos, _)| *pos);

        let keep = window.len().min(TAIL_LEN);
        self.tail = window[window.len() - keep..].to_vec();

        hits.into_iter().map(|(_, reply)| reply).collect()
    }
}

impl Default for QueryResponder {
    fn default() -> Self {
        Self::new()
    }
}

fn recognized_queries(cols: u16, rows: u16) -> Vec<(&'static str, Vec<u8>, Vec<u8>)> {
    let mut queries: Vec<(&'static str, Vec<u8>, Vec<u8>)> = vec![
        ("cursor-position", b"\x1b[6n".to_vec(), b"\x1b[1;1R".to_vec()),
        ("device-status", b"\x1b[5n".to_vec(), b"\x1b[0n".to_vec()),
        ("device-attributes", b"\x1b[c".to_vec(), b"\x1b[?1;2c".to_vec()),
        ("device-attributes", b"\x1b[0c".to_vec(), b"\x1b[?1;2c".to_vec()),
        ("secondary-attributes", b"\x1b[>c".to_vec(), b"\x1b[>0;0;0c".to_vec()),
        ("secondary-attributes", b"\x1b[>0c".to_vec(), b"\x1b[>0;0;0c".to_vec()),
        ("decid", b"\x1bZ".to_vec(), b"\x1b[?1;2c".to_vec()),
        ("kitty-keyboard", b"\x1b[?u".to_vec(), b"\x1b[?0u".to_vec()),
        (
            "size-chars",
            b"\x1b[18t".to_vec(),
            format!("\x1b[8;{rows};{cols}t").into_bytes(),
        ),
        ("size-pixels", b"\x1b[14t".to_vec(), b"\x1b[4;0;0t".to_vec()),
    ];

    for (code, rgb) in [
        ("10", "ffff/ffff/ffff"),
        ("11", "0000/0000/0000"),
        ("12", "ffff/ffff/ffff"),
    ] {
        let reply = format!("\x1b]{code};rgb:{rgb}\x1b\\").into_bytes();
        queries.push((
            "osc-color",
            format!("\x1b]{code};?\x07").into_bytes(),
            reply.clone(),
        ));
        queries.push((
            "osc-color",
            format!("\x1b]{code};?\x1b\\").into_bytes(),
            reply,
        ));
    }

    queries
}

fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return Vec::new();
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, w)| *w == needle)
        .map(|(i, _)| i)
        .collect()
}
