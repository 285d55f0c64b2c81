use std::io::{BufRead, Write};

use tracing::{debug, info};

use crate::error::Result;
use crate::Catalog;

/// Answer requests from `requests` until EOF, one framed response per line.
/// Works over stdin/stdout or a pair of named pipes. Returns the number of
/// requests served.
///
/// Request bytes that are not UTF-8 are decoded lossily and answered like any
/// other line; only I/O errors on the streams end the loop.
pub fn serve<R: BufRead, W: Write>(
    catalog: &Catalog,
    mut requests: R,
    mut responses: W,
) -> Result<u64> {
    let mut served = 0;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if requests.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        debug!(request = %line, "received");
        for out in catalog.respond(line) {
            responses.write_all(out.as_bytes())?;
            responses.write_all(b"\n")?;
        }
        responses.flush()?;
        served += 1;
    }
    info!(served, "request stream closed");
    Ok(served)
}
