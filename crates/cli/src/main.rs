//! # CLI - CaskKV Segment Shell
//!
//! A REPL-style shell over the segment storage layer. Reads commands from
//! stdin, runs them against an [`engine::Store`], and prints results to
//! stdout. There is no key index here: `PUT` prints the location it wrote, and
//! `GET` / `RECORD` take a location back. Intended for inspecting and
//! exercising the on-disk format by hand or from scripts.
//!
//! ## Commands
//!
//! ```text
//! PUT key value              Append a record, print its location
//! GET seg off ksz vsz        Read the value at a location
//! RECORD seg off ksz vsz     Read and verify the full record at a location
//! HINTS seg                  Dump the hint file of a segment
//! VERIFY [seg]               Checksum-scan one segment (default: all)
//! ROTATE                     Rotate the active segment now
//! META                       Print the metadata
//! STATS                      Print store debug info
//! EXIT / QUIT                Shut down
//! ```
//!
//! ## Configuration
//!
//! ```text
//! CASK_DIR         database directory           (default: "data")
//! CASK_NAME        logical database name        (default: "cask")
//! CASK_SEGMENT_KB  rotation threshold in KiB    (default: 65536)
//! CASK_SYNC        fsync every append           (default: "true")
//! CASK_LOG         tracing filter, e.g. "info"  (default: "warn")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! CaskKV started (name=cask, dir=data, active=1, segment_limit=65536KiB)
//! > PUT name Alice
//! 1 24 4 5
//! > GET 1 24 4 5
//! Alice
//! > EXIT
//! bye
//! ```

use anyhow::{Context, Result};
use config::StoreConfig;
use engine::{LocationRecord, Store};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CASK_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let config = StoreConfig::from_env();
    let store = Store::open(&config)
        .with_context(|| format!("failed to open store at {}", config.metadata_path().display()))?;

    println!(
        "CaskKV started (name={}, dir={}, active={}, segment_limit={}KiB)",
        config.name,
        config.dir.display(),
        store.active_segment(),
        config.segment_size_limit / 1024
    );
    println!("Commands: PUT key value | GET seg off ksz vsz | RECORD seg off ksz vsz");
    println!("          HINTS seg | VERIFY [seg] | ROTATE | META | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: PUT key value");
                        } else {
                            match store.append(k.as_bytes().to_vec(), v.into_bytes()) {
                                Ok(loc) => println!("{}", format_location(&loc)),
                                Err(e) => println!("ERR put failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: PUT key value");
                    }
                }
                "GET" => match parse_location(&mut parts) {
                    Some(loc) => match store.read_value(&loc) {
                        Ok(v) => println!("{}", String::from_utf8_lossy(&v)),
                        Err(e) => println!("ERR read failed: {}", e),
                    },
                    None => println!("ERR usage: GET seg off ksz vsz"),
                },
                "RECORD" => match parse_location(&mut parts) {
                    Some(loc) => match store.read_record(&loc) {
                        Ok(rec) => println!(
                            "{} -> {} (ts={}, crc={:08x})",
                            String::from_utf8_lossy(&rec.key),
                            String::from_utf8_lossy(&rec.value),
                            rec.timestamp,
                            rec.checksum
                        ),
                        Err(e) => println!("ERR read failed: {}", e),
                    },
                    None => println!("ERR usage: RECORD seg off ksz vsz"),
                },
                "HINTS" => match parts.next().and_then(|s| s.parse::<u32>().ok()) {
                    Some(seg) => match store.read_hints(seg) {
                        Ok(hints) => {
                            if hints.is_empty() {
                                println!("(empty)");
                            } else {
                                for (entry, loc) in &hints {
                                    println!(
                                        "{} -> {}",
                                        String::from_utf8_lossy(&entry.key),
                                        format_location(loc)
                                    );
                                }
                                println!("({} entries)", hints.len());
                            }
                        }
                        Err(e) => println!("ERR hints failed: {}", e),
                    },
                    None => println!("ERR usage: HINTS seg"),
                },
                "VERIFY" => {
                    let segments = match parts.next() {
                        Some(s) => match s.parse::<u32>() {
                            Ok(seg) => vec![seg],
                            Err(_) => {
                                println!("ERR usage: VERIFY [seg]");
                                print!("> ");
                                io::stdout().flush().ok();
                                continue;
                            }
                        },
                        None => store.segment_numbers(),
                    };
                    for seg in segments {
                        match store.scan_segment(seg, |_, _| {}) {
                            Ok(summary) if summary.truncated => println!(
                                "segment {}: {} records, truncated tail after {} bytes",
                                seg, summary.entries, summary.valid_len
                            ),
                            Ok(summary) => {
                                println!("segment {}: {} records OK", seg, summary.entries)
                            }
                            Err(e) => println!("segment {}: ERR {}", seg, e),
                        }
                    }
                }
                "ROTATE" => match store.force_rotate() {
                    Ok(()) => println!("OK (active={})", store.active_segment()),
                    Err(e) => println!("ERR rotate failed: {}", e),
                },
                "META" => {
                    let meta = store.metadata();
                    println!(
                        "name={} active={} segments={:?}",
                        meta.name, meta.active_segment, meta.segment_numbers
                    );
                }
                "STATS" => {
                    println!("{:?}", store);
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}

/// `seg off ksz vsz`, the form `GET` and `RECORD` accept back.
fn format_location(loc: &LocationRecord) -> String {
    format!(
        "{} {} {} {}",
        loc.segment, loc.value_offset, loc.key_size, loc.value_size
    )
}

fn parse_location<'a, I>(parts: &mut I) -> Option<LocationRecord>
where
    I: Iterator<Item = &'a str>,
{
    let mut next = || parts.next().and_then(|s| s.parse::<u32>().ok());
    Some(LocationRecord {
        segment: next()?,
        value_offset: next()?,
        key_size: next()?,
        value_size: next()?,
        timestamp: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_text_roundtrip() {
        let loc = LocationRecord {
            segment: 3,
            value_offset: 141,
            value_size: 9,
            key_size: 4,
            timestamp: 0,
        };
        let text = format_location(&loc);
        assert_eq!(text, "3 141 4 9");
        assert_eq!(parse_location(&mut text.split_whitespace()), Some(loc));
    }

    #[test]
    fn parse_location_rejects_missing_fields() {
        assert_eq!(parse_location(&mut "1 2 3".split_whitespace()), None);
        assert_eq!(parse_location(&mut "1 x 3 4".split_whitespace()), None);
    }
}
