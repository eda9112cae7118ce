use crate::ops::port::parse_port;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Debug port declared by the last `key=value` line for `key` in the descriptor.
///
/// The server may append to the file across restarts, so only the final entry counts.
/// A missing file, a missing key or an unparsable value all mean "not known yet".
pub async fn read_last_port(descriptor_path: &Path, key: &str) -> Option<u16> {
    let file = match tokio::fs::File::open(descriptor_path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::trace!("Cannot open {}: {}", descriptor_path.display(), e);
            return None;
        }
    };

    // decoded lossily per line so one non-UTF-8 line cannot fail the whole read
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut last_value: Option<String> = None;
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                if let Some(value) = value_for_key(&text, key) {
                    last_value = Some(value.to_string());
                }
            }
            Err(e) => {
                tracing::debug!("Failed reading {}: {}", descriptor_path.display(), e);
                return None;
            }
        }
    }

    let raw = last_value?;
    match parse_port(&raw) {
        Ok(port) => Some(port),
        Err(e) => {
            tracing::debug!("{} in {}", e, descriptor_path.display());
            None
        }
    }
}

fn value_for_key<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let (name, value) = line.split_once('=')?;
    if name.trim() == key {
        Some(value.trim())
    } else {
        None
    }
}
