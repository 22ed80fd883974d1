//! Output writers: the discovery table and the device document.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use census_core::{ClassifiedDevice, HostAddress};

use crate::aggregate::{DiscoveryReport, ProbeReport};
use crate::error::Result;

/// `IP<delim>STATUS` with one row per reported host, ascending by address.
pub fn write_discovery_table<W: Write>(
    writer: W,
    report: &DiscoveryReport,
    delimiter: u8,
) -> Result<()> {
    let mut csv = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);
    csv.write_record(["IP", "STATUS"])?;
    for (address, status) in &report.hosts {
        csv.write_record([address.to_string(), status.to_string()])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn render_discovery_table(report: &DiscoveryReport, delimiter: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_discovery_table(&mut buf, report, delimiter)?;
    Ok(buf)
}

/// Address → `{model, fullmodel, serial, firmware, software, vendor, type}`.
pub fn render_device_document(report: &ProbeReport) -> Result<Vec<u8>> {
    let devices: &BTreeMap<HostAddress, ClassifiedDevice> = &report.devices;
    let mut doc = serde_json::to_vec_pretty(devices)?;
    doc.push(b'\n');
    Ok(doc)
}

/// Write to `path`, or to stdout when there is none.
pub fn emit(path: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, bytes)?;
            tracing::info!(path = %path.display(), bytes = bytes.len(), "Output written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
