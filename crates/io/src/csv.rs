// CSV import/export for record sets

use std::io::Read;
use std::path::Path;

use vulnbase_recon::model::{Record, RecordSet};

use crate::error::IoError;

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1).
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let read_err = |e: std::io::Error| IoError::Read {
        path: path.display().to_string(),
        detail: e.to_string(),
    };

    let mut file = std::fs::File::open(path).map_err(read_err)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(read_err)?;

    // Try UTF-8 first; on failure, recover the buffer from the error
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            // Fall back to Windows-1252 (common for Excel-exported CSVs)
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

pub fn read_record_set(path: &Path) -> Result<RecordSet, IoError> {
    let content = read_file_as_utf8(path)?;
    parse_record_set(&content).map_err(|detail| IoError::Parse {
        path: path.display().to_string(),
        detail,
    })
}

/// Parse CSV text into a record set. First line is the header; ragged rows
/// are tolerated (short rows read as empty for the missing fields).
pub fn parse_record_set(content: &str) -> Result<RecordSet, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut set = RecordSet::new(headers.clone());
    for result in reader.records() {
        let row = result.map_err(|e| e.to_string())?;
        let mut record = Record::new();
        for (i, name) in headers.iter().enumerate() {
            record.set(name, row.get(i).unwrap_or(""));
        }
        set.push(record);
    }
    Ok(set)
}

/// Serialize a record set back to CSV. Fields containing delimiters,
/// quotes, or newlines are quoted by the writer, so the output stays
/// openable by spreadsheet tools.
pub fn to_csv_string(set: &RecordSet) -> Result<String, String> {
    if set.header.is_empty() {
        return Ok(String::new());
    }

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(&set.header).map_err(|e| e.to_string())?;
    for record in &set.records {
        writer
            .write_record(set.row_values(record))
            .map_err(|e| e.to_string())?;
    }

    let bytes = writer.into_inner().map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}
