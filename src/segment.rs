use std::io::Write;

use serde::Serialize;

use crate::errors::{GenealogyError, Result};

/// A stretch of the sequence sharing one local tree.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SegmentEntry {
    pub replicate: usize,
    pub position: f64,
    pub length: f64,
    pub tmrca: f64,
    pub num_nodes: usize,
}

fn write_error(err: impl std::fmt::Display) -> GenealogyError {
    GenealogyError::WriteError(err.to_string())
}

impl SegmentEntry {
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv_writer.serialize(self).map_err(write_error)?;
        csv_writer.flush().map_err(write_error)?;
        Ok(())
    }

    pub fn write_header(writer: &mut impl Write) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv_writer
            .write_record(["replicate", "position", "length", "tmrca", "num_nodes"])
            .map_err(write_error)?;
        csv_writer.flush().map_err(write_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write() {
        let mut buffer = Vec::new();
        let entry = SegmentEntry {
            replicate: 1,
            position: 0.,
            length: 1250.5,
            tmrca: 20000.,
            num_nodes: 7,
        };
        SegmentEntry::write_header(&mut buffer).unwrap();
        entry.write(&mut buffer).unwrap();
        entry.write(&mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "replicate,position,length,tmrca,num_nodes\n1,0.0,1250.5,20000.0,7\n1,0.0,1250.5,20000.0,7\n"
        )
    }
}
