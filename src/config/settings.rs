//! Settings module.

use super::model::Model;

use serde::{Deserialize, Serialize};
use std::fs;

/// Settings of a simulation run: the model and the genomic region to walk along.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: Model,

    /// Length of the simulated sequence in nucleotides.
    #[serde(default = "default_sequence_length")]
    pub sequence_length: f64,

    /// Number of independent replicates.
    #[serde(default = "default_replicates")]
    pub replicates: usize,
}

fn default_sequence_length() -> f64 {
    150000.
}

fn default_replicates() -> usize {
    1
}

#[derive(Debug)]
pub enum SettingsError {
    IoError(std::io::Error),
    YamlError(serde_yaml::Error),
}

impl std::error::Error for SettingsError {}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::IoError(error) => write!(formatter, "IO error: {}", error),
            SettingsError::YamlError(error) => write!(formatter, "YAML error: {}", error),
        }
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut output = vec![];
        self.write(&mut output).map_err(|_| std::fmt::Error)?;
        write!(formatter, "{}", String::from_utf8_lossy(&output))
    }
}

impl Settings {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            sequence_length: default_sequence_length(),
            replicates: default_replicates(),
        }
    }

    pub fn write(&self, writer: &mut dyn std::io::Write) -> Result<(), SettingsError> {
        serde_yaml::to_writer(writer, self).map_err(SettingsError::YamlError)
    }

    pub fn read(reader: &mut dyn std::io::Read) -> Result<Settings, SettingsError> {
        serde_yaml::from_reader(reader).map_err(SettingsError::YamlError)
    }

    pub fn write_to_file(&self, filename: &str) -> Result<(), SettingsError> {
        let file = fs::File::create(filename).map_err(SettingsError::IoError)?;
        let mut writer = std::io::BufWriter::new(file);
        self.write(&mut writer)
    }

    pub fn read_from_file(filename: &str) -> Result<Settings, SettingsError> {
        let file = fs::File::open(filename).map_err(SettingsError::IoError)?;
        let mut reader = std::io::BufReader::new(file);
        Self::read(&mut reader)
    }
}
