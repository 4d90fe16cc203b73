use thiserror::Error;

pub mod project;
pub mod source;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading project file: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
