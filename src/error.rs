use crate::ndp::InterfaceId;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("interface {id} not found")]
    InterfaceNotFound { id: InterfaceId },

    #[error("out of resources")]
    OutOfResources,

    #[error("entry not found")]
    NotFound,

    #[error("no route to destination")]
    NoRoute,
}

pub type Result<T> = std::result::Result<T, Error>;
