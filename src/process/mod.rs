// src/process/mod.rs
pub mod convert;
pub mod parse;
pub mod utils;

pub use convert::{
    convert_certificate, converter_for, remove_stale_der_files, ConvertError,
    ConvertedCertificate, DerConverter, NativeConverter, OpensslConverter,
};
pub use parse::{parse_feed, CertificateRecord, FeedError, PemColumn, PEM_COLUMN_HEADER};
