// src/process/parse.rs

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use thiserror::Error;
use tracing::{debug, instrument};

/// Header of the column carrying the certificate text.
pub const PEM_COLUMN_HEADER: &str = "PEM Info";

#[derive(Debug, Error)]
pub enum FeedError {
    /// The upstream schema changed; nothing downstream can be trusted.
    #[error("could not find {column:?} column in feed header {header:?}")]
    MissingColumn {
        column: &'static str,
        header: Vec<String>,
    },
}

/// One certificate row from the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    /// Fields 0..3 of the row joined with `:`.
    pub identifier: String,
    /// Raw "PEM Info" field, stray quotes and all.
    pub certificate_text: String,
}

/// Position of the "PEM Info" column, resolved once from the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PemColumn(usize);

impl PemColumn {
    pub fn locate(header: &StringRecord) -> Result<Self, FeedError> {
        header
            .iter()
            .position(|field| field == PEM_COLUMN_HEADER)
            .map(PemColumn)
            .ok_or_else(|| FeedError::MissingColumn {
                column: PEM_COLUMN_HEADER,
                header: header.iter().map(str::to_string).collect(),
            })
    }

    pub fn index(self) -> usize {
        self.0
    }
}

fn record_from_row(row: &StringRecord, pem: PemColumn) -> CertificateRecord {
    let field = |i: usize| row.get(i).unwrap_or_default();
    CertificateRecord {
        identifier: format!("{}:{}:{}", field(0), field(1), field(2)),
        certificate_text: field(pem.index()).to_string(),
    }
}

/// Parse the feed into certificate records, in feed order, header excluded.
#[instrument(level = "info", skip(csv_text), fields(bytes = csv_text.len()))]
pub fn parse_feed(csv_text: &str) -> Result<Vec<CertificateRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let mut pem: Option<PemColumn> = None;
    let mut records = Vec::new();

    for (idx, result) in rdr.records().enumerate() {
        let row = result.with_context(|| format!("CSV parse error at record {}", idx))?;

        // 1) resolve the column on the header row only
        let column = match pem {
            Some(c) => c,
            None => {
                let c = PemColumn::locate(&row)?;
                debug!(index = c.index(), "located {:?} column", PEM_COLUMN_HEADER);
                pem = Some(c);
                c
            }
        };

        // 2) header goes through the same path and is dropped below
        records.push(record_from_row(&row, column));
    }

    if pem.is_none() {
        return Err(FeedError::MissingColumn {
            column: PEM_COLUMN_HEADER,
            header: Vec::new(),
        }
        .into());
    }

    // 3) drop the header
    records.remove(0);
    debug!(count = records.len(), "parsed certificate records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Name,Ctry,Status,Other,PEM Info\n";

    #[test]
    fn single_row_scenario() -> Result<()> {
        let feed = format!("{}Acme,US,Included,x,'PEMTEXT'\n", HEADER);
        let records = parse_feed(&feed)?;
        assert_eq!(
            records,
            vec![CertificateRecord {
                identifier: "Acme:US:Included".to_string(),
                certificate_text: "'PEMTEXT'".to_string(),
            }]
        );
        Ok(())
    }

    #[test]
    fn record_count_is_rows_minus_header() -> Result<()> {
        let mut feed = HEADER.to_string();
        for i in 0..5 {
            feed.push_str(&format!("CA{},US,Included,x,pem{}\n", i, i));
        }
        let records = parse_feed(&feed)?;
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.identifier != "Name:Ctry:Status"));
        assert!(records.iter().all(|r| r.certificate_text != "PEM Info"));
        assert_eq!(records[4].identifier, "CA4:US:Included");
        Ok(())
    }

    #[test]
    fn column_position_is_discovered() -> Result<()> {
        let feed = "Owner,PEM Info,Cert,Status\n\
                    Foo Inc,pem-a,Foo Root,Included\n";
        let records = parse_feed(feed)?;
        assert_eq!(records[0].identifier, "Foo Inc:pem-a:Foo Root");
        assert_eq!(records[0].certificate_text, "pem-a");
        Ok(())
    }

    #[test]
    fn quoted_fields_keep_separators_and_newlines() -> Result<()> {
        let feed = format!(
            "{}\"Acme, Inc.\",US,Included,x,\"'-----BEGIN CERTIFICATE-----\nAQID\n-----END CERTIFICATE-----'\"\n",
            HEADER
        );
        let records = parse_feed(&feed)?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identifier, "Acme, Inc.:US:Included");
        assert_eq!(
            records[0].certificate_text,
            "'-----BEGIN CERTIFICATE-----\nAQID\n-----END CERTIFICATE-----'"
        );
        Ok(())
    }

    #[test]
    fn short_rows_yield_empty_fields() -> Result<()> {
        let feed = format!("{}Lonely\n", HEADER);
        let records = parse_feed(&feed)?;
        assert_eq!(records[0].identifier, "Lonely::");
        assert_eq!(records[0].certificate_text, "");
        Ok(())
    }

    #[test]
    fn missing_column_is_typed_error() {
        let err = parse_feed("Name,Ctry,Status,PEM\nA,B,C,D\n").unwrap_err();
        match err.downcast_ref::<FeedError>() {
            Some(FeedError::MissingColumn { column, header }) => {
                assert_eq!(*column, PEM_COLUMN_HEADER);
                assert_eq!(header, &["Name", "Ctry", "Status", "PEM"]);
            }
            None => panic!("unexpected error: {:#}", err),
        }
    }

    #[test]
    fn column_is_only_searched_in_header() {
        // "PEM Info" in a data row does not rescue a header without it
        let err = parse_feed("A,B,C\nx,y,PEM Info\n").unwrap_err();
        assert!(err.downcast_ref::<FeedError>().is_some());
    }

    #[test]
    fn empty_feed_is_missing_column() {
        let err = parse_feed("").unwrap_err();
        assert!(err.downcast_ref::<FeedError>().is_some());
    }

    #[test]
    fn header_only_feed_has_no_records() -> Result<()> {
        assert!(parse_feed(HEADER)?.is_empty());
        Ok(())
    }
}
