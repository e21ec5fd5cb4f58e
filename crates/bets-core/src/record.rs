//! Positional record parsing.
//!
//! A raw line is split on the configured delimiter and mapped by position:
//! `nombre, apellido, doc, nacimiento, numero`. Parsing is lenient on purpose:
//! a short line leaves the trailing fields absent and extra fields are
//! ignored. Absent fields are omitted from the serialized record, so the
//! server sees exactly what the line carried.

use serde::Serialize;

/// One bet, keyed by the wire field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// First name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    /// Last name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apellido: Option<String>,
    /// Document id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// Birth date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nacimiento: Option<String>,
    /// Bet number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numero: Option<String>,
    /// Agency id, always present
    pub agencia: String,
}

impl Record {
    /// Whether every positional field was present in the source line.
    pub fn is_complete(&self) -> bool {
        self.nombre.is_some()
            && self.apellido.is_some()
            && self.doc.is_some()
            && self.nacimiento.is_some()
            && self.numero.is_some()
    }

    /// Approximate serialized size, used for byte accounting in metrics.
    pub fn size_hint(&self) -> usize {
        [
            &self.nombre,
            &self.apellido,
            &self.doc,
            &self.nacimiento,
            &self.numero,
        ]
        .iter()
        .map(|f| f.as_ref().map_or(0, |v| v.len()))
        .sum::<usize>()
            + self.agencia.len()
    }
}

/// Turns raw lines into [`Record`]s for one agency.
#[derive(Debug, Clone)]
pub struct RecordParser {
    agency: String,
    delimiter: char,
}

impl RecordParser {
    /// Create a parser attaching `agency` to every record.
    pub fn new(agency: impl Into<String>, delimiter: char) -> Self {
        Self {
            agency: agency.into(),
            delimiter,
        }
    }

    /// Agency id attached by this parser.
    pub fn agency(&self) -> &str {
        &self.agency
    }

    /// Parse one line. Never fails.
    pub fn parse(&self, line: &str) -> Record {
        let mut fields = line.split(self.delimiter).map(str::to_string);

        let record = Record {
            nombre: fields.next(),
            apellido: fields.next(),
            doc: fields.next(),
            nacimiento: fields.next(),
            numero: fields.next(),
            agencia: self.agency.clone(),
        };

        if !record.is_complete() {
            tracing::debug!(line = %line, "Short record line, trailing fields left absent");
        }

        record
    }
}
