use serde::{Deserialize, Serialize};
use std::iter::Peekable;
use std::str::{FromStr, Lines};

use super::{BlockUid, DocumentError, sha256_upper_hex};
use crate::blockchain::BlockchainParameters;

const SIGNATURE_LEN: usize = 64;

/// Sections every block carries, in document order. `Transactions` comes last.
const SECTIONS: [&str; 8] = [
    "Identities",
    "Joiners",
    "Actives",
    "Leavers",
    "Revoked",
    "Excluded",
    "Certifications",
    "Transactions",
];

/// An immutable, parsed signed block.
#[derive(Debug, Clone, Serialize)]
pub struct BlockDocument {
    pub version: u32,
    pub currency: String,
    pub number: u64,
    pub pow_min: u32,
    pub time: u64,
    pub median_time: u64,
    /// Universal dividend amount, in units of `10^unit_base`.
    pub dividend: Option<u64>,
    pub unit_base: u32,
    pub issuer: String,
    pub issuers_frame: u64,
    pub issuers_frame_var: i64,
    pub different_issuers_count: u64,
    pub previous_hash: Option<String>,
    pub previous_issuer: Option<String>,
    /// Only present in block zero.
    pub parameters: Option<BlockchainParameters>,
    pub members_count: u64,
    pub identities: Vec<String>,
    pub joiners: Vec<String>,
    pub actives: Vec<String>,
    pub leavers: Vec<String>,
    pub revoked: Vec<String>,
    pub excluded: Vec<String>,
    pub certifications: Vec<String>,
    /// Compact transaction lines, kept verbatim.
    pub transactions: Vec<String>,
    pub inner_hash: String,
    pub nonce: u64,
    pub signature: String,
    /// Computed from the signed part of the document.
    pub hash: String,
    /// Supplied by the node alongside the document.
    pub monetary_mass: u64,
}

/// A block as returned by the node's JSON API.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteBlock {
    pub number: u64,
    #[serde(default)]
    pub hash: Option<String>,
    pub raw: String,
    pub signature: String,
    #[serde(rename = "monetaryMass", default)]
    pub monetary_mass: u64,
}

impl RemoteBlock {
    /// Rebuild the signed document (`raw + signature + "\n"`), parse it and
    /// check it against the envelope.
    pub fn into_document(self) -> Result<BlockDocument, DocumentError> {
        let signed = format!("{}{}\n", self.raw, self.signature);
        let mut doc = BlockDocument::from_signed_raw(&signed)?;
        if doc.number != self.number {
            return Err(DocumentError::NumberMismatch {
                envelope: self.number,
                document: doc.number,
            });
        }
        if let Some(declared) = self.hash {
            if !declared.eq_ignore_ascii_case(&doc.hash) {
                return Err(DocumentError::HashMismatch {
                    declared,
                    computed: doc.hash,
                });
            }
        }
        doc.monetary_mass = self.monetary_mass;
        Ok(doc)
    }
}

impl BlockDocument {
    /// Parse a signed block: raw body, detached signature, trailing newline.
    pub fn from_signed_raw(signed: &str) -> Result<Self, DocumentError> {
        let body = signed
            .strip_suffix('\n')
            .ok_or(DocumentError::MissingTrailingNewline)?;
        let (head, signature) = body
            .rsplit_once('\n')
            .ok_or(DocumentError::MissingSignature)?;
        let raw = &body[..head.len() + 1];
        check_signature(signature)?;

        let mut lines = FieldLines::new(raw);

        let version: u32 = lines.parsed("Version")?;
        let doc_type = lines.field("Type")?;
        if doc_type != "Block" {
            return Err(DocumentError::InvalidField {
                field: "Type",
                value: doc_type.to_string(),
            });
        }
        let currency = lines.field("Currency")?.to_string();
        let number: u64 = lines.parsed("Number")?;
        let pow_min: u32 = lines.parsed("PoWMin")?;
        let time: u64 = lines.parsed("Time")?;
        let median_time: u64 = lines.parsed("MedianTime")?;
        let dividend: Option<u64> = lines.optional_parsed("UniversalDividend")?;
        let unit_base: u32 = lines.optional_parsed("UnitBase")?.unwrap_or(0);
        let issuer = lines.field("Issuer")?.to_string();
        let issuers_frame: u64 = lines.optional_parsed("IssuersFrame")?.unwrap_or(0);
        let issuers_frame_var: i64 = lines.optional_parsed("IssuersFrameVar")?.unwrap_or(0);
        let different_issuers_count: u64 =
            lines.optional_parsed("DifferentIssuersCount")?.unwrap_or(0);

        let (previous_hash, previous_issuer) = if number > 0 {
            (
                Some(lines.field("PreviousHash")?.to_string()),
                Some(lines.field("PreviousIssuer")?.to_string()),
            )
        } else {
            (None, None)
        };

        let parameters = match lines.optional_field("Parameters") {
            Some(value) if number == 0 => Some(BlockchainParameters::from_block_field(value)?),
            Some(value) => return Err(DocumentError::UnexpectedLine(format!("Parameters: {value}"))),
            None => None,
        };

        let members_count: u64 = lines.parsed("MembersCount")?;

        let mut sections: Vec<Vec<String>> = Vec::with_capacity(SECTIONS.len());
        for (i, name) in SECTIONS.iter().enumerate() {
            lines.section_header(name)?;
            sections.push(lines.section_body(SECTIONS.get(i + 1).copied()));
        }

        let inner_hash = lines.field("InnerHash")?.to_string();
        let nonce: u64 = lines.parsed("Nonce")?;
        if let Some(extra) = lines.next_line() {
            return Err(DocumentError::UnexpectedLine(extra.to_string()));
        }

        let prefix_len = raw
            .find("\nInnerHash: ")
            .map(|i| i + 1)
            .ok_or(DocumentError::MissingField("InnerHash"))?;
        let computed_inner = sha256_upper_hex(&raw[..prefix_len]);
        if !computed_inner.eq_ignore_ascii_case(&inner_hash) {
            return Err(DocumentError::InnerHashMismatch {
                declared: inner_hash,
                computed: computed_inner,
            });
        }

        let hash = Self::compute_hash(&inner_hash, nonce, signature);

        let mut sections = sections.into_iter();
        let mut next_section = || sections.next().unwrap_or_default();

        Ok(Self {
            version,
            currency,
            number,
            pow_min,
            time,
            median_time,
            dividend,
            unit_base,
            issuer,
            issuers_frame,
            issuers_frame_var,
            different_issuers_count,
            previous_hash,
            previous_issuer,
            parameters,
            members_count,
            identities: next_section(),
            joiners: next_section(),
            actives: next_section(),
            leavers: next_section(),
            revoked: next_section(),
            excluded: next_section(),
            certifications: next_section(),
            transactions: next_section(),
            inner_hash,
            nonce,
            signature: signature.to_string(),
            hash,
            monetary_mass: 0,
        })
    }

    /// Block hash: SHA-256 over the inner hash, nonce and signature lines.
    pub fn compute_hash(inner_hash: &str, nonce: u64, signature: &str) -> String {
        sha256_upper_hex(&format!(
            "InnerHash: {inner_hash}\nNonce: {nonce}\n{signature}\n"
        ))
    }

    pub fn block_uid(&self) -> BlockUid {
        BlockUid::new(self.number, self.hash.clone())
    }

    /// Number of compact transactions in the block.
    pub fn transaction_count(&self) -> usize {
        self.transactions
            .iter()
            .filter(|l| l.starts_with("TX:"))
            .count()
    }

    /// True if the block changes membership or identities.
    pub fn has_identity_events(&self) -> bool {
        !(self.identities.is_empty()
            && self.joiners.is_empty()
            && self.actives.is_empty()
            && self.leavers.is_empty()
            && self.revoked.is_empty()
            && self.excluded.is_empty())
    }
}

fn check_signature(signature: &str) -> Result<(), DocumentError> {
    if signature.is_empty() || signature.chars().any(char::is_whitespace) {
        return Err(DocumentError::InvalidSignature(signature.to_string()));
    }
    let bytes = base64::decode(signature)
        .map_err(|e| DocumentError::InvalidSignature(format!("{signature}: {e}")))?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(DocumentError::InvalidSignature(format!(
            "{signature}: expected {SIGNATURE_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}

/// Sequential reader over `Key: value` lines.
struct FieldLines<'a> {
    lines: Peekable<Lines<'a>>,
}

impl<'a> FieldLines<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            lines: raw.lines().peekable(),
        }
    }

    fn next_line(&mut self) -> Option<&'a str> {
        self.lines.next()
    }

    fn optional_field(&mut self, name: &'static str) -> Option<&'a str> {
        let value = self
            .lines
            .peek()
            .copied()
            .and_then(|line| line.strip_prefix(name))
            .and_then(|rest| rest.strip_prefix(": "))?;
        self.lines.next();
        Some(value)
    }

    fn field(&mut self, name: &'static str) -> Result<&'a str, DocumentError> {
        self.optional_field(name)
            .ok_or(DocumentError::MissingField(name))
    }

    fn parsed<T: FromStr>(&mut self, name: &'static str) -> Result<T, DocumentError> {
        let value = self.field(name)?;
        parse_value(name, value)
    }

    fn optional_parsed<T: FromStr>(&mut self, name: &'static str) -> Result<Option<T>, DocumentError> {
        self.optional_field(name)
            .map(|value| parse_value(name, value))
            .transpose()
    }

    fn section_header(&mut self, name: &'static str) -> Result<(), DocumentError> {
        match self.lines.peek().copied() {
            Some(line) if line.strip_suffix(':') == Some(name) => {
                self.lines.next();
                Ok(())
            }
            _ => Err(DocumentError::MissingField(name)),
        }
    }

    /// Collect lines up to the next section header (or `InnerHash`).
    fn section_body(&mut self, next: Option<&str>) -> Vec<String> {
        let mut body = Vec::new();
        while let Some(line) = self.lines.peek().copied() {
            let at_next_section = next.is_some_and(|n| line.strip_suffix(':') == Some(n));
            if at_next_section || line.starts_with("InnerHash: ") {
                break;
            }
            body.push(line.to_string());
            self.lines.next();
        }
        body
    }
}

fn parse_value<T: FromStr>(field: &'static str, value: &str) -> Result<T, DocumentError> {
    value.parse().map_err(|_| DocumentError::InvalidField {
        field,
        value: value.to_string(),
    })
}
