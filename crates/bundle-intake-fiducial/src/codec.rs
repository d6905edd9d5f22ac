//! Fixed-width fiducial payload codec.
//!
//! Every printed page carries the same 17-digit text in each of its corner
//! symbols, differing only in the corner digit:
//!
//! ```text
//! TTTTT PPP VVV O CCCCC
//! paper page ver corner public-code
//! ```
//!
//! Extra (mobile) sheets carry the literal [`EXTRA_PAGE_SENTINEL`] instead.
//! Widths and the sentinel are shared with the paper-generation side and must
//! not change independently of it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Literal text printed on extra sheets.
pub const EXTRA_PAGE_SENTINEL: &str = "plomX";

pub const PAPER_ID_WIDTH: usize = 5;
pub const PAGE_ID_WIDTH: usize = 3;
pub const VERSION_ID_WIDTH: usize = 3;
pub const CORNER_WIDTH: usize = 1;
pub const PUBLIC_CODE_WIDTH: usize = 5;

/// Total length of a page payload.
pub const PAGE_CODE_LEN: usize =
    PAPER_ID_WIDTH + PAGE_ID_WIDTH + VERSION_ID_WIDTH + CORNER_WIDTH + PUBLIC_CODE_WIDTH;

/// Named payload field, in wire order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeField {
    PaperId,
    PageId,
    VersionId,
    Corner,
    PublicCode,
}

impl CodeField {
    pub const WIRE_ORDER: [CodeField; 5] = [
        CodeField::PaperId,
        CodeField::PageId,
        CodeField::VersionId,
        CodeField::Corner,
        CodeField::PublicCode,
    ];

    #[inline]
    pub fn width(self) -> usize {
        match self {
            CodeField::PaperId => PAPER_ID_WIDTH,
            CodeField::PageId => PAGE_ID_WIDTH,
            CodeField::VersionId => VERSION_ID_WIDTH,
            CodeField::Corner => CORNER_WIDTH,
            CodeField::PublicCode => PUBLIC_CODE_WIDTH,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CodeField::PaperId => "paper_id",
            CodeField::PageId => "page_id",
            CodeField::VersionId => "version_id",
            CodeField::Corner => "corner_index",
            CodeField::PublicCode => "public_code",
        }
    }
}

impl fmt::Display for CodeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded payload of one corner symbol on a regular page.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageCode {
    pub paper_id: u32,
    pub page_id: u32,
    pub version_id: u32,
    /// Printed corner index `1..=4` (NE, NW, SW, SE on an upright page).
    pub corner: u8,
    /// Assessment-wide code, kept as its zero-padded digit string.
    pub public_code: String,
}

/// What a single fiducial symbol says about its page.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FiducialCode {
    Page(PageCode),
    Extra,
}

impl FiducialCode {
    #[inline]
    pub fn is_extra(&self) -> bool {
        matches!(self, FiducialCode::Extra)
    }

    #[inline]
    pub fn as_page(&self) -> Option<&PageCode> {
        match self {
            FiducialCode::Page(code) => Some(code),
            FiducialCode::Extra => None,
        }
    }

    /// Printed corner index, absent on extra sheets.
    #[inline]
    pub fn corner(&self) -> Option<u8> {
        self.as_page().map(|c| c.corner)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error(
        "fiducial text has length {len}, expected {expected} digits or the extra-page sentinel",
        expected = PAGE_CODE_LEN
    )]
    WrongLength { len: usize },
    #[error("fiducial field {field} contains a non-digit character")]
    NonDigit { field: CodeField },
    #[error("corner index {corner} is outside 1..=4")]
    InvalidCorner { corner: u8 },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{field}={value} does not fit in {width} digits")]
    FieldOutOfRange {
        field: CodeField,
        value: u32,
        width: usize,
    },
    #[error("public code {code:?} is not {width} ASCII digits", width = PUBLIC_CODE_WIDTH)]
    InvalidPublicCode { code: String },
    #[error("corner index {corner} is outside 1..=4")]
    InvalidCorner { corner: u8 },
}

fn parse_digits(text: &str, field: CodeField) -> Result<u32, DecodeError> {
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::NonDigit { field });
    }
    text.parse().map_err(|_| DecodeError::NonDigit { field })
}

/// Decode one symbol's text.
pub fn decode(text: &str) -> Result<FiducialCode, DecodeError> {
    if text == EXTRA_PAGE_SENTINEL {
        return Ok(FiducialCode::Extra);
    }
    // byte length; a multi-byte char can never be a digit so NonDigit catches it
    if text.len() != PAGE_CODE_LEN {
        return Err(DecodeError::WrongLength { len: text.len() });
    }

    let mut fields = [""; 5];
    let mut start = 0;
    for (slot, field) in fields.iter_mut().zip(CodeField::WIRE_ORDER) {
        let end = start + field.width();
        *slot = text
            .get(start..end)
            .ok_or(DecodeError::NonDigit { field })?;
        start = end;
    }
    let [paper, page, version, corner, public_code] = fields;

    let paper_id = parse_digits(paper, CodeField::PaperId)?;
    let page_id = parse_digits(page, CodeField::PageId)?;
    let version_id = parse_digits(version, CodeField::VersionId)?;
    let corner = parse_digits(corner, CodeField::Corner)? as u8;
    if !(1..=4).contains(&corner) {
        return Err(DecodeError::InvalidCorner { corner });
    }
    parse_digits(public_code, CodeField::PublicCode)?;

    Ok(FiducialCode::Page(PageCode {
        paper_id,
        page_id,
        version_id,
        corner,
        public_code: public_code.to_string(),
    }))
}

fn check_width(field: CodeField, value: u32) -> Result<u32, EncodeError> {
    let limit = 10u64.pow(field.width() as u32);
    if u64::from(value) >= limit {
        return Err(EncodeError::FieldOutOfRange {
            field,
            value,
            width: field.width(),
        });
    }
    Ok(value)
}

/// Encode a code back into its printed text.
pub fn encode(code: &FiducialCode) -> Result<String, EncodeError> {
    let page = match code {
        FiducialCode::Extra => return Ok(EXTRA_PAGE_SENTINEL.to_string()),
        FiducialCode::Page(page) => page,
    };

    let paper = check_width(CodeField::PaperId, page.paper_id)?;
    let page_id = check_width(CodeField::PageId, page.page_id)?;
    let version = check_width(CodeField::VersionId, page.version_id)?;
    if !(1..=4).contains(&page.corner) {
        return Err(EncodeError::InvalidCorner {
            corner: page.corner,
        });
    }
    if page.public_code.len() != PUBLIC_CODE_WIDTH
        || !page.public_code.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(EncodeError::InvalidPublicCode {
            code: page.public_code.clone(),
        });
    }

    Ok(format!(
        "{paper:0pw$}{page_id:0gw$}{version:0vw$}{corner}{code}",
        pw = PAPER_ID_WIDTH,
        gw = PAGE_ID_WIDTH,
        vw = VERSION_ID_WIDTH,
        corner = page.corner,
        code = page.public_code,
    ))
}

impl FromStr for FiducialCode {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(paper_id: u32, page_id: u32, version_id: u32, corner: u8) -> FiducialCode {
        FiducialCode::Page(PageCode {
            paper_id,
            page_id,
            version_id,
            corner,
            public_code: "93849".to_string(),
        })
    }

    #[test]
    fn decodes_documented_layout() {
        let code = decode("00007001001293849").expect("valid");
        assert_eq!(code, page(7, 1, 1, 2));
        assert_eq!(code.corner(), Some(2));
    }

    #[test]
    fn sentinel_is_extra_page() {
        assert_eq!(decode(EXTRA_PAGE_SENTINEL), Ok(FiducialCode::Extra));
        assert_eq!(encode(&FiducialCode::Extra).as_deref(), Ok("plomX"));
        assert_eq!(FiducialCode::Extra.corner(), None);
    }

    #[test]
    fn identities_survive_encode_then_decode() {
        for (paper, pg, ver, corner) in [
            (0, 0, 0, 1),
            (7, 1, 1, 4),
            (99_999, 999, 999, 3),
            (12_345, 17, 2, 2),
        ] {
            let code = page(paper, pg, ver, corner);
            let text = encode(&code).expect("in range");
            assert_eq!(text.len(), PAGE_CODE_LEN);
            assert_eq!(decode(&text), Ok(code));
        }
    }

    #[test]
    fn decode_then_encode_reproduces_text() {
        for text in ["00001003001193849", "99999999999422339", "plomX"] {
            let code: FiducialCode = text.parse().expect("valid");
            assert_eq!(encode(&code).as_deref(), Ok(text));
        }
    }

    #[test]
    fn malformed_text_is_rejected() {
        assert_eq!(
            decode("0000700100129384"),
            Err(DecodeError::WrongLength { len: 16 })
        );
        assert_eq!(
            decode("00007001001293849 "),
            Err(DecodeError::WrongLength { len: 18 })
        );
        assert_eq!(
            decode("0000a001001293849"),
            Err(DecodeError::NonDigit {
                field: CodeField::PaperId
            })
        );
        assert_eq!(
            decode("0000700100129384x"),
            Err(DecodeError::NonDigit {
                field: CodeField::PublicCode
            })
        );
        assert_eq!(
            decode("00007001001593849"),
            Err(DecodeError::InvalidCorner { corner: 5 })
        );
        assert!(decode("plomx").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn out_of_width_fields_do_not_encode() {
        assert_eq!(
            encode(&page(100_000, 1, 1, 1)),
            Err(EncodeError::FieldOutOfRange {
                field: CodeField::PaperId,
                value: 100_000,
                width: 5
            })
        );
        let mut bad = page(1, 1, 1, 1);
        if let FiducialCode::Page(p) = &mut bad {
            p.public_code = "123".into();
        }
        assert!(matches!(
            encode(&bad),
            Err(EncodeError::InvalidPublicCode { .. })
        ));
    }

    #[test]
    fn serde_tags_code_kind() {
        let json = serde_json::to_string(&FiducialCode::Extra).expect("json");
        assert_eq!(json, r#"{"kind":"extra"}"#);
        let back: FiducialCode =
            serde_json::from_str(&serde_json::to_string(&page(7, 1, 1, 2)).expect("json"))
                .expect("parse");
        assert_eq!(back, page(7, 1, 1, 2));
    }
}
