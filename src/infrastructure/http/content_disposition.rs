//! `Content-Disposition` filename extraction.

use percent_encoding::percent_decode_str;
use thiserror::Error;

/// Header value that could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentDispositionError {
    /// A parameter is not `name=value`, or a quoted string is unterminated.
    #[error("malformed parameter: {0}")]
    Malformed(String),
    /// Extended value uses a charset other than UTF-8 or ISO-8859-1.
    #[error("unsupported charset: {0}")]
    UnsupportedCharset(String),
    /// Percent-decoded bytes are not valid in the declared charset.
    #[error("invalid encoding in extended value")]
    InvalidEncoding,
}

/// Returns the filename carried by a `Content-Disposition` value, if any.
///
/// `filename*` takes precedence over `filename`.
///
/// # Errors
/// Returns error if the value cannot be parsed.
pub fn parse_filename(value: &str) -> Result<Option<String>, ContentDispositionError> {
    let mut plain = None;
    let mut extended = None;

    for part in split_params(value)?.into_iter().skip(1) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, raw) = part
            .split_once('=')
            .ok_or_else(|| ContentDispositionError::Malformed(part.to_string()))?;
        let name = name.trim();
        let raw = raw.trim();

        if name.eq_ignore_ascii_case("filename*") {
            extended = Some(decode_extended(raw)?);
        } else if name.eq_ignore_ascii_case("filename") {
            plain = Some(unquote(raw)?);
        }
    }

    Ok(extended.or(plain).filter(|name| !name.is_empty()))
}

/// Splits on `;` outside of quoted strings.
fn split_params(value: &str) -> Result<Vec<&str>, ContentDispositionError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quoted {
        return Err(ContentDispositionError::Malformed(value.to_string()));
    }
    parts.push(&value[start..]);
    Ok(parts)
}

fn unquote(raw: &str) -> Result<String, ContentDispositionError> {
    let Some(inner) = raw.strip_prefix('"') else {
        return Ok(raw.to_string());
    };
    let inner = inner
        .strip_suffix('"')
        .ok_or_else(|| ContentDispositionError::Malformed(raw.to_string()))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Decodes an RFC 8187 `charset'language'value` string.
fn decode_extended(raw: &str) -> Result<String, ContentDispositionError> {
    let mut pieces = raw.splitn(3, '\'');
    let (Some(charset), Some(_language), Some(encoded)) =
        (pieces.next(), pieces.next(), pieces.next())
    else {
        return Err(ContentDispositionError::Malformed(raw.to_string()));
    };

    let bytes: Vec<u8> = percent_decode_str(encoded).collect();

    if charset.eq_ignore_ascii_case("utf-8") {
        String::from_utf8(bytes).map_err(|_| ContentDispositionError::InvalidEncoding)
    } else if charset.eq_ignore_ascii_case("iso-8859-1") {
        Ok(bytes.into_iter().map(char::from).collect())
    } else {
        Err(ContentDispositionError::UnsupportedCharset(
            charset.to_string(),
        ))
    }
}
