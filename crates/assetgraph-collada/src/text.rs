//! Whitespace-separated value lists found in element text.

use assetgraph_core::{AssetError, Result};
use nom::{
    character::complete::{i64 as integer, multispace0, multispace1},
    combinator::all_consuming,
    multi::separated_list0,
    number::complete::float,
    sequence::delimited,
    IResult,
};

fn list<'a, O>(
    item: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<O>> {
    all_consuming(delimited(multispace0, separated_list0(multispace1, item), multispace0))
}

fn malformed(what: &str, input: &str) -> AssetError {
    let head: String = input.trim_start().chars().take(24).collect();
    AssetError::invalid(format!("malformed {} list near \"{}\"", what, head))
}

/// Parse a list of floats.
pub fn floats(input: &str) -> Result<Vec<f32>> {
    list(float)(input)
        .map(|(_, values)| values)
        .map_err(|_| malformed("float", input))
}

/// Parse a list of signed integers.
pub fn ints(input: &str) -> Result<Vec<i64>> {
    list(integer)(input)
        .map(|(_, values)| values)
        .map_err(|_| malformed("integer", input))
}

/// Parse a list of indices. Negative values, written by some exporters,
/// are read as 0.
pub fn indices(input: &str) -> Result<Vec<usize>> {
    Ok(ints(input)?
        .into_iter()
        .map(|v| usize::try_from(v).unwrap_or(0))
        .collect())
}

/// Exactly `N` floats.
pub fn fixed<const N: usize>(input: &str) -> Result<[f32; N]> {
    let values = floats(input)?;
    <[f32; N]>::try_from(values.as_slice()).map_err(|_| {
        AssetError::invalid(format!("expected {} values, found {}", N, values.len()))
    })
}

/// Decode hexadecimal octets, ignoring whitespace.
pub fn hex_bytes(input: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = input.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(AssetError::invalid("odd number of hex digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|_| AssetError::invalid("invalid hex digit"))?;
            u8::from_str_radix(text, 16).map_err(|_| AssetError::invalid(format!("invalid hex octet \"{}\"", text)))
        })
        .collect()
}

/// Decode `%XX` escapes in a URI path. Malformed escapes are kept as written.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(v) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_lists() {
        assert_eq!(floats(" 1 -2.5\n3e2\t.5 ").unwrap(), vec![1.0, -2.5, 300.0, 0.5]);
        assert!(floats("").unwrap().is_empty());
        assert!(floats("   ").unwrap().is_empty());
        assert!(floats("1 two 3").is_err());
    }

    #[test]
    fn test_index_lists_clamp_negatives() {
        assert_eq!(ints("0 -1 7").unwrap(), vec![0, -1, 7]);
        assert_eq!(indices("0 -1 7").unwrap(), vec![0, 0, 7]);
        assert!(indices("1.5").is_err());
    }

    #[test]
    fn test_fixed_length() {
        assert_eq!(fixed::<3>("1 2 3").unwrap(), [1.0, 2.0, 3.0]);
        assert!(fixed::<3>("1 2").is_err());
    }

    #[test]
    fn test_hex_and_percent() {
        assert_eq!(hex_bytes("89 50\n4e47").unwrap(), vec![0x89, 0x50, 0x4e, 0x47]);
        assert!(hex_bytes("abc").is_err());
        assert_eq!(percent_decode("my%20file.png"), "my file.png");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }
}
