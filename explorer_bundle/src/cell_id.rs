//! Cell identifiers.
//!
//! A cell identifier is the textual form of a 32-bit index: eight symbols in `a..=p`, one per
//! nibble from the most significant, followed by the `-1` dataset suffix.
//! For example, `10000` (`0x2710`) is encoded as `aaaachba-1`.

use thiserror::Error;

/// The number of symbols of an encoded cell identifier, excluding the suffix.
pub const CELL_ID_SYMBOLS: usize = 8;

/// The dataset suffix appended to every encoded cell identifier.
pub const CELL_ID_SUFFIX: &str = "-1";

const SYMBOL_OFFSET: u8 = b'a';

/// An invalid cell identifier.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CellIdError {
    /// The identifier has no symbols.
    #[error("cell identifier {0:?} is empty")]
    Empty(String),
    /// The identifier has more symbols than fit in 32 bits.
    #[error("cell identifier {0:?} has more than {CELL_ID_SYMBOLS} symbols")]
    TooLong(String),
    /// The identifier holds a symbol outside `a..=p`.
    #[error("cell identifier {id:?} holds invalid symbol {symbol:?}")]
    InvalidSymbol {
        /// The identifier.
        id: String,
        /// The offending symbol.
        symbol: char,
    },
}

/// Encode a cell index as a cell identifier, e.g. `10000` is encoded as `aaaachba-1`.
#[must_use]
pub fn encode_cell_id(cell_id: u32) -> String {
    let mut id = String::with_capacity(CELL_ID_SYMBOLS + CELL_ID_SUFFIX.len());
    for position in (0..CELL_ID_SYMBOLS).rev() {
        let nibble = (cell_id >> (4 * position)) & 0xF;
        // nibble < 16
        #[allow(clippy::cast_possible_truncation)]
        id.push(char::from(SYMBOL_OFFSET + nibble as u8));
    }
    id.push_str(CELL_ID_SUFFIX);
    id
}

/// Decode a cell identifier into a cell index.
///
/// Anything after the last `-` is treated as a dataset suffix and ignored.
/// Codes shorter than [`CELL_ID_SYMBOLS`] are accepted.
///
/// # Errors
/// Returns a [`CellIdError`] if the code is empty, too long, or holds a symbol outside `a..=p`.
pub fn decode_cell_id(id: &str) -> Result<u32, CellIdError> {
    let code = id.rsplit_once('-').map_or(id, |(code, _suffix)| code);
    if code.is_empty() {
        return Err(CellIdError::Empty(id.to_string()));
    }
    if code.len() > CELL_ID_SYMBOLS {
        return Err(CellIdError::TooLong(id.to_string()));
    }
    code.chars().try_fold(0u32, |value, symbol| match symbol {
        'a'..='p' => Ok((value << 4) | (u32::from(symbol) - u32::from(SYMBOL_OFFSET))),
        _ => Err(CellIdError::InvalidSymbol {
            id: id.to_string(),
            symbol,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_id_known_value() {
        assert_eq!(encode_cell_id(10000), "aaaachba-1");
        assert_eq!(decode_cell_id("aaaachba-1"), Ok(10000));
        assert_eq!(encode_cell_id(0), "aaaaaaaa-1");
        assert_eq!(encode_cell_id(u32::MAX), "pppppppp-1");
    }

    #[test]
    fn cell_id_round_trip() {
        for cell_id in [0, 1, 15, 16, 255, 4096, 65_535, 1 << 24, 0xDEAD_BEEF, u32::MAX] {
            assert_eq!(decode_cell_id(&encode_cell_id(cell_id)), Ok(cell_id));
        }
    }

    #[test]
    fn cell_id_suffix_and_short_codes() {
        assert_eq!(decode_cell_id("aaaachba-2"), Ok(10000));
        assert_eq!(decode_cell_id("chba"), Ok(10000));
        assert_eq!(decode_cell_id("b"), Ok(1));
    }

    #[test]
    fn cell_id_invalid() {
        assert_eq!(
            decode_cell_id("-1"),
            Err(CellIdError::Empty("-1".to_string()))
        );
        assert_eq!(
            decode_cell_id("aaaaaaaaa-1"),
            Err(CellIdError::TooLong("aaaaaaaaa-1".to_string()))
        );
        assert_eq!(
            decode_cell_id("aaaaqaaa-1"),
            Err(CellIdError::InvalidSymbol {
                id: "aaaaqaaa-1".to_string(),
                symbol: 'q'
            })
        );
    }
}
