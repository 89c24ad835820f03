//! Extraction of anchor distances from ranging telemetry lines
//!
//! A ranging report carries one `0x<address>: =<distance>` token per
//! anchor, e.g. `0xaaaa: =1234 0xbbbb: =2345 0xcccc: =3456 0xdddd: =4567`.
//! Any other text on the line is ignored.

use crate::core::{AnchorConfiguration, DistanceVector, ANCHOR_COUNT};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"0x([0-9A-Fa-f]{1,8}):\s*=(\d+)").expect("ranging token pattern is valid")
});

/// Reasons a line does not yield a distance vector
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("found {found} ranging tokens, need {required}")]
    TooFewTokens { found: usize, required: usize },
    #[error("distance {token:?} is not a valid integer")]
    InvalidDistance { token: String },
    #[error("no token for anchor 0x{address:04x}")]
    MissingAnchor { address: u32 },
}

/// One `address: =distance` token. The distance is kept as text and only
/// converted when the token is actually used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangingToken<'a> {
    pub address: u32,
    pub digits: &'a str,
}

impl RangingToken<'_> {
    pub fn distance(&self) -> Result<u32, ParseError> {
        self.digits.parse::<u32>().map_err(|_| ParseError::InvalidDistance {
            token: self.digits.to_string(),
        })
    }
}

/// How tokens are assigned to anchors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenMapping {
    /// The first four tokens on the line, in line order
    #[default]
    Positional,
    /// For each anchor, the first token carrying that anchor's address
    ByAddress([u32; ANCHOR_COUNT]),
}

impl TokenMapping {
    /// Address mapping when requested and every anchor has an address,
    /// positional otherwise
    pub fn for_anchors(anchors: &AnchorConfiguration, match_by_address: bool) -> Self {
        match anchors.addresses() {
            Some(addresses) if match_by_address => TokenMapping::ByAddress(addresses),
            _ => TokenMapping::Positional,
        }
    }
}

/// Converts telemetry lines into [`DistanceVector`]s
#[derive(Debug, Clone, Default)]
pub struct RangingParser {
    mapping: TokenMapping,
}

impl RangingParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mapping: TokenMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> TokenMapping {
        self.mapping
    }

    /// All well-formed tokens on the line, in line order
    pub fn tokens(line: &str) -> impl Iterator<Item = RangingToken<'_>> {
        TOKEN_PATTERN.captures_iter(line).filter_map(|caps| {
            let address = u32::from_str_radix(caps.get(1)?.as_str(), 16).ok()?;
            Some(RangingToken {
                address,
                digits: caps.get(2)?.as_str(),
            })
        })
    }

    /// Parse one line into a distance vector in anchor order
    pub fn parse(&self, line: &str) -> Result<DistanceVector, ParseError> {
        match self.mapping {
            TokenMapping::Positional => Self::positional(line),
            TokenMapping::ByAddress(addresses) => Self::by_address(line, &addresses),
        }
    }

    fn positional(line: &str) -> Result<DistanceVector, ParseError> {
        let tokens: Vec<RangingToken<'_>> = Self::tokens(line).take(ANCHOR_COUNT).collect();
        if tokens.len() < ANCHOR_COUNT {
            return Err(ParseError::TooFewTokens {
                found: tokens.len(),
                required: ANCHOR_COUNT,
            });
        }
        let mut distances = [0u32; ANCHOR_COUNT];
        for (slot, token) in distances.iter_mut().zip(&tokens) {
            *slot = token.distance()?;
        }
        Ok(DistanceVector::new(distances))
    }

    fn by_address(line: &str, addresses: &[u32; ANCHOR_COUNT]) -> Result<DistanceVector, ParseError> {
        let tokens: Vec<RangingToken<'_>> = Self::tokens(line).collect();
        let mut distances = [0u32; ANCHOR_COUNT];
        for (slot, &address) in distances.iter_mut().zip(addresses) {
            let token = tokens
                .iter()
                .find(|t| t.address == address)
                .ok_or(ParseError::MissingAnchor { address })?;
            *slot = token.distance()?;
        }
        Ok(DistanceVector::new(distances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Anchor;

    #[test]
    fn test_parse_four_tokens() {
        let parser = RangingParser::new();
        let line = "0xAAAA: =1200 0xBBBB: =3400 0xCCCC: =5600 0xDDDD: =7800";
        let distances = parser.parse(line).unwrap();
        assert_eq!(distances.as_array(), &[1200, 3400, 5600, 7800]);
    }

    #[test]
    fn test_parse_firmware_format() {
        // Lowercase addresses with surrounding chatter, as printed by the tag
        let parser = RangingParser::new();
        let line = "[ranging] 0x1a2b: = 812 0x3c4d:=1620 0x5e6f:  =2001 0x7089: =95";
        // "= 812" has whitespace after '=', which the pattern does not accept
        assert_eq!(
            parser.parse(line),
            Err(ParseError::TooFewTokens { found: 3, required: 4 })
        );

        let line = "[ranging] 0x1a2b: =812 0x3c4d:=1620 0x5e6f:  =2001 0x7089: =95";
        assert_eq!(parser.parse(line).unwrap().as_array(), &[812, 1620, 2001, 95]);
    }

    #[test]
    fn test_three_tokens_is_malformed() {
        let parser = RangingParser::new();
        let result = parser.parse("0xAAAA: =1 0xBBBB: =2 0xCCCC: =3");
        assert_eq!(result, Err(ParseError::TooFewTokens { found: 3, required: 4 }));
        assert!(parser.parse("no ranging data = here").is_err());
        assert!(parser.parse("").is_err());
    }

    #[test]
    fn test_extra_tokens_use_first_four() {
        let parser = RangingParser::new();
        let line = "0xAAAA: =1 0xBBBB: =2 0xCCCC: =3 0xDDDD: =4 0xEEEE: =5 0xFFFF: =6";
        assert_eq!(parser.parse(line).unwrap().as_array(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_overflowing_distance_is_malformed() {
        let parser = RangingParser::new();
        let line = "0xAAAA: =99999999999 0xBBBB: =2 0xCCCC: =3 0xDDDD: =4";
        assert!(matches!(parser.parse(line), Err(ParseError::InvalidDistance { .. })));
    }

    #[test]
    fn test_unused_overflowing_token_is_ignored() {
        let parser = RangingParser::new();
        let line = "0xAAAA: =1 0xBBBB: =2 0xCCCC: =3 0xDDDD: =4 0xEEEE: =99999999999";
        assert_eq!(parser.parse(line).unwrap().as_array(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_unrelated_radio_does_not_break_address_mapping() {
        let anchors = AnchorConfiguration::new([
            Anchor::new(0.0, 0.0).with_address(0xAAAA),
            Anchor::new(1.0, 0.0).with_address(0xBBBB),
            Anchor::new(1.0, 1.0).with_address(0xCCCC),
            Anchor::new(0.0, 1.0).with_address(0xDDDD),
        ]);
        let parser = RangingParser::with_mapping(TokenMapping::for_anchors(&anchors, true));

        let line = "0x1234: =99999999999 0xAAAA: =1 0xBBBB: =2 0xCCCC: =3 0xDDDD: =4";
        assert_eq!(parser.parse(line).unwrap().as_array(), &[1, 2, 3, 4]);

        // An overflow on an anchor the mapping needs still rejects the line
        let line = "0xAAAA: =1 0xBBBB: =99999999999 0xCCCC: =3 0xDDDD: =4";
        assert!(matches!(parser.parse(line), Err(ParseError::InvalidDistance { .. })));
    }

    #[test]
    fn test_tokens_in_line_order() {
        let tokens: Vec<_> = RangingParser::tokens("x 0x1a: =5 y 0xFF:=60").collect();
        assert_eq!(
            tokens,
            vec![
                RangingToken { address: 0x1a, digits: "5" },
                RangingToken { address: 0xff, digits: "60" },
            ]
        );
    }

    #[test]
    fn test_address_mapping_is_order_independent() {
        let anchors = AnchorConfiguration::new([
            Anchor::new(0.0, 0.0).with_address(0xAAAA),
            Anchor::new(1.0, 0.0).with_address(0xBBBB),
            Anchor::new(1.0, 1.0).with_address(0xCCCC),
            Anchor::new(0.0, 1.0).with_address(0xDDDD),
        ]);
        let parser = RangingParser::with_mapping(TokenMapping::for_anchors(&anchors, true));

        let line = "0xDDDD: =4 0x1234: =99 0xBBBB: =2 0xAAAA: =1 0xCCCC: =3";
        assert_eq!(parser.parse(line).unwrap().as_array(), &[1, 2, 3, 4]);

        let line = "0xDDDD: =4 0x1234: =99 0xBBBB: =2 0xAAAA: =1";
        assert_eq!(
            parser.parse(line),
            Err(ParseError::MissingAnchor { address: 0xCCCC })
        );
    }

    #[test]
    fn test_mapping_falls_back_to_positional() {
        let anchors = AnchorConfiguration::from_points([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        assert_eq!(TokenMapping::for_anchors(&anchors, true), TokenMapping::Positional);
    }
}
