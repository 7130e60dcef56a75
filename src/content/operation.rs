//! Content stream operations

use std::fmt;

use log::{trace, warn};

use crate::pdf::{is_whitespace, Object, ObjectParser, Token};

/// An operator with the operands read before it
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operator: String,
    pub operands: Vec<Object>,
}

impl Operation {
    pub fn new(operator: impl Into<String>, operands: Vec<Object>) -> Self {
        Self {
            operator: operator.into(),
            operands,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.operator)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", operand)?;
        }
        write!(f, ")")
    }
}

/// Split a decoded content stream into operations
///
/// Decoding never fails. Malformed tokens are skipped, operands left
/// without an operator at the end are dropped, and inline image data
/// (`BI ... ID <bytes> EI`) is stepped over.
pub fn decode_operations(data: &[u8]) -> Vec<Operation> {
    let mut parser = ObjectParser::new(data);
    let mut operations = Vec::new();
    let mut operands = Vec::new();

    loop {
        let before = parser.position();
        let token = match parser.lexer_mut().next_token() {
            Ok(Some(token)) => token,
            Ok(None) => break,
            Err(e) => {
                warn!("Skipping malformed content at offset {}: {}", before, e);
                skip_past(&mut parser, before);
                operands.clear();
                continue;
            }
        };

        match token {
            Token::Keyword(keyword) if !matches!(keyword.as_slice(), b"true" | b"false" | b"null") => {
                if keyword == b"BI" {
                    skip_inline_image(&mut parser);
                    operands.clear();
                    continue;
                }
                operations.push(Operation::new(
                    String::from_utf8_lossy(&keyword),
                    std::mem::take(&mut operands),
                ));
            }
            token => match parser.parse_with_token(token) {
                Ok(operand) => operands.push(operand),
                Err(e) => {
                    warn!("Skipping malformed operand at offset {}: {}", before, e);
                    skip_past(&mut parser, before);
                    operands.clear();
                }
            },
        }
    }

    if !operands.is_empty() {
        trace!("Dropping {} trailing operands without operator", operands.len());
    }
    operations
}

fn skip_past(parser: &mut ObjectParser, before: usize) {
    if parser.position() <= before {
        parser.lexer_mut().set_position(before + 1);
    }
}

/// Position the parser after the `EI` that ends inline image data
fn skip_inline_image(parser: &mut ObjectParser) {
    let lexer = parser.lexer_mut();
    loop {
        match lexer.next_token() {
            Ok(Some(token)) if token.is_keyword(b"ID") => break,
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(_) => {
                let pos = lexer.position();
                lexer.set_position(pos + 1);
            }
        }
    }

    let data = lexer.data();
    // One whitespace byte separates ID from the image data
    let mut pos = lexer.position() + 1;
    while pos + 1 < data.len() {
        let ends_here = &data[pos..pos + 2] == b"EI"
            && pos > 0
            && is_whitespace(data[pos - 1])
            && data.get(pos + 2).map_or(true, |&b| is_whitespace(b));
        if ends_here {
            lexer.set_position(pos + 2);
            return;
        }
        pos += 1;
    }
    warn!("Inline image without EI");
    lexer.set_position(data.len());
}
