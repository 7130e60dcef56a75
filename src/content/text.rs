//! Text extraction from content streams

use std::collections::HashMap;

use log::{trace, warn};

use crate::document::Document;
use crate::pdf::{Dictionary, Object};
use super::encoding::FontDecoder;
use super::operation::{decode_operations, Operation};

/// Text extraction settings
#[derive(Debug, Clone, PartialEq)]
pub struct TextOptions {
    /// A `TJ` adjustment more negative than this (thousandths of a text
    /// space unit) separates words
    pub word_gap: f64,
    /// Emit `\n` when text continues on a different line
    pub line_breaks: bool,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            word_gap: 250.0,
            line_breaks: true,
        }
    }
}

type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
const SAME_LINE_TOLERANCE: f64 = 0.01;

/// Text object state that matters for word and line boundaries
#[derive(Debug, Clone)]
struct TextState {
    line_matrix: Matrix,
    leading: f64,
    /// Baseline of the last text shown
    last_baseline: Option<f64>,
    /// Set by `T*`, `'` and `"`
    line_requested: bool,
}

impl TextState {
    fn new() -> Self {
        Self {
            line_matrix: IDENTITY,
            leading: 0.0,
            last_baseline: None,
            line_requested: false,
        }
    }

    /// Translate the line matrix by `(tx, ty)` in text space
    fn move_line(&mut self, tx: f64, ty: f64) {
        let m = &mut self.line_matrix;
        m[4] += tx * m[0] + ty * m[2];
        m[5] += tx * m[1] + ty * m[3];
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
        self.line_requested = true;
    }

    fn baseline(&self) -> f64 {
        self.line_matrix[5]
    }
}

/// Extracts plain text from the content of one page (or form)
pub struct TextExtractor<'a> {
    document: &'a Document,
    fonts: Option<&'a Dictionary>,
    options: TextOptions,
    decoders: HashMap<Vec<u8>, FontDecoder>,
    fallback: FontDecoder,
}

impl<'a> TextExtractor<'a> {
    /// `resources` is the page's (inherited) resource dictionary
    pub fn new(document: &'a Document, resources: Option<&'a Dictionary>, options: TextOptions) -> Self {
        let fonts = resources
            .and_then(|resources| resources.get("Font"))
            .and_then(|fonts| document.resolve_dict(fonts).ok());
        Self {
            document,
            fonts,
            options,
            decoders: HashMap::new(),
            fallback: FontDecoder::standard(),
        }
    }

    /// Extract text from decoded content bytes
    pub fn extract(&mut self, content: &[u8]) -> String {
        let operations = decode_operations(content);
        trace!("Extracting text from {} operations", operations.len());

        let mut output = String::new();
        let mut state = TextState::new();
        let mut font: Option<Vec<u8>> = None;

        for operation in &operations {
            let operands = &operation.operands;
            match operation.operator.as_str() {
                "BT" => {
                    state.line_matrix = IDENTITY;
                    state.line_requested = false;
                }
                "Tf" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        self.load_font(name);
                        font = Some(name.clone());
                    }
                }
                "TL" => {
                    if let Some(leading) = number(operands, 0) {
                        state.leading = leading;
                    }
                }
                "Td" => {
                    if let (Some(tx), Some(ty)) = (number(operands, 0), number(operands, 1)) {
                        state.move_line(tx, ty);
                    }
                }
                "TD" => {
                    if let (Some(tx), Some(ty)) = (number(operands, 0), number(operands, 1)) {
                        state.leading = -ty;
                        state.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    let values: Vec<f64> = (0..6).filter_map(|i| number(operands, i)).collect();
                    if let Ok(matrix) = <Matrix>::try_from(values.as_slice()) {
                        state.line_matrix = matrix;
                    }
                }
                "T*" => state.next_line(),
                "Tj" => self.show_string(operation, 0, &font, &mut state, &mut output),
                "'" => {
                    state.next_line();
                    self.show_string(operation, 0, &font, &mut state, &mut output);
                }
                "\"" => {
                    state.next_line();
                    self.show_string(operation, 2, &font, &mut state, &mut output);
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        self.begin_show(&mut state, &mut output);
                        for item in items {
                            match item {
                                Object::String(bytes, _) => output.push_str(&self.decode(&font, bytes)),
                                Object::Integer(_) | Object::Real(_) => {
                                    let adjustment = item.as_f64().unwrap_or(0.0);
                                    if adjustment < -self.options.word_gap
                                        && !output.is_empty()
                                        && !output.ends_with(char::is_whitespace)
                                    {
                                        output.push(' ');
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        output
    }

    fn show_string(
        &self,
        operation: &Operation,
        index: usize,
        font: &Option<Vec<u8>>,
        state: &mut TextState,
        output: &mut String,
    ) {
        if let Some(Object::String(bytes, _)) = operation.operands.get(index) {
            self.begin_show(state, output);
            output.push_str(&self.decode(font, bytes));
        }
    }

    /// Break the line when text resumes on a different baseline
    fn begin_show(&self, state: &mut TextState, output: &mut String) {
        let baseline = state.baseline();
        let moved = state
            .last_baseline
            .is_some_and(|last| (last - baseline).abs() > SAME_LINE_TOLERANCE);
        if self.options.line_breaks
            && (moved || state.line_requested)
            && !output.is_empty()
            && !output.ends_with('\n')
        {
            output.push('\n');
        }
        state.last_baseline = Some(baseline);
        state.line_requested = false;
    }

    fn load_font(&mut self, name: &[u8]) {
        if self.decoders.contains_key(name) {
            return;
        }
        let font = self
            .fonts
            .and_then(|fonts| fonts.get(name))
            .and_then(|font| self.document.resolve_dict(font).ok());
        let decoder = match font {
            Some(font) => FontDecoder::from_font(self.document, font),
            None => {
                warn!("Font /{} not found in page resources", String::from_utf8_lossy(name));
                FontDecoder::standard()
            }
        };
        self.decoders.insert(name.to_vec(), decoder);
    }

    fn decode(&self, font: &Option<Vec<u8>>, bytes: &[u8]) -> String {
        font.as_ref()
            .and_then(|name| self.decoders.get(name))
            .unwrap_or(&self.fallback)
            .decode(bytes)
    }
}

fn number(operands: &[Object], index: usize) -> Option<f64> {
    operands.get(index).and_then(|operand| operand.as_f64().ok())
}
