// viamime – implementation of the MIME security multiparts
// Copyright © 2022–2023 David Bürgin <dbuergin@gluet.ch>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! Canonicalization utilities.
//!
//! Canonicalization is performed by chaining streaming byte filters. Each
//! filter may be fed input in chunks of arbitrary size; bytes whose fate
//! depends on what follows are held back until the next chunk or until the
//! filter is flushed.
//!
//! Before signing, content passes through [`FromEscapeFilter`],
//! [`TrailingWhitespaceFilter`], and [`CrlfFilter`], in that order (RFC 3156,
//! section 5). Before encryption, trailing whitespace is left alone.

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// A streaming byte filter.
pub trait Filter {
    /// Filters a chunk of input, returning the output available so far.
    fn filter(&mut self, input: &[u8]) -> Vec<u8>;

    /// Signals end of input, returning any output still held back. The filter
    /// is reset and may be reused.
    fn flush(&mut self) -> Vec<u8>;
}

const FROM: &[u8] = b"From ";

/// A filter that armors lines beginning with `From `.
///
/// The initial `F` is written as `=46`, the Quoted-Printable encoding of `F`.
/// Mail transports may otherwise rewrite such lines as `>From `.
pub struct FromEscapeFilter {
    // number of bytes of "From " matched at the beginning of the current
    // line, or None when past the beginning
    matched: Option<usize>,
}

impl FromEscapeFilter {
    pub fn new() -> Self {
        Self { matched: Some(0) }
    }
}

impl Default for FromEscapeFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for FromEscapeFilter {
    fn filter(&mut self, input: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(input.len() + 2);

        for &b in input {
            match self.matched {
                Some(n) if b == FROM[n] => {
                    if n + 1 == FROM.len() {
                        result.extend(b"=46rom ");
                        self.matched = None;
                    } else {
                        self.matched = Some(n + 1);
                    }
                }
                Some(n) => {
                    result.extend(&FROM[..n]);
                    result.push(b);
                    self.matched = if b == LF { Some(0) } else { None };
                }
                None => {
                    result.push(b);
                    if b == LF {
                        self.matched = Some(0);
                    }
                }
            }
        }

        result
    }

    fn flush(&mut self) -> Vec<u8> {
        let result = match self.matched {
            Some(n) => FROM[..n].to_vec(),
            None => vec![],
        };
        self.matched = Some(0);
        result
    }
}

/// A filter that removes spaces and tabs at the end of every line.
///
/// Both CRLF and bare LF end a line. Whitespace at the end of input is
/// removed, too.
#[derive(Default)]
pub struct TrailingWhitespaceFilter {
    // run of whitespace held back, possibly followed by a CR
    wsp: Vec<u8>,
    cr: bool,
}

impl TrailingWhitespaceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn release(&mut self, result: &mut Vec<u8>) {
        result.append(&mut self.wsp);
        if self.cr {
            result.push(CR);
            self.cr = false;
        }
    }
}

impl Filter for TrailingWhitespaceFilter {
    fn filter(&mut self, input: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(input.len());

        for &b in input {
            match b {
                b' ' | b'\t' => {
                    if self.cr {
                        self.release(&mut result);
                    }
                    self.wsp.push(b);
                }
                CR => {
                    if self.cr {
                        self.release(&mut result);
                    }
                    self.cr = true;
                }
                LF => {
                    self.wsp.clear();
                    if self.cr {
                        result.push(CR);
                        self.cr = false;
                    }
                    result.push(LF);
                }
                b => {
                    self.release(&mut result);
                    result.push(b);
                }
            }
        }

        result
    }

    fn flush(&mut self) -> Vec<u8> {
        self.wsp.clear();
        if self.cr {
            self.cr = false;
            vec![CR]
        } else {
            vec![]
        }
    }
}

/// A filter that converts bare LF line endings to CRLF.
#[derive(Default)]
pub struct CrlfFilter {
    last_cr: bool,
}

impl CrlfFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for CrlfFilter {
    fn filter(&mut self, input: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(input.len() + input.len() / 16);

        for &b in input {
            if b == LF && !self.last_cr {
                result.push(CR);
            }
            result.push(b);
            self.last_cr = b == CR;
        }

        result
    }

    fn flush(&mut self) -> Vec<u8> {
        self.last_cr = false;
        vec![]
    }
}

/// An ordered chain of filters. Output of each filter is input to the next.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter + Send>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chain applied to content before signing.
    pub fn signing() -> Self {
        Self::new()
            .with(FromEscapeFilter::new())
            .with(TrailingWhitespaceFilter::new())
            .with(CrlfFilter::new())
    }

    /// The chain applied to content before encryption.
    pub fn encryption() -> Self {
        Self::new()
            .with(FromEscapeFilter::new())
            .with(CrlfFilter::new())
    }

    pub fn with(mut self, filter: impl Filter + Send + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Runs a complete input through the chain and flushes it.
    pub fn apply(&mut self, input: &[u8]) -> Vec<u8> {
        let mut result = self.filter(input);
        result.extend(self.flush());
        result
    }
}

impl Filter for FilterChain {
    fn filter(&mut self, input: &[u8]) -> Vec<u8> {
        let mut filters = self.filters.iter_mut();
        let mut result = match filters.next() {
            Some(f) => f.filter(input),
            None => return input.to_vec(),
        };
        for f in filters {
            result = f.filter(&result);
        }
        result
    }

    fn flush(&mut self) -> Vec<u8> {
        let mut carried = vec![];
        for f in &mut self.filters {
            let mut result = f.filter(&carried);
            result.extend(f.flush());
            carried = result;
        }
        carried
    }
}

/// Canonicalizes serialized content for signing.
pub fn canonicalize_for_signing(content: &[u8]) -> Vec<u8> {
    FilterChain::signing().apply(content)
}

/// Canonicalizes serialized content for encryption.
pub fn canonicalize_for_encryption(content: &[u8]) -> Vec<u8> {
    FilterChain::encryption().apply(content)
}
