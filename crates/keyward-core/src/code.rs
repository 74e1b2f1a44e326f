// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code signatures and the requirement language used to constrain them.
//!
//! A requirement is a small boolean expression over the attributes of a
//! verified code signature:
//!
//! ```text
//! expr    := term ("or" term)*
//! term    := factor ("and" factor)*
//! factor  := "!" factor | "(" expr ")" | atom
//! atom    := "always" | "never"
//!          | "anchor" ("vendor" | HEX64)
//!          | "identifier" STRING
//!          | "group" STRING
//!          | "cdhash" HEX64
//! ```
//!
//! Requirements serialize as their canonical text so ACL sections stay readable.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::KeywardError;

/// Deepest expression tree a requirement may parse into.
pub const MAX_REQUIREMENT_DEPTH: usize = 32;

/// A signature over a program's code digest, as reported for a requesting process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSignature {
    /// Signing identifier, e.g. `com.example.mail`.
    pub identifier: String,
    /// Vendor group the signer placed the program in.
    pub group: Option<String>,
    /// Ed25519 public key of the signer (the anchor).
    pub signer: [u8; 32],
    /// Digest of the signed code.
    pub code_digest: [u8; 32],
    /// Ed25519 signature over [`CodeSignature::signed_payload`].
    pub signature: [u8; 64],
}

impl CodeSignature {
    /// Bytes covered by the signature: digest, identifier and group, length-prefixed.
    pub fn signed_payload(identifier: &str, group: Option<&str>, code_digest: &[u8; 32]) -> Vec<u8> {
        let group = group.unwrap_or("");
        let mut payload = Vec::with_capacity(32 + 8 + identifier.len() + group.len());
        payload.extend_from_slice(code_digest);
        payload.extend_from_slice(&(identifier.len() as u32).to_be_bytes());
        payload.extend_from_slice(identifier.as_bytes());
        payload.extend_from_slice(&(group.len() as u32).to_be_bytes());
        payload.extend_from_slice(group.as_bytes());
        payload
    }

    /// Sign a code digest. Used by packaging tools and tests.
    pub fn sign(
        key: &SigningKey,
        identifier: impl Into<String>,
        group: Option<String>,
        code_digest: [u8; 32],
    ) -> Self {
        let identifier = identifier.into();
        let payload = Self::signed_payload(&identifier, group.as_deref(), &code_digest);
        let signature = key.sign(&payload).to_bytes();
        Self {
            identifier,
            group,
            signer: key.verifying_key().to_bytes(),
            code_digest,
            signature,
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        Self::signed_payload(&self.identifier, self.group.as_deref(), &self.code_digest)
    }
}

/// Outcome of checking a code signature against a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Accept,
    /// The process carries no signature at all.
    RejectUnsigned,
    /// Invalid signature, or a valid one that does not satisfy the requirement.
    RejectOther,
}

/// A parsed code requirement expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Always,
    Never,
    /// Signed by the configured vendor anchor key.
    VendorAnchor,
    /// Signed by this exact key.
    Anchor([u8; 32]),
    Identifier(String),
    Group(String),
    CodeDigest([u8; 32]),
    Not(Box<Requirement>),
    And(Box<Requirement>, Box<Requirement>),
    Or(Box<Requirement>, Box<Requirement>),
}

impl Requirement {
    pub fn parse(text: &str) -> Result<Self, KeywardError> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            nesting: 0,
        };
        let (req, _) = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(invalid(format!(
                "unexpected trailing input in requirement `{text}`"
            )));
        }
        Ok(req)
    }

    pub fn and(self, other: Requirement) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Requirement) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// The requirement "this identifier, signed by this signer".
    pub fn designated(signature: &CodeSignature) -> Self {
        Self::Identifier(signature.identifier.clone()).and(Self::Anchor(signature.signer))
    }

    /// Evaluate against an already verified signature.
    pub fn evaluate(&self, signature: &CodeSignature, vendor_anchor: Option<&[u8; 32]>) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::VendorAnchor => vendor_anchor.is_some_and(|key| *key == signature.signer),
            Self::Anchor(key) => *key == signature.signer,
            Self::Identifier(id) => *id == signature.identifier,
            Self::Group(group) => signature.group.as_deref() == Some(group.as_str()),
            Self::CodeDigest(digest) => *digest == signature.code_digest,
            Self::Not(inner) => !inner.evaluate(signature, vendor_anchor),
            Self::And(a, b) => {
                a.evaluate(signature, vendor_anchor) && b.evaluate(signature, vendor_anchor)
            }
            Self::Or(a, b) => {
                a.evaluate(signature, vendor_anchor) || b.evaluate(signature, vendor_anchor)
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Or(..) => 0,
            Self::And(..) => 1,
            _ => 2,
        }
    }

    fn write_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::Never => f.write_str("never"),
            Self::VendorAnchor => f.write_str("anchor vendor"),
            Self::Anchor(key) => write!(f, "anchor {}", hex::encode(key)),
            Self::Identifier(id) => write!(f, "identifier {}", quote(id)),
            Self::Group(group) => write!(f, "group {}", quote(group)),
            Self::CodeDigest(digest) => write!(f, "cdhash {}", hex::encode(digest)),
            Self::Not(inner) => {
                f.write_str("!")?;
                inner.write_operand(f, 2)
            }
            Self::And(a, b) => {
                a.write_operand(f, 1)?;
                f.write_str(" and ")?;
                b.write_operand(f, 2)
            }
            Self::Or(a, b) => {
                a.write_operand(f, 0)?;
                f.write_str(" or ")?;
                b.write_operand(f, 1)
            }
        }
    }
}

impl FromStr for Requirement {
    type Err = KeywardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Requirement::parse(&text).map_err(serde::de::Error::custom)
    }
}

fn invalid(message: String) -> KeywardError {
    KeywardError::InvalidAclSubjectValue(message)
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Str(String),
    Open,
    Close,
    Bang,
}

fn tokenize(text: &str) -> Result<Vec<Token>, KeywardError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Bang);
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => s.push(escaped),
                            None => return Err(invalid("dangling escape in requirement".into())),
                        },
                        Some(other) => s.push(other),
                        None => return Err(invalid("unterminated string in requirement".into())),
                    }
                }
                tokens.push(Token::Str(s));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '!' | '"') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    if tokens.is_empty() {
        return Err(invalid("empty requirement".into()));
    }
    Ok(tokens)
}

/// A parsed subexpression and the depth of its tree.
type Parsed = (Requirement, usize);

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open `!` and `(` frames on the parser's own stack.
    nesting: usize,
}

fn bounded(depth: usize) -> Result<usize, KeywardError> {
    if depth > MAX_REQUIREMENT_DEPTH {
        return Err(invalid(format!(
            "requirement nests deeper than {MAX_REQUIREMENT_DEPTH} levels"
        )));
    }
    Ok(depth)
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::Word(w)) if w == word)
    }

    fn descend(&mut self) -> Result<(), KeywardError> {
        self.nesting += 1;
        bounded(self.nesting).map(drop)
    }

    fn expr(&mut self) -> Result<Parsed, KeywardError> {
        let (mut lhs, mut depth) = self.term()?;
        while self.peek_word("or") {
            self.pos += 1;
            let (rhs, rhs_depth) = self.term()?;
            depth = bounded(depth.max(rhs_depth) + 1)?;
            lhs = lhs.or(rhs);
        }
        Ok((lhs, depth))
    }

    fn term(&mut self) -> Result<Parsed, KeywardError> {
        let (mut lhs, mut depth) = self.factor()?;
        while self.peek_word("and") {
            self.pos += 1;
            let (rhs, rhs_depth) = self.factor()?;
            depth = bounded(depth.max(rhs_depth) + 1)?;
            lhs = lhs.and(rhs);
        }
        Ok((lhs, depth))
    }

    fn factor(&mut self) -> Result<Parsed, KeywardError> {
        match self.next() {
            Some(Token::Bang) => {
                self.descend()?;
                let (inner, depth) = self.factor()?;
                self.nesting -= 1;
                Ok((Requirement::Not(Box::new(inner)), bounded(depth + 1)?))
            }
            Some(Token::Open) => {
                self.descend()?;
                let inner = self.expr()?;
                self.nesting -= 1;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(invalid("missing `)` in requirement".into())),
                }
            }
            Some(Token::Word(word)) => Ok((self.atom(&word)?, 1)),
            other => Err(invalid(format!("unexpected token {other:?} in requirement"))),
        }
    }

    fn atom(&mut self, word: &str) -> Result<Requirement, KeywardError> {
        match word {
            "always" => Ok(Requirement::Always),
            "never" => Ok(Requirement::Never),
            "anchor" => match self.next() {
                Some(Token::Word(w)) if w == "vendor" => Ok(Requirement::VendorAnchor),
                Some(Token::Word(w)) => Ok(Requirement::Anchor(parse_hex32(&w)?)),
                _ => Err(invalid("`anchor` expects `vendor` or a hex key".into())),
            },
            "identifier" => Ok(Requirement::Identifier(self.string("identifier")?)),
            "group" => Ok(Requirement::Group(self.string("group")?)),
            "cdhash" => match self.next() {
                Some(Token::Word(w)) => Ok(Requirement::CodeDigest(parse_hex32(&w)?)),
                _ => Err(invalid("`cdhash` expects a hex digest".into())),
            },
            other => Err(invalid(format!("unknown requirement keyword `{other}`"))),
        }
    }

    fn string(&mut self, keyword: &str) -> Result<String, KeywardError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            _ => Err(invalid(format!("`{keyword}` expects a quoted string"))),
        }
    }
}

fn parse_hex32(text: &str) -> Result<[u8; 32], KeywardError> {
    let bytes = hex::decode(text).map_err(|e| invalid(format!("bad hex `{text}`: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| invalid(format!("expected 32 bytes of hex, got `{text}`")))
}
