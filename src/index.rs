//! Active index naming and lifecycle.
//!
//! An [`IndexDescriptor`] turns a base name and rotation policy into the
//! index identifier for a given instant. The [`IndexManager`] remembers
//! which identifier has been confirmed on the backend so the existence
//! check runs once per identifier rather than once per flush.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::backend::IndexBackend;
use crate::error::ShipperError;
use crate::schema::IndexSchema;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DatePatternError {
    #[error("unsupported date pattern token `{0}`")]
    UnsupportedToken(String),

    #[error("unterminated quoted literal in date pattern")]
    UnterminatedQuote,
}

/// Date pattern in the `yyyyMMdd` style, translated once to a chrono
/// `strftime` string and applied to UTC instants.
///
/// Supported tokens: `yyyy`/`YYYY` (also `y`, `yyy`), `yy`, `MM`, `M`,
/// `dd`/`DD`, `d`/`D`, `HH`, `H`, `mm`, `m`, `ss`, `s`. Text between single
/// quotes is copied verbatim (`''` is a literal quote); any other non-letter
/// character is copied as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePattern {
    raw: String,
    strftime: String,
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

impl DatePattern {
    pub fn parse(pattern: &str) -> Result<Self, DatePatternError> {
        let chars: Vec<char> = pattern.chars().collect();
        let mut strftime = String::with_capacity(pattern.len() * 2);
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if c == '\'' {
                if chars.get(i + 1) == Some(&'\'') {
                    strftime.push('\'');
                    i += 2;
                    continue;
                }
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err(DatePatternError::UnterminatedQuote),
                        Some('\'') if chars.get(j + 1) == Some(&'\'') => {
                            strftime.push('\'');
                            j += 2;
                        }
                        Some('\'') => break,
                        Some(ch) => {
                            push_literal(&mut strftime, *ch);
                            j += 1;
                        }
                    }
                }
                i = j + 1;
                continue;
            }

            if !c.is_ascii_alphabetic() {
                push_literal(&mut strftime, c);
                i += 1;
                continue;
            }

            let run = chars[i..].iter().take_while(|&&ch| ch == c).count();
            let spec = match (c, run) {
                ('y' | 'Y', 2) => "%y",
                ('y' | 'Y', _) => "%Y",
                ('M', 1) => "%-m",
                ('M', 2) => "%m",
                ('d' | 'D', 1) => "%-d",
                ('d' | 'D', 2) => "%d",
                ('H', 1) => "%-H",
                ('H', 2) => "%H",
                ('m', 1) => "%-M",
                ('m', 2) => "%M",
                ('s', 1) => "%-S",
                ('s', 2) => "%S",
                _ => {
                    return Err(DatePatternError::UnsupportedToken(
                        std::iter::repeat(c).take(run).collect(),
                    ))
                }
            };
            strftime.push_str(spec);
            i += run;
        }

        Ok(DatePattern {
            raw: pattern.to_string(),
            strftime,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn format(&self, at: DateTime<Utc>) -> String {
        at.format(&self.strftime).to_string()
    }
}

/// Whether and how the index name follows the calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rotation {
    Off,
    Daily(DatePattern),
}

/// Base name plus rotation policy; resolves to an index identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub base_name: String,
    pub rotation: Rotation,
}

impl IndexDescriptor {
    pub fn fixed(base_name: impl Into<String>) -> Self {
        IndexDescriptor {
            base_name: base_name.into(),
            rotation: Rotation::Off,
        }
    }

    pub fn daily(base_name: impl Into<String>, pattern: DatePattern) -> Self {
        IndexDescriptor {
            base_name: base_name.into(),
            rotation: Rotation::Daily(pattern),
        }
    }

    /// Index identifier in effect at `at`. Pure in its inputs.
    pub fn resolve_at(&self, at: DateTime<Utc>) -> String {
        match &self.rotation {
            Rotation::Off => self.base_name.clone(),
            Rotation::Daily(pattern) => format!("{}-{}", self.base_name, pattern.format(at)),
        }
    }
}

/// Characters the search backend refuses in index names.
const FORBIDDEN_INDEX_CHARS: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':'];

/// Check `name` against the backend's index naming rules: lowercase, none
/// of [`FORBIDDEN_INDEX_CHARS`], no leading `-`, `_` or `+`, not `.` or
/// `..`, at most 255 bytes.
pub fn check_index_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("index name is empty".to_string());
    }
    if name.chars().any(|c| c.is_uppercase()) {
        return Err(format!("index name must be lowercase: {}", name));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_INDEX_CHARS.contains(c)) {
        return Err(format!("index name {:?} contains forbidden character {:?}", name, c));
    }
    if name.starts_with(['-', '_', '+']) || name == "." || name == ".." {
        return Err(format!("index name {:?} has an illegal prefix", name));
    }
    if name.len() > 255 {
        return Err(format!("index name is longer than 255 bytes: {}", name));
    }
    Ok(())
}

/// Resolves the active index and makes sure it exists before writes.
pub struct IndexManager {
    descriptor: IndexDescriptor,
    schema: &'static IndexSchema,
    confirmed: Mutex<Option<String>>,
}

impl IndexManager {
    pub fn new(descriptor: IndexDescriptor, schema: &'static IndexSchema) -> Self {
        IndexManager {
            descriptor,
            schema,
            confirmed: Mutex::new(None),
        }
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    pub fn schema(&self) -> &'static IndexSchema {
        self.schema
    }

    /// Index identifier for the current UTC instant. Call on every flush;
    /// the day may have rolled over since the previous one.
    pub fn resolve_current_index_name(&self) -> String {
        self.descriptor.resolve_at(Utc::now())
    }

    /// Last identifier confirmed present on the backend.
    pub fn confirmed_index(&self) -> Option<String> {
        self.confirmed.lock().clone()
    }

    /// Forget the confirmed identifier so the next call checks again.
    pub fn reset(&self) {
        *self.confirmed.lock() = None;
    }

    /// Make sure `index` exists with the log schema.
    ///
    /// Skips the backend entirely when `force` is false and `index` is the
    /// confirmed identifier. On failure the confirmed identifier is left as
    /// it was so the next cycle retries.
    pub async fn ensure_index_ready(
        &self,
        backend: &dyn IndexBackend,
        index: &str,
        force: bool,
    ) -> Result<(), ShipperError> {
        if !force && self.confirmed.lock().as_deref() == Some(index) {
            return Ok(());
        }

        let creation_error = |e: crate::backend::BackendError| ShipperError::IndexCreation {
            index: index.to_string(),
            reason: e.to_string(),
        };

        let exists = backend.index_exists(index).await.map_err(creation_error)?;
        if !exists {
            backend
                .create_index(index, self.schema)
                .await
                .map_err(creation_error)?;
            tracing::info!(index = %index, schema_version = self.schema.version, "created log index");
        }

        *self.confirmed.lock() = Some(index.to_string());
        Ok(())
    }
}
