//! Tagson I/O - JSON text and file boundary
//!
//! This crate moves encapsulated trees in and out of text:
//!
//! - `stringify`/`parse` and their async forms
//! - Reader and writer helpers over `std::io`
//! - File helpers, with async versions behind the `async` feature

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use tagson_codec::{
    EncapsulateOptions, Outcome, ReviveOptions, State, SyncMode, Tagson, TypeSpec, UserState,
};
pub use tagson_format::{Deferred, Limits, Result, Shape, TagsonError, Value};

use futures::future::{FutureExt, LocalBoxFuture};
use serde::Deserialize;
use serde_json::Value as Json;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Default ceiling on the size of parsed text
pub const DEFAULT_MAX_INPUT_BYTES: usize = 256 * 1024 * 1024;

/// Options for producing text
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StringifyOptions {
    /// Indent the output
    pub pretty: bool,
    /// Encapsulation options
    pub encapsulate: EncapsulateOptions,
}

/// Options for reading text
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Reject input longer than this many bytes
    pub max_input_bytes: usize,
    /// Revival options
    pub revive: ReviveOptions,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            revive: ReviveOptions::default(),
        }
    }
}

impl ParseOptions {
    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_input_bytes {
            return Err(TagsonError::LimitExceeded(format!(
                "input of {} bytes exceeds max_input_bytes {}",
                len, self.max_input_bytes
            )));
        }
        Ok(())
    }
}

/// Encapsulate `value` and serialize it to compact JSON text
///
/// # Errors
///
/// Fails with a mode mismatch if any branch is deferred
pub fn stringify(tagson: &Tagson, value: &Value, user: Option<UserState>) -> Result<String> {
    let json = tagson.encapsulate(value, user)?;
    Ok(serde_json::to_string(&json)?)
}

/// Encapsulate `value` and serialize it to indented JSON text
pub fn stringify_pretty(
    tagson: &Tagson,
    value: &Value,
    user: Option<UserState>,
) -> Result<String> {
    let json = tagson.encapsulate(value, user)?;
    Ok(serde_json::to_string_pretty(&json)?)
}

/// Encapsulate a graph containing deferred values and serialize the result
pub fn stringify_async(
    tagson: &Tagson,
    value: &Value,
    user: Option<UserState>,
) -> LocalBoxFuture<'static, Result<String>> {
    tagson
        .encapsulate_async(value, user)
        .map(|json| json.and_then(|json| Ok(serde_json::to_string(&json)?)))
        .boxed_local()
}

/// Stringify with explicit options, in whatever shape the mode allows
pub fn stringify_with(
    tagson: &Tagson,
    value: &Value,
    state: State,
    options: &StringifyOptions,
) -> Result<Outcome<String>> {
    let pretty = options.pretty;
    tagson
        .encapsulate_with(value, state, &options.encapsulate)?
        .and_then(move |json| to_text(&json, pretty))
}

/// Parse JSON text and revive it
pub fn parse(tagson: &Tagson, text: &str, user: Option<UserState>) -> Result<Value> {
    ParseOptions::default().check_len(text.len())?;
    let json: Json = serde_json::from_str(text)?;
    tagson.revive(&json, user)
}

/// Parse JSON text and revive it with asynchronous revivers
pub fn parse_async(tagson: &Tagson, text: &str, user: Option<UserState>) -> Deferred {
    let parsed = ParseOptions::default()
        .check_len(text.len())
        .and_then(|_| Ok(serde_json::from_str::<Json>(text)?));
    match parsed {
        Ok(json) => tagson.revive_async(&json, user),
        Err(err) => Deferred::reject(err),
    }
}

/// Parse with explicit options, in whatever shape the mode allows
pub fn parse_with(
    tagson: &Tagson,
    text: &str,
    state: State,
    options: &ParseOptions,
) -> Result<Outcome<Value>> {
    options.check_len(text.len())?;
    let json: Json = serde_json::from_str(text)?;
    tagson.revive_with(&json, state, &options.revive)
}

/// Encapsulate `value` synchronously and write it to `writer`
pub fn to_writer<W: Write>(
    tagson: &Tagson,
    value: &Value,
    writer: W,
    options: &StringifyOptions,
) -> Result<()> {
    let encapsulate = EncapsulateOptions {
        mode: SyncMode::Sync,
        ..options.encapsulate.clone()
    };
    let json = match tagson.encapsulate_with(value, State::default(), &encapsulate)? {
        Outcome::Ready(json) => json,
        Outcome::Pending(_) => return Err(sync_mismatch()),
    };

    let mut writer = BufWriter::new(writer);
    if options.pretty {
        serde_json::to_writer_pretty(&mut writer, &json)?;
    } else {
        serde_json::to_writer(&mut writer, &json)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read JSON text from `reader` and revive it synchronously
pub fn from_reader<R: Read>(tagson: &Tagson, reader: R, options: &ParseOptions) -> Result<Value> {
    let mut text = String::new();
    let limit = options.max_input_bytes as u64 + 1;
    BufReader::new(reader).take(limit).read_to_string(&mut text)?;
    options.check_len(text.len())?;

    let json: Json = serde_json::from_str(&text)?;
    let revive = ReviveOptions {
        mode: SyncMode::Sync,
        ..options.revive.clone()
    };
    tagson
        .revive_with(&json, State::default(), &revive)?
        .ready()
        .ok_or_else(sync_mismatch)
}

/// Write `value` to a file at `path`
pub fn write_file(
    tagson: &Tagson,
    value: &Value,
    path: impl AsRef<Path>,
    options: &StringifyOptions,
) -> Result<()> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "writing tagson file");
    to_writer(tagson, value, File::create(path)?, options)
}

/// Read and revive a file at `path`
pub fn read_file(tagson: &Tagson, path: impl AsRef<Path>, options: &ParseOptions) -> Result<Value> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "reading tagson file");
    from_reader(tagson, File::open(path)?, options)
}

/// Write `value` to a file, awaiting any deferred branches first
#[cfg(feature = "async")]
pub async fn write_file_async(
    tagson: &Tagson,
    value: &Value,
    path: impl AsRef<Path>,
    options: &StringifyOptions,
) -> Result<()> {
    let options = StringifyOptions {
        encapsulate: EncapsulateOptions {
            mode: SyncMode::Auto,
            ..options.encapsulate.clone()
        },
        ..options.clone()
    };
    let text = stringify_with(tagson, value, State::default(), &options)?
        .into_future()
        .await?;
    tokio::fs::write(path.as_ref(), text).await?;
    Ok(())
}

/// Read and revive a file, awaiting any asynchronous revivers
#[cfg(feature = "async")]
pub async fn read_file_async(
    tagson: &Tagson,
    path: impl AsRef<Path>,
    options: &ParseOptions,
) -> Result<Value> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    let options = ParseOptions {
        revive: ReviveOptions {
            mode: SyncMode::Auto,
            ..options.revive.clone()
        },
        ..options.clone()
    };
    parse_with(tagson, &text, State::default(), &options)?
        .into_future()
        .await
}

fn sync_mismatch() -> TagsonError {
    TagsonError::ModeMismatch {
        expected: Shape::Sync,
        found: Shape::Async,
        keypath: String::new(),
    }
}

fn to_text(json: &Json, pretty: bool) -> Result<String> {
    let text = if pretty {
        serde_json::to_string_pretty(json)?
    } else {
        serde_json::to_string(json)?
    };
    Ok(text)
}
