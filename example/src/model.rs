// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Data types for the notes service.

use derive_getters::Getters;
use derive_more::Display;
use iii_iv_core::model::{ModelError, ModelResult, Username};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;

/// Maximum length of a note identifier.
const MAX_NOTE_ID_LENGTH: usize = 64;

/// Maximum length of the text of a note, in bytes.
pub(crate) const MAX_NOTE_TEXT_LENGTH: usize = 64 * 1024;

/// Maximum length of a hashtag.  Longer hashtags are not indexed.
const MAX_HASHTAG_LENGTH: usize = 64;

/// Returns true if `ch` can be part of a note identifier or of a hashtag.
fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

/// Client-chosen identifier of a note.
#[derive(Clone, Debug, Deserialize, Display, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "String", into = "String")]
pub(crate) struct NoteId(String);

impl NoteId {
    /// Creates a new identifier from an untrusted string `s`, making sure it is valid.
    pub(crate) fn new<S: Into<String>>(s: S) -> ModelResult<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(ModelError("Note id cannot be empty".to_owned()));
        }
        if s.len() > MAX_NOTE_ID_LENGTH {
            return Err(ModelError("Note id is too long".to_owned()));
        }
        if let Some(ch) = s.chars().find(|ch| !is_word_char(*ch)) {
            return Err(ModelError(format!("Unsupported character '{}' in note id '{}'", ch, s)));
        }
        Ok(Self(s))
    }

    /// Returns a string view of the identifier.
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NoteId {
    type Error = ModelError;

    fn try_from(value: String) -> ModelResult<Self> {
        Self::new(value)
    }
}

impl From<NoteId> for String {
    fn from(value: NoteId) -> Self {
        value.0
    }
}

#[cfg(test)]
impl From<&'static str> for NoteId {
    fn from(value: &'static str) -> Self {
        Self::new(value).expect("Hardcoded note ids must be valid")
    }
}

/// A note as stored by the service.
#[derive(Clone, Debug, Getters, PartialEq)]
pub(crate) struct Note {
    /// Identifier of the note.
    id: NoteId,

    /// User that created the note.
    owner: Username,

    /// Free-form contents of the note, possibly with hashtags.
    text: String,

    /// Last time the note was written.
    updated: OffsetDateTime,
}

impl Note {
    /// Creates a new note, validating that the `text` is not too long.
    pub(crate) fn new(
        id: NoteId,
        owner: Username,
        text: String,
        updated: OffsetDateTime,
    ) -> ModelResult<Self> {
        if text.len() > MAX_NOTE_TEXT_LENGTH {
            return Err(ModelError(format!(
                "Note text is too long ({} > {} bytes)",
                text.len(),
                MAX_NOTE_TEXT_LENGTH
            )));
        }
        Ok(Self { id, owner, text, updated })
    }
}

/// Extracts the set of hashtags in `text`, lowercased and without their leading `#`.
///
/// A hashtag is a `#` that does not follow a word character, followed by one or more ASCII
/// letters, digits, underscores or dashes.
pub(crate) fn extract_hashtags(text: &str) -> BTreeSet<String> {
    let mut hashtags = BTreeSet::new();
    let mut prev: Option<char> = None;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '#' || prev.is_some_and(is_word_char) {
            prev = Some(ch);
            continue;
        }

        let mut hashtag = String::new();
        while let Some(next) = chars.next_if(|c| is_word_char(*c)) {
            hashtag.push(next.to_ascii_lowercase());
        }
        prev = Some(hashtag.chars().last().unwrap_or(ch));
        if !hashtag.is_empty() && hashtag.len() <= MAX_HASHTAG_LENGTH {
            hashtags.insert(hashtag);
        }
    }
    hashtags
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_note_id_ok() {
        assert_eq!("abc", NoteId::new("abc").unwrap().as_str());
        assert_eq!("a-b_C9", NoteId::new("a-b_C9").unwrap().as_str());
        NoteId::new("x".repeat(MAX_NOTE_ID_LENGTH)).unwrap();
    }

    #[test]
    fn test_note_id_error() {
        assert_eq!(ModelError("Note id cannot be empty".to_owned()), NoteId::new("").unwrap_err());
        assert_eq!(
            ModelError("Note id is too long".to_owned()),
            NoteId::new("x".repeat(MAX_NOTE_ID_LENGTH + 1)).unwrap_err()
        );
        assert_eq!(
            ModelError("Unsupported character '/' in note id 'a/b'".to_owned()),
            NoteId::new("a/b").unwrap_err()
        );
    }

    #[test]
    fn test_note_id_serde() {
        let id: NoteId = serde_json::from_str("\"the-id\"").unwrap();
        assert_eq!(NoteId::from("the-id"), id);
        assert!(serde_json::from_str::<NoteId>("\"bad id\"").is_err());
    }

    #[test]
    fn test_note_text_too_long() {
        let owner = Username::new("user").unwrap();
        let updated = datetime!(2023-06-01 10:00:00 UTC);
        let text = "a".repeat(MAX_NOTE_TEXT_LENGTH);
        Note::new(NoteId::from("n"), owner.clone(), text, updated).unwrap();

        let text = "a".repeat(MAX_NOTE_TEXT_LENGTH + 1);
        let err = Note::new(NoteId::from("n"), owner, text, updated).unwrap_err();
        assert!(err.0.contains("too long"));
    }

    #[test]
    fn test_extract_hashtags_none() {
        assert!(extract_hashtags("").is_empty());
        assert!(extract_hashtags("no tags here").is_empty());
        assert!(extract_hashtags("# just a heading").is_empty());
    }

    #[test]
    fn test_extract_hashtags_some() {
        let exp: BTreeSet<String> =
            ["first", "second-one", "third_3"].into_iter().map(str::to_owned).collect();
        assert_eq!(exp, extract_hashtags("#first and #Second-One, then (#third_3)."));
    }

    #[test]
    fn test_extract_hashtags_dedup_and_lowercase() {
        let exp: BTreeSet<String> = ["rust"].into_iter().map(str::to_owned).collect();
        assert_eq!(exp, extract_hashtags("#rust #Rust #RUST"));
    }

    #[test]
    fn test_extract_hashtags_ignores_mid_word() {
        let exp: BTreeSet<String> = ["real"].into_iter().map(str::to_owned).collect();
        assert_eq!(exp, extract_hashtags("issue#123 is not a tag but #real is"));
    }

    #[test]
    fn test_extract_hashtags_too_long() {
        let text = format!("#{} #ok", "x".repeat(MAX_HASHTAG_LENGTH + 1));
        let exp: BTreeSet<String> = ["ok"].into_iter().map(str::to_owned).collect();
        assert_eq!(exp, extract_hashtags(&text));
    }
}
