//! Path and URL interpolation
//!
//! Replaces `:placeholder` tokens in path templates and default URLs.
//! Longer placeholders are replaced first so `:id_partition` is not
//! consumed by `:id`, and `:class_:filename` resolves both tokens.
//! Placeholders without a value are left as written.

use clip_core::inflector::pluralize;
use clip_core::Record;

/// Recognised placeholders, longest first
const PLACEHOLDERS: [&str; 9] = [
    "id_partition",
    "attachment",
    "param_key",
    "extension",
    "basename",
    "filename",
    "class",
    "style",
    "id",
];

/// Characters replaced with `_` in uploaded filenames
const RESTRICTED_CHARACTERS: &[char] = &[
    '&', '$', '+', ',', '/', ':', ';', '=', '?', '@', '<', '>', '[', ']', '{', '}', '|', '\\',
    '^', '~', '%', '#',
];

/// Make an uploaded filename safe for use as a storage key
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_whitespace() || RESTRICTED_CHARACTERS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Split `photo.jpg` into `("photo", Some("jpg"))`.
///
/// The extension is everything after the last dot, provided it is non-empty
/// and alphanumeric. Dotfiles (`.env`) and names ending in a dot have none.
pub fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => {
            let ext = &filename[idx + 1..];
            if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                (&filename[..idx], Some(ext))
            } else {
                (filename, None)
            }
        }
        _ => (filename, None),
    }
}

/// `42` -> `000/000/042`
fn id_partition(id: i64) -> String {
    let padded = format!("{:09}", id);
    let chars: Vec<char> = padded.chars().collect();
    chars
        .chunks(3)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("/")
}

/// Interpolation context for one attachment of one record
pub struct Interpolator<'a> {
    record: &'a dyn Record,
    attachment: &'a str,
    filename: Option<&'a str>,
}

impl<'a> Interpolator<'a> {
    pub fn new(record: &'a dyn Record, attachment: &'a str, filename: Option<&'a str>) -> Self {
        Self {
            record,
            attachment,
            filename,
        }
    }

    pub fn interpolate(&self, pattern: &str, style: &str) -> String {
        let mut result = pattern.to_string();
        for key in PLACEHOLDERS {
            let token = format!(":{}", key);
            if !result.contains(&token) {
                continue;
            }
            if let Some(value) = self.value(key, style) {
                result = result.replace(&token, &value);
            }
        }
        result
    }

    fn value(&self, key: &str, style: &str) -> Option<String> {
        match key {
            "style" => Some(style.to_string()),
            "attachment" => Some(pluralize(self.attachment)),
            "id" => self.record.id().map(|id| id.to_string()),
            "id_partition" => self.record.id().map(id_partition),
            "class" => Some(self.record.table_name()),
            "param_key" => Some(self.record.param_key()),
            "filename" => self.filename.map(str::to_string),
            "basename" => self.filename.map(|f| split_extension(f).0.to_string()),
            "extension" => self
                .filename
                .and_then(|f| split_extension(f).1)
                .map(str::to_string),
            _ => None,
        }
    }
}
