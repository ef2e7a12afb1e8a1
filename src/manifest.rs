//! Text-level edits of a decoded `AndroidManifest.xml`.

use crate::error::Result;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const APPLICATION_TAG: &str = "<application";
const MANIFEST_CLOSE: &str = "</manifest>";
const FALLBACK_PACKAGE: &str = "app.injected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestEncoding {
    Utf8,
    Latin1,
    /// The file was not readable XML text and was replaced.
    Synthesized,
}

/// Decodes manifest bytes as UTF-8, then ISO-8859-1. Anything that does not
/// contain a `<manifest` element (a binary manifest, for one) is replaced by
/// a minimal document for `package`.
pub fn decode_manifest(bytes: &[u8], package: &str) -> (String, ManifestEncoding) {
    let (text, encoding) = match std::str::from_utf8(bytes) {
        Ok(s) => (
            s.strip_prefix('\u{feff}').unwrap_or(s).to_string(),
            ManifestEncoding::Utf8,
        ),
        Err(_) => (
            bytes.iter().map(|&b| b as char).collect(),
            ManifestEncoding::Latin1,
        ),
    };

    if text.contains("<manifest") {
        (text, encoding)
    } else {
        (synthesize_manifest(package), ManifestEncoding::Synthesized)
    }
}

pub fn synthesize_manifest(package: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"no\"?>\n\
         <manifest xmlns:android=\"http://schemas.android.com/apk/res/android\" package=\"{}\">\n\
         \x20   <application android:extractNativeLibs=\"true\">\n\
         \x20   </application>\n\
         </manifest>\n",
        package
    )
}

/// Guesses a package name from a package file stem such as
/// `com.oddno.lovelive`.
pub fn package_from_file_stem(stem: &str) -> String {
    let plausible = stem.contains('.')
        && !stem.starts_with('.')
        && !stem.ends_with('.')
        && stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if plausible {
        stem.to_string()
    } else {
        FALLBACK_PACKAGE.to_string()
    }
}

fn find_application_tag(text: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(pos) = text[from..].find(APPLICATION_TAG) {
        let start = from + pos;
        let after = start + APPLICATION_TAG.len();
        match text[after..].chars().next() {
            Some(c) if c.is_whitespace() || c == '>' || c == '/' => return Some(start),
            _ => from = after,
        }
    }
    None
}

/// The `android:name` already set on the `<application>` start tag, if any.
pub fn existing_application_name(text: &str) -> Option<&str> {
    const NAME_ATTR: &str = "android:name=\"";
    let start = find_application_tag(text)?;
    let end = start + text[start..].find('>')?;
    let tag = &text[start..end];
    let value = &tag[tag.find(NAME_ATTR)? + NAME_ATTR.len()..];
    value.find('"').map(|close| &value[..close])
}

/// Points the `<application>` element at `class`. Text that already
/// mentions `class` is returned unchanged, so applying this twice is the
/// same as applying it once.
pub fn patch_application(text: &str, class: &str) -> (String, bool) {
    if text.contains(class) {
        return (text.to_string(), false);
    }

    let attribute = format!(" android:name=\"{}\"", class);

    if let Some(start) = find_application_tag(text) {
        if let Some(existing) = existing_application_name(text) {
            warn!(
                "<application> already names {}; a second android:name will likely break the rebuild",
                existing
            );
        }
        let at = start + APPLICATION_TAG.len();
        let mut patched = String::with_capacity(text.len() + attribute.len());
        patched.push_str(&text[..at]);
        patched.push_str(&attribute);
        patched.push_str(&text[at..]);
        return (patched, true);
    }

    let element = format!("    {}{}/>\n", APPLICATION_TAG, attribute);
    match text.rfind(MANIFEST_CLOSE) {
        Some(close) => {
            let mut patched = text[..close].to_string();
            patched.push_str(&element);
            patched.push_str(&text[close..]);
            (patched, true)
        }
        None => patch_application(&synthesize_manifest(FALLBACK_PACKAGE), class),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestPatch {
    pub encoding: ManifestEncoding,
    pub changed: bool,
}

/// Reads, patches and rewrites the manifest at `path` in place.
pub fn patch_manifest_file(path: &Path, package: &str, class: &str) -> Result<ManifestPatch> {
    let bytes = fs::read(path)?;
    let (text, encoding) = decode_manifest(&bytes, package);
    match encoding {
        ManifestEncoding::Latin1 => warn!("manifest is not UTF-8, read as ISO-8859-1"),
        ManifestEncoding::Synthesized => {
            warn!("manifest is not readable text, writing a minimal one for {}", package)
        }
        ManifestEncoding::Utf8 => {}
    }

    let (patched, changed) = patch_application(&text, class);
    if changed || encoding == ManifestEncoding::Synthesized {
        let out: Vec<u8> = match encoding {
            ManifestEncoding::Latin1 if patched.chars().all(|c| (c as u32) < 256) => {
                patched.chars().map(|c| c as u8).collect()
            }
            _ => patched.into_bytes(),
        };
        fs::write(path, out)?;
    }

    if changed {
        info!("manifest now boots {}", class);
    } else {
        info!("manifest already references {}", class);
    }

    Ok(ManifestPatch { encoding, changed })
}
