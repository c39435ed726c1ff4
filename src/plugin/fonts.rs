//! Font obfuscation as used by EPUB packages (`META-INF/encryption.xml`).
//!
//! Two schemes exist: IDPF XORs the first 1040 bytes with the SHA-1 of the
//! package identifier, Adobe the first 1024 bytes with the 16 bytes of a
//! UUID identifier. Anything else in `encryption.xml` is real DRM.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::dom::xml::{attribute, tag_name};
use crate::error::Result;
use crate::util::{escape_xml, parse_uuid};

pub(crate) const ADOBE_ALGORITHM: &str = "http://ns.adobe.com/pdf/enc#RC";
pub(crate) const IDPF_ALGORITHM: &str = "http://www.idpf.org/2008/embedding";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Obfuscation {
    Idpf,
    Adobe,
}

impl Obfuscation {
    pub(crate) fn from_algorithm(algorithm: &str) -> Option<Self> {
        match algorithm.trim() {
            IDPF_ALGORITHM => Some(Obfuscation::Idpf),
            ADOBE_ALGORITHM => Some(Obfuscation::Adobe),
            _ => None,
        }
    }

    /// Number of leading bytes that are scrambled.
    fn span(self) -> usize {
        match self {
            Obfuscation::Idpf => 1040,
            Obfuscation::Adobe => 1024,
        }
    }

    /// XOR the scrambled prefix of `data` with `key`. The operation is its
    /// own inverse.
    pub(crate) fn apply(self, data: &mut [u8], key: &[u8]) {
        if key.is_empty() {
            return;
        }
        let end = self.span().min(data.len());
        for (i, byte) in data[..end].iter_mut().enumerate() {
            *byte ^= key[i % key.len()];
        }
    }
}

/// IDPF key: SHA-1 of the unique identifier with XML whitespace removed.
pub(crate) fn idpf_key(unique_identifier: &str) -> [u8; 20] {
    let compact: String = unique_identifier
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\r' | '\n'))
        .collect();
    sha1_smol::Sha1::from(compact.as_bytes()).digest().bytes()
}

/// Adobe key: the bytes of a UUID identifier (`urn:uuid:` prefix allowed).
pub(crate) fn adobe_key(identifier: &str) -> Option<[u8; 16]> {
    parse_uuid(identifier)
}

/// One `<EncryptedData>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EncryptedEntry {
    pub algorithm: String,
    /// Container-relative path of the encrypted file.
    pub uri: String,
}

/// Entries of an `encryption.xml`, in document order.
pub(crate) fn parse_encryption(content: &str) -> Result<Vec<EncryptedEntry>> {
    let mut reader = Reader::from_str(content.trim_start_matches('\u{feff}'));
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut algorithm: Option<String> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match tag_name(&e).as_str() {
                "encrypteddata" => algorithm = None,
                "encryptionmethod" => algorithm = attribute(&e, "Algorithm"),
                "cipherreference" => {
                    if let Some(uri) = attribute(&e, "URI") {
                        entries.push(EncryptedEntry {
                            algorithm: algorithm.clone().unwrap_or_default(),
                            uri: percent_encoding::percent_decode_str(&uri)
                                .decode_utf8_lossy()
                                .into_owned(),
                        });
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

/// `META-INF/encryption.xml` declaring Adobe obfuscation of `uris`.
pub(crate) fn encryption_xml(uris: &[String]) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <encryption xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\" \
         xmlns:enc=\"http://www.w3.org/2001/04/xmlenc#\" \
         xmlns:deenc=\"http://ns.adobe.com/digitaleditions/enc\">\n",
    );
    for uri in uris {
        out.push_str(&format!(
            "  <enc:EncryptedData>\n    <enc:EncryptionMethod Algorithm=\"{ADOBE_ALGORITHM}\"/>\n    <enc:CipherData>\n      <enc:CipherReference URI=\"{}\"/>\n    </enc:CipherData>\n  </enc:EncryptedData>\n",
            escape_xml(uri)
        ));
    }
    out.push_str("</encryption>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obfuscation_round_trip_only_touches_prefix() {
        let original: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let key = idpf_key("urn:uuid:1234 ");
        let mut data = original.clone();
        Obfuscation::Idpf.apply(&mut data, &key);
        assert_ne!(data[..1040], original[..1040]);
        assert_eq!(data[1040..], original[1040..]);
        Obfuscation::Idpf.apply(&mut data, &key);
        assert_eq!(data, original);
    }

    #[test]
    fn test_keys() {
        assert_eq!(idpf_key("a b"), idpf_key("ab"));
        let key = adobe_key("urn:uuid:00112233-4455-6677-8899-aabbccddeeff").unwrap();
        assert_eq!(key[0], 0x00);
        assert_eq!(key[15], 0xff);
        assert!(adobe_key("isbn:123").is_none());
    }

    #[test]
    fn test_parse_and_render_encryption() {
        let xml = encryption_xml(&["OEBPS/fonts/a b.ttf".to_string()]);
        let entries = parse_encryption(&xml).unwrap();
        assert_eq!(
            entries,
            [EncryptedEntry {
                algorithm: ADOBE_ALGORITHM.into(),
                uri: "OEBPS/fonts/a b.ttf".into(),
            }]
        );
    }
}
