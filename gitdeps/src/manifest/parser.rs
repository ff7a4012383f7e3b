//! XML decoding for `.ue4dependencies` descriptors.
//!
//! The descriptor root is a `DependencyManifest` element carrying a `BaseUrl`
//! attribute and three collections: `Files/File`, `Blobs/Blob`, and
//! `Packs/Pack`. A document with any other root element is rejected with
//! [`ManifestParseError::UnexpectedRoot`], even when its children have the
//! descriptor's shape. Every entity is encoded as attributes whose names and casing
//! must match exactly. Elements and attributes this crate does not model are
//! ignored so that descriptors written by newer tooling still load.

use roxmltree::{Document, Node};

use super::{Blob, File, Manifest, Pack};

const ROOT_ELEMENT: &str = "DependencyManifest";
const UTF8_BOM: char = '\u{feff}';

/// Errors arising from descriptor decoding.
///
/// Every variant means the bytes do not conform to the descriptor schema;
/// callers treat them uniformly as a malformed document.
#[derive(Debug, thiserror::Error)]
pub enum ManifestParseError {
    /// The descriptor is not valid UTF-8.
    #[error("descriptor is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// The XML itself is not well formed.
    #[error("invalid XML: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The document root is not a `DependencyManifest` element.
    #[error("unexpected root element <{found}>; expected <DependencyManifest>")]
    UnexpectedRoot {
        /// Name of the root element that was found.
        found: String,
    },

    /// A required attribute is absent.
    #[error("<{element}> #{index} is missing the {attribute} attribute")]
    MissingAttribute {
        /// Element name, e.g. `File`.
        element: &'static str,
        /// Zero-based position of the element within its collection.
        index: usize,
        /// Attribute name, e.g. `Hash`.
        attribute: &'static str,
    },

    /// A numeric attribute does not hold an unsigned integer.
    #[error("<{element}> #{index} has non-numeric {attribute}=\"{value}\"")]
    InvalidNumber {
        /// Element name.
        element: &'static str,
        /// Zero-based position of the element within its collection.
        index: usize,
        /// Attribute name.
        attribute: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A boolean attribute holds something other than `true` or `false`.
    #[error("<{element}> #{index} has non-boolean {attribute}=\"{value}\"")]
    InvalidBool {
        /// Element name.
        element: &'static str,
        /// Zero-based position of the element within its collection.
        index: usize,
        /// Attribute name.
        attribute: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Decode raw descriptor bytes, tolerating a leading UTF-8 byte-order mark.
///
/// # Errors
///
/// Returns [`ManifestParseError::Encoding`] for non-UTF-8 input and any
/// error [`parse_manifest`] reports.
pub fn parse_manifest_bytes(bytes: &[u8]) -> Result<Manifest, ManifestParseError> {
    let text = std::str::from_utf8(bytes)?;
    parse_manifest(text)
}

/// Decode a descriptor into a [`Manifest`].
///
/// # Errors
///
/// Returns an error when the XML is malformed, the root element is wrong,
/// a required attribute is missing, or a numeric or boolean attribute does
/// not parse.
///
/// # Examples
///
/// ```
/// use ue_gitdeps::manifest::parse_manifest;
///
/// let xml = concat!(
///     r#"<DependencyManifest BaseUrl="http://cdn.example.test/dependencies">"#,
///     r#"<Files><File Name="some-file" Hash="b1"/></Files>"#,
///     r#"<Blobs><Blob Hash="b1" Size="6" PackHash="p1" PackOffset="8"/></Blobs>"#,
///     r#"<Packs><Pack Hash="p1" Size="14" CompressedSize="30" RemotePath="UE-1"/></Packs>"#,
///     r#"</DependencyManifest>"#,
/// );
/// let manifest = parse_manifest(xml).expect("valid descriptor");
/// assert_eq!(manifest.blobs()[0].pack_offset, 8);
/// ```
pub fn parse_manifest(text: &str) -> Result<Manifest, ManifestParseError> {
    let document = Document::parse(text.trim_start_matches(UTF8_BOM))?;
    let root = document.root_element();
    if root.tag_name().name() != ROOT_ELEMENT {
        return Err(ManifestParseError::UnexpectedRoot {
            found: root.tag_name().name().to_owned(),
        });
    }

    let base_url = root.attribute("BaseUrl").unwrap_or_default().to_owned();
    let files = collect(root, "Files", "File", parse_file)?;
    let blobs = collect(root, "Blobs", "Blob", parse_blob)?;
    let packs = collect(root, "Packs", "Pack", parse_pack)?;

    Ok(Manifest::new(base_url, files, blobs, packs))
}

fn collect<T>(
    root: Node<'_, '_>,
    group: &'static str,
    item: &'static str,
    parse: fn(&Entry<'_, '_>) -> Result<T, ManifestParseError>,
) -> Result<Vec<T>, ManifestParseError> {
    root.children()
        .filter(move |node| node.has_tag_name(group))
        .flat_map(move |node| node.children().filter(move |child| child.has_tag_name(item)))
        .enumerate()
        .map(|(index, node)| {
            parse(&Entry {
                node,
                element: item,
                index,
            })
        })
        .collect()
}

/// One entity element together with its position, for error reporting.
struct Entry<'a, 'input> {
    node: Node<'a, 'input>,
    element: &'static str,
    index: usize,
}

impl Entry<'_, '_> {
    fn required(&self, attribute: &'static str) -> Result<String, ManifestParseError> {
        self.node
            .attribute(attribute)
            .map(str::to_owned)
            .ok_or(ManifestParseError::MissingAttribute {
                element: self.element,
                index: self.index,
                attribute,
            })
    }

    fn optional(&self, attribute: &str) -> String {
        self.node.attribute(attribute).unwrap_or_default().to_owned()
    }

    fn number(&self, attribute: &'static str) -> Result<u64, ManifestParseError> {
        let Some(value) = self.node.attribute(attribute) else {
            return Ok(0);
        };
        value
            .trim()
            .parse()
            .map_err(|_| ManifestParseError::InvalidNumber {
                element: self.element,
                index: self.index,
                attribute,
                value: value.to_owned(),
            })
    }

    fn flag(&self, attribute: &'static str) -> Result<bool, ManifestParseError> {
        let Some(value) = self.node.attribute(attribute) else {
            return Ok(false);
        };
        match value.trim() {
            v if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
            v if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
            _ => Err(ManifestParseError::InvalidBool {
                element: self.element,
                index: self.index,
                attribute,
                value: value.to_owned(),
            }),
        }
    }
}

fn parse_file(entry: &Entry<'_, '_>) -> Result<File, ManifestParseError> {
    Ok(File {
        name: entry.required("Name")?,
        content_hash: entry.required("Hash")?,
        expected_hash: entry.optional("ExpectedHash"),
        timestamp: entry.number("Timestamp")?,
        is_executable: entry.flag("IsExecutable")?,
    })
}

fn parse_blob(entry: &Entry<'_, '_>) -> Result<Blob, ManifestParseError> {
    Ok(Blob {
        hash: entry.required("Hash")?,
        size: entry.number("Size")?,
        pack_hash: entry.required("PackHash")?,
        pack_offset: entry.number("PackOffset")?,
    })
}

fn parse_pack(entry: &Entry<'_, '_>) -> Result<Pack, ManifestParseError> {
    Ok(Pack {
        hash: entry.required("Hash")?,
        size: entry.number("Size")?,
        compressed_size: entry.number("CompressedSize")?,
        remote_path: entry.optional("RemotePath"),
    })
}
