use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;

use chrono::Utc;
use uuid::Uuid;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::error::{Error, Result};
use crate::types::Bookmark;

pub trait EbookGenerator: Send + Sync {
    /// Writes an ebook for `bookmark` to `dest`. `cover` is the raw
    /// thumbnail, if any.
    fn generate(&self, bookmark: &Bookmark, cover: Option<&[u8]>, dest: &Path) -> Result<()>;
}

/// EPUB 3 generator with an EPUB 2 NCX for older readers.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpubGenerator;

impl EbookGenerator for EpubGenerator {
    fn generate(&self, bookmark: &Bookmark, cover: Option<&[u8]>, dest: &Path) -> Result<()> {
        let tmp = dest.with_extension("epub.tmp");
        {
            let file = File::create(&tmp)?;
            write_epub(file, bookmark, cover).map_err(zip_err)?;
        }
        std::fs::rename(&tmp, dest)?;
        Ok(())
    }
}

fn zip_err(e: zip::result::ZipError) -> Error {
    match e {
        zip::result::ZipError::Io(e) => Error::Io(e),
        other => Error::Internal(format!("failed to write ebook: {other}")),
    }
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if c.is_control() && c != '\n' && c != '\t' => {}
            c => out.push(c),
        }
    }
    out
}

/// Sniffs the image type from its magic bytes.
pub(crate) fn image_type(bytes: &[u8]) -> Option<(&'static str, &'static str)> {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => Some(("image/png", "png")),
        [0xFF, 0xD8, 0xFF, ..] => Some(("image/jpeg", "jpg")),
        [b'G', b'I', b'F', b'8', ..] => Some(("image/gif", "gif")),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
            Some(("image/webp", "webp"))
        }
        _ => None,
    }
}

fn body_html(bookmark: &Bookmark) -> String {
    if !bookmark.html.trim().is_empty() {
        return bookmark.html.clone();
    }
    bookmark
        .content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", xml_escape(p)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn write_epub<W: Write + Seek>(
    out: W,
    bookmark: &Bookmark,
    cover: Option<&[u8]>,
) -> zip::result::ZipResult<()> {
    let mut zip = ZipWriter::new(out);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let title = if bookmark.title.trim().is_empty() {
        bookmark.url.as_str()
    } else {
        bookmark.title.as_str()
    };
    let title = xml_escape(title);
    let identifier = format!("urn:uuid:{}", Uuid::new_v4());
    let modified = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let cover = cover.and_then(|bytes| image_type(bytes).map(|(mime, ext)| (bytes, mime, ext)));

    // The mimetype entry must come first and be stored uncompressed.
    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#,
    )?;

    let creator = if bookmark.author.trim().is_empty() {
        String::new()
    } else {
        format!("    <dc:creator>{}</dc:creator>\n", xml_escape(&bookmark.author))
    };
    let (cover_meta, cover_item) = match &cover {
        Some((_, mime, ext)) => (
            "    <meta name=\"cover\" content=\"cover-image\"/>\n".to_string(),
            format!(
                "    <item id=\"cover-image\" href=\"cover.{ext}\" media-type=\"{mime}\" properties=\"cover-image\"/>\n"
            ),
        ),
        None => (String::new(), String::new()),
    };

    zip.start_file("OEBPS/content.opf", deflated)?;
    write!(
        zip,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="book-id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{identifier}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:language>en</dc:language>
    <dc:source>{source}</dc:source>
{creator}    <meta property="dcterms:modified">{modified}</meta>
{cover_meta}  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="content" href="content.xhtml" media-type="application/xhtml+xml"/>
{cover_item}  </manifest>
  <spine toc="ncx">
    <itemref idref="content"/>
  </spine>
</package>
"#,
        source = xml_escape(&bookmark.url),
    )?;

    zip.start_file("OEBPS/toc.ncx", deflated)?;
    write!(
        zip,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{identifier}"/>
  </head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
    <navPoint id="content" playOrder="1">
      <navLabel><text>{title}</text></navLabel>
      <content src="content.xhtml"/>
    </navPoint>
  </navMap>
</ncx>
"#
    )?;

    zip.start_file("OEBPS/nav.xhtml", deflated)?;
    write!(
        zip,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>{title}</title></head>
<body>
  <nav epub:type="toc"><ol><li><a href="content.xhtml">{title}</a></li></ol></nav>
</body>
</html>
"#
    )?;

    zip.start_file("OEBPS/content.xhtml", deflated)?;
    write!(
        zip,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{title}</title></head>
<body>
<h1>{title}</h1>
<p><a href="{source}">{source}</a></p>
{body}
</body>
</html>
"#,
        source = xml_escape(&bookmark.url),
        body = body_html(bookmark),
    )?;

    if let Some((bytes, _, ext)) = cover {
        zip.start_file(format!("OEBPS/cover.{ext}"), stored)?;
        zip.write_all(bytes)?;
    }

    zip.finish()?;
    Ok(())
}
