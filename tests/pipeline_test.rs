//! End-to-end conversions through the built-in plugins.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use ebconv::opf::read_book;
use ebconv::pipeline::FailedStage;
use ebconv::transforms::PassOutcome;
use ebconv::{GuideRole, Pipeline, PluginRegistry, Stage, UserOptions};

const UUID: &str = "urn:uuid:0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0";

fn xhtml(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>t</title></head><body>{body}</body></html>"
    )
}

fn font() -> Vec<u8> {
    (0..3000u32).map(|i| (i * 7 % 256) as u8).collect()
}

/// IDPF obfuscation, written out independently of the crate.
fn idpf_obfuscate(data: &mut [u8]) {
    let key = sha1_smol::Sha1::from(UUID.as_bytes()).digest().bytes();
    for (i, byte) in data.iter_mut().take(1040).enumerate() {
        *byte ^= key[i % key.len()];
    }
}

fn write_epub(path: &Path) {
    let opf = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>Round Trip</dc:title>
    <dc:language>en</dc:language>
    <dc:identifier id="bookid">{UUID}</dc:identifier>
    <meta name="cover" content="cover-image"/>
  </metadata>
  <manifest>
    <item id="titlepage" href="cover.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-image" href="images/cover.jpg" media-type="image/jpeg"/>
    <item id="font" href="fonts/serif.ttf" media-type="font/ttf"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="titlepage"/>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
  <guide>
    <reference type="cover" title="Cover" href="cover.xhtml"/>
  </guide>
</package>"#
    );
    let ncx = r#"<?xml version="1.0" encoding="utf-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="p1"><navLabel><text>One</text></navLabel><content src="text/ch1.xhtml"/></navPoint>
    <navPoint id="p2"><navLabel><text>Two</text></navLabel><content src="text/ch2.xhtml"/></navPoint>
  </navMap>
</ncx>"#;
    let encryption = r#"<?xml version="1.0" encoding="UTF-8"?>
<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container" xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://www.idpf.org/2008/embedding"/>
    <enc:CipherData><enc:CipherReference URI="OEBPS/fonts/serif.ttf"/></enc:CipherData>
  </enc:EncryptedData>
</encryption>"#;
    let mut scrambled = font();
    idpf_obfuscate(&mut scrambled);

    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let files: Vec<(&str, Vec<u8>)> = vec![
        ("mimetype", b"application/epub+zip".to_vec()),
        (
            "META-INF/container.xml",
            br#"<?xml version="1.0"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OEBPS/book.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#.to_vec(),
        ),
        ("META-INF/encryption.xml", encryption.as_bytes().to_vec()),
        ("OEBPS/book.opf", opf.into_bytes()),
        ("OEBPS/toc.ncx", ncx.as_bytes().to_vec()),
        ("OEBPS/cover.xhtml", xhtml("<div><img src=\"images/cover.jpg\" alt=\"cover\"/></div>").into_bytes()),
        ("OEBPS/text/ch1.xhtml", xhtml("<h1>One</h1><p>First.</p>").into_bytes()),
        ("OEBPS/text/ch2.xhtml", xhtml("<h1>Two</h1><p>Second.</p>").into_bytes()),
        ("OEBPS/images/cover.jpg", vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 16]),
        ("OEBPS/fonts/serif.ttf", scrambled),
    ];
    for (name, data) in files {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(&data).unwrap();
    }
    zip.finish().unwrap();
}

fn write_package(dir: &Path, files: &[(&str, &str)]) -> std::path::PathBuf {
    let mut manifest = String::new();
    let mut spine = String::new();
    for (i, (path, body)) in files.iter().enumerate() {
        let full = dir.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(&full, xhtml(body)).unwrap();
        manifest.push_str(&format!(
            "<item id=\"f{i}\" href=\"{path}\" media-type=\"application/xhtml+xml\"/>"
        ));
        spine.push_str(&format!("<itemref idref=\"f{i}\"/>"));
    }
    let opf = format!(
        r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Three</dc:title><dc:identifier id="id">x</dc:identifier></metadata>
  <manifest>{manifest}</manifest>
  <spine>{spine}</spine>
</package>"#
    );
    let path = dir.join("book.opf");
    fs::write(&path, opf).unwrap();
    path
}

#[test]
fn headings_in_first_and_last_file_give_two_entries() {
    let dir = tempfile::tempdir().unwrap();
    let opf = write_package(
        &dir.path().join("in"),
        &[
            ("text/a.xhtml", "<h1>Opening</h1><p>a</p>"),
            ("text/b.xhtml", "<p>no heading here</p>"),
            ("text/c.xhtml", "<h1>Closing</h1><p>c</p>"),
        ],
    );
    let out = dir.path().join("out");

    let registry = PluginRegistry::builtin();
    let mut pipeline = Pipeline::new(&registry);
    let report = pipeline.run(&opf, &out, &UserOptions::default()).unwrap();
    assert!(report
        .passes
        .contains(&("DetectStructure".to_string(), PassOutcome::Applied)));

    let book = read_book(&out.join("content.opf"), None).unwrap();
    let entries: Vec<_> = book
        .toc
        .flatten()
        .into_iter()
        .map(|(level, title, dest, frag)| (level, title, dest.unwrap(), frag))
        .collect();
    assert_eq!(
        entries,
        [
            (1, "Opening".to_string(), "text/a.xhtml".to_string(), None),
            (1, "Closing".to_string(), "text/c.xhtml".to_string(), None),
        ]
    );
}

#[test]
fn epub_round_trip_keeps_structure_and_fonts() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.epub");
    write_epub(&input);
    let middle = dir.path().join("middle.epub");

    let registry = PluginRegistry::builtin();
    let mut pipeline = Pipeline::new(&registry);
    pipeline.run(&input, &middle, &UserOptions::default()).unwrap();
    assert_eq!(pipeline.stage(), Stage::Done);

    let mut archive = ZipArchive::new(File::open(&middle).unwrap()).unwrap();
    assert_eq!(archive.by_index(0).unwrap().name(), "mimetype");
    let mut encryption = String::new();
    archive
        .by_name("META-INF/encryption.xml")
        .unwrap()
        .read_to_string(&mut encryption)
        .unwrap();
    assert!(encryption.contains("http://ns.adobe.com/pdf/enc#RC"));
    assert!(encryption.contains("OEBPS/fonts/serif.ttf"));
    let mut stored_font = Vec::new();
    archive
        .by_name("OEBPS/fonts/serif.ttf")
        .unwrap()
        .read_to_end(&mut stored_font)
        .unwrap();
    assert_ne!(stored_font, font());

    // Back out to a directory to inspect the package.
    let out = dir.path().join("out");
    pipeline.run(&middle, &out, &UserOptions::default()).unwrap();
    let book = read_book(&out.join("content.opf"), None).unwrap();

    assert_eq!(book.title(), Some("Round Trip"));
    let spine: Vec<_> = book.spine_items().map(|(_, i, _)| i.href().to_string()).collect();
    assert_eq!(spine, ["cover.xhtml", "text/ch1.xhtml", "text/ch2.xhtml"]);
    assert_eq!(
        book.guide.get(GuideRole::TitlePage).unwrap().reference.path,
        "cover.xhtml"
    );
    assert_eq!(
        book.guide.get(GuideRole::Cover).unwrap().reference.path,
        "images/cover.jpg"
    );
    let titles: Vec<_> = book.toc.flatten().into_iter().map(|e| e.1).collect();
    assert_eq!(titles, ["One", "Two"]);
    assert_eq!(fs::read(out.join("fonts/serif.ttf")).unwrap(), font());
    book.check_consistency().unwrap();
}

#[test]
fn encrypted_content_fails_during_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("drm.epub");
    let mut zip = ZipWriter::new(File::create(&input).unwrap());
    let files: [(&str, &[u8]); 3] = [
        ("mimetype", b"application/epub+zip"),
        (
            "META-INF/container.xml",
            br#"<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="book.opf"/></rootfiles></container>"#,
        ),
        (
            "META-INF/encryption.xml",
            br#"<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container" xmlns:enc="http://www.w3.org/2001/04/xmlenc#"><enc:EncryptedData><enc:EncryptionMethod Algorithm="http://www.w3.org/2001/04/xmlenc#aes128-cbc"/><enc:CipherData><enc:CipherReference URI="a.xhtml"/></enc:CipherData></enc:EncryptedData></encryption>"#,
        ),
    ];
    for (name, data) in files {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.start_file("book.opf", SimpleFileOptions::default()).unwrap();
    zip.write_all(br#"<package xmlns="http://www.idpf.org/2007/opf" version="2.0"><metadata/><manifest/><spine/></package>"#)
        .unwrap();
    zip.finish().unwrap();

    let registry = PluginRegistry::builtin();
    let mut pipeline = Pipeline::new(&registry);
    let err = pipeline
        .run(&input, &dir.path().join("out.epub"), &UserOptions::default())
        .unwrap_err();
    assert!(matches!(err, ebconv::Error::Drm(_)));
    assert_eq!(pipeline.stage(), Stage::Failed(FailedStage::Input));
}
