//! Shared test fixtures: synthetic `.deb` archives built in memory.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::{Path, PathBuf};

/// Serializes one `ar` archive member (60-byte header + padded data).
pub fn ar_member(name: &str, data: &[u8]) -> Vec<u8> {
    let header = format!(
        "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
        name,
        0,
        0,
        0,
        "100644",
        data.len()
    );
    assert_eq!(header.len(), 60, "ar header must be exactly 60 bytes");

    let mut out = header.into_bytes();
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(b'\n');
    }
    out
}

/// Builds a gzipped control tarball holding a single `control` file.
fn control_tarball(control: &str) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut header = tar::Header::new_gnu();
    header.set_size(control.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "control", control.as_bytes())
        .unwrap();

    builder.into_inner().unwrap().finish().unwrap()
}

/// Writes a minimal but structurally valid `.deb` to `dir`.
pub fn write_deb(dir: &Path, file_name: &str, control: &str) -> PathBuf {
    let mut deb = Vec::new();
    deb.extend_from_slice(b"!<arch>\n");
    deb.extend_from_slice(&ar_member("debian-binary", b"2.0\n"));
    deb.extend_from_slice(&ar_member("control.tar.gz", &control_tarball(control)));

    let path = dir.join(file_name);
    std::fs::write(&path, deb).unwrap();
    path
}

/// A well-formed `hello` package archive.
pub fn hello_deb(dir: &Path) -> PathBuf {
    write_deb(
        dir,
        "hello.deb",
        "Package: hello\n\
         Version: 2.10-3\n\
         Architecture: amd64\n\
         Depends: libc6 (>= 2.36)\n\
         Description: friendly greeter\n",
    )
}
