//! # Package Descriptor Extraction
//!
//! Reads identity and dependency metadata out of a Debian-style `.deb`
//! archive without installing it.
//!
//! ## Archive Layout
//!
//! A `.deb` is a Unix `ar` archive with a fixed member order:
//!
//! ```text
//! !<arch>
//! ├── debian-binary      (format version, "2.0")
//! ├── control.tar.gz     (package metadata - what we want)
//! └── data.tar.*         (payload - never extracted here)
//! ```
//!
//! Only the control tarball is read; the payload is installed inside the
//! container by `dpkg`, never on the host.
//!
//! ## Security Model
//!
//! The archive is untrusted input:
//!
//! - Member and control-file sizes are bounded by
//!   [`MAX_CONTROL_TARBALL_SIZE`] and [`MAX_CONTROL_FILE_SIZE`].
//! - The declared package name is validated against a strict character
//!   allowlist before it can reach an image tag or container name, which
//!   are later interpolated into engine invocations.
//!
//! [`MAX_CONTROL_TARBALL_SIZE`]: crate::constants::MAX_CONTROL_TARBALL_SIZE
//! [`MAX_CONTROL_FILE_SIZE`]: crate::constants::MAX_CONTROL_FILE_SIZE

use crate::constants::{MAX_CONTROL_FILE_SIZE, MAX_CONTROL_TARBALL_SIZE, MAX_PROGRAM_NAME_LEN};
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Identity and dependency metadata read from a package archive.
///
/// Immutable once read; created per `create` invocation and discarded
/// after the image spec is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Package name. Validated: alphanumeric plus `-` and `_` only.
    pub name: String,
    /// Package version string, verbatim from the control file.
    pub version: String,
    /// Declared architecture (e.g. `amd64`, `all`).
    pub architecture: String,
    /// Declared dependencies, in declaration order, with version
    /// constraints and alternatives stripped.
    pub depends: Vec<String>,
    /// Short description, if present.
    pub description: Option<String>,
}

impl PackageDescriptor {
    /// Reads the descriptor from a `.deb` archive on disk.
    ///
    /// # Errors
    ///
    /// - [`Error::ArchiveNotFound`] if `path` is not a readable file
    /// - [`Error::MalformedPackage`] if the `ar` envelope, control
    ///   tarball, or required control fields are missing or invalid
    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ArchiveNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut file = File::open(path).map_err(|_| Error::ArchiveNotFound {
            path: path.to_path_buf(),
        })?;

        let control = read_control_file(&mut file, path)?;
        let descriptor = parse_control(&control, path)?;

        debug!(
            name = %descriptor.name,
            version = %descriptor.version,
            arch = %descriptor.architecture,
            deps = descriptor.depends.len(),
            "read package descriptor"
        );

        Ok(descriptor)
    }
}

// =============================================================================
// ar Envelope
// =============================================================================

const AR_MAGIC: &[u8; 8] = b"!<arch>\n";
const AR_HEADER_LEN: usize = 60;

/// Locates and decompresses the `control` file from the control tarball.
fn read_control_file(file: &mut File, path: &Path) -> Result<String> {
    let malformed = |reason: &str| Error::MalformedPackage {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)
        .map_err(|_| malformed("archive too short for ar magic"))?;
    if &magic != AR_MAGIC {
        return Err(malformed("not an ar archive (bad magic)"));
    }

    loop {
        // Zero bytes where the next header would start is the clean end
        // of the archive; a partial header is truncation.
        let mut header = [0u8; AR_HEADER_LEN];
        let mut filled = 0;
        while filled < AR_HEADER_LEN {
            match file.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return Err(malformed("unreadable archive")),
            }
        }
        if filled == 0 {
            return Err(malformed("no control tarball in archive"));
        }
        if filled < AR_HEADER_LEN {
            return Err(malformed("truncated ar member header"));
        }

        let name = String::from_utf8_lossy(&header[0..16])
            .trim_end()
            .trim_end_matches('/')
            .to_string();
        let size: u64 = String::from_utf8_lossy(&header[48..58])
            .trim()
            .parse()
            .map_err(|_| malformed("invalid ar member size"))?;
        if &header[58..60] != b"`\n" {
            return Err(malformed("invalid ar member header"));
        }

        if name == "control.tar.gz" || name == "control.tar" {
            if size > MAX_CONTROL_TARBALL_SIZE {
                return Err(malformed("control tarball exceeds size limit"));
            }
            let mut member = vec![0u8; size as usize];
            file.read_exact(&mut member)
                .map_err(|_| malformed("truncated control tarball"))?;

            return if name.ends_with(".gz") {
                extract_control(GzDecoder::new(&member[..]), path)
            } else {
                extract_control(&member[..], path)
            };
        }

        if matches!(name.as_str(), "control.tar.xz" | "control.tar.zst") {
            return Err(malformed(&format!(
                "unsupported control compression: {name}"
            )));
        }

        // Skip this member; data is padded to an even byte boundary.
        let skip = size + (size % 2);
        std::io::copy(&mut file.by_ref().take(skip), &mut std::io::sink())
            .map_err(|_| malformed("truncated archive"))?;
    }
}

/// Pulls `control` (or `./control`) out of an uncompressed tar stream.
fn extract_control<R: Read>(reader: R, path: &Path) -> Result<String> {
    let malformed = |reason: &str| Error::MalformedPackage {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|_| malformed("unreadable control tarball"))?;

    for entry in entries {
        let mut entry = entry.map_err(|_| malformed("corrupt control tarball"))?;
        let entry_path = entry
            .path()
            .map_err(|_| malformed("corrupt control tarball"))?;
        if entry_path == Path::new("control") || entry_path == Path::new("./control") {
            if entry.size() > MAX_CONTROL_FILE_SIZE {
                return Err(malformed("control file exceeds size limit"));
            }
            let mut control = String::new();
            entry
                .read_to_string(&mut control)
                .map_err(|_| malformed("control file is not valid UTF-8"))?;
            return Ok(control);
        }
    }

    Err(malformed("control tarball has no control file"))
}

// =============================================================================
// Control File Parsing
// =============================================================================

/// Parses RFC 822-style control fields into a descriptor.
fn parse_control(control: &str, path: &Path) -> Result<PackageDescriptor> {
    let malformed = |reason: String| Error::MalformedPackage {
        path: path.to_path_buf(),
        reason,
    };

    let mut name = None;
    let mut version = None;
    let mut architecture = None;
    let mut depends = Vec::new();
    let mut description = None;

    for line in control.lines() {
        // Continuation lines (long descriptions) are irrelevant here.
        if line.starts_with([' ', '\t']) {
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match field {
            "Package" => name = Some(value.to_string()),
            "Version" => version = Some(value.to_string()),
            "Architecture" => architecture = Some(value.to_string()),
            "Depends" => depends = parse_depends(value),
            "Description" => description = Some(value.to_string()),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| malformed("missing Package field".into()))?;
    let version = version.ok_or_else(|| malformed("missing Version field".into()))?;

    validate_name(&name).map_err(malformed)?;

    Ok(PackageDescriptor {
        name,
        version,
        architecture: architecture.unwrap_or_else(|| "all".to_string()),
        depends,
        description,
    })
}

/// Normalizes a `Depends:` value into bare package names.
///
/// Version constraints (`libc6 (>= 2.36)`), alternatives (`a | b`, first
/// wins), and architecture qualifiers (`python3:any`) are stripped.
/// Declaration order is preserved.
fn parse_depends(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(|clause| {
            let first_alternative = clause.split('|').next()?;
            let bare = first_alternative
                .split('(')
                .next()?
                .split(':')
                .next()?
                .trim();
            if bare.is_empty() {
                None
            } else {
                Some(bare.to_string())
            }
        })
        .collect()
}

/// Rejects names unsafe for use as image/container identifiers.
///
/// The name is later interpolated into engine invocations; the allowlist
/// (alphanumeric, `-`, `_`) closes the injection path.
fn validate_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("empty package name".into());
    }
    if name.len() > MAX_PROGRAM_NAME_LEN {
        return Err(format!(
            "package name exceeds {MAX_PROGRAM_NAME_LEN} bytes"
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
    {
        return Err(format!("unsafe character '{bad}' in package name"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_control() {
        let control = "Package: hello\nVersion: 2.10-3\nArchitecture: amd64\n";
        let d = parse_control(control, Path::new("hello.deb")).unwrap();
        assert_eq!(d.name, "hello");
        assert_eq!(d.version, "2.10-3");
        assert_eq!(d.architecture, "amd64");
        assert!(d.depends.is_empty());
    }

    #[test]
    fn parses_depends_stripping_constraints_and_alternatives() {
        let deps = parse_depends("libc6 (>= 2.36), libgtk-3-0 | libgtk-4-1, python3:any");
        assert_eq!(deps, vec!["libc6", "libgtk-3-0", "python3"]);
    }

    #[test]
    fn depends_order_is_declaration_order() {
        let deps = parse_depends("zlib1g, libasound2, libc6");
        assert_eq!(deps, vec!["zlib1g", "libasound2", "libc6"]);
    }

    #[test]
    fn missing_package_field_is_malformed() {
        let err = parse_control("Version: 1.0\n", Path::new("x.deb")).unwrap_err();
        assert!(matches!(err, Error::MalformedPackage { .. }));
    }

    #[test]
    fn rejects_unsafe_names() {
        assert!(validate_name("hello-world_2").is_ok());
        assert!(validate_name("hello;rm -rf /").is_err());
        assert!(validate_name("hello world").is_err());
        assert!(validate_name("hello$(id)").is_err());
        assert!(validate_name("").is_err());
    }

    #[test]
    fn rejects_shell_metacharacters_in_control_name() {
        let control = "Package: evil`touch /tmp/x`\nVersion: 1\n";
        let err = parse_control(control, Path::new("evil.deb")).unwrap_err();
        assert!(matches!(err, Error::MalformedPackage { .. }));
    }

    #[test]
    fn missing_file_is_archive_not_found() {
        let err = PackageDescriptor::read(Path::new("/definitely/not/here.deb")).unwrap_err();
        assert!(matches!(err, Error::ArchiveNotFound { .. }));
    }

    #[test]
    fn continuation_lines_are_skipped() {
        let control =
            "Package: hello\nVersion: 1\nDescription: short\n long continuation\n more text\n";
        let d = parse_control(control, Path::new("hello.deb")).unwrap();
        assert_eq!(d.description.as_deref(), Some("short"));
    }
}
