//! core type-safe identifiers and names used by the storage layer.

use std::borrow::Cow;
use std::fmt;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use serde::{Deserialize, Serialize, Serializer};

/// A 160-bit SHA-1 content digest.
///
/// Identical byte streams always produce the same digest, which makes it
/// the primary key of every blob in the object store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 20]);

impl Digest {
    /// length of the hex form
    pub const HEX_LEN: usize = 40;

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// parse a digest from its 40-character hex form
    pub fn from_hex(hex: &str) -> Result<Self, InvalidNameError> {
        if hex.len() != Self::HEX_LEN {
            return Err(InvalidNameError::InvalidHex(hex.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex, &mut bytes)
            .map_err(|_| InvalidNameError::InvalidHex(hex.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// short form shown to users (first 6 hex characters)
    pub fn short(&self) -> String {
        self.to_hex()[..6].to_string()
    }

    /// split into the fan-out directory and file name, e.g. `ab` / `cdef...`
    pub fn fan_out(&self) -> (String, String) {
        let hex = self.to_hex();
        let (dir, file) = hex.split_at(2);
        (dir.to_string(), file.to_string())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Commit identifier.
///
/// Kept distinct from [`Digest`] so a blob digest can never be passed
/// where a commit is expected.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(Digest);

impl CommitId {
    pub(crate) fn new(digest: Digest) -> Self {
        Self(digest)
    }

    /// parse a CommitId from a full hex string
    pub fn from_hex(hex: &str) -> Result<Self, InvalidNameError> {
        Digest::from_hex(hex).map(CommitId)
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.short()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.0.to_hex())
    }
}

impl Serialize for CommitId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// A validated repository-relative path.
///
/// Always stored with `/` separators, never absolute, and never containing
/// `.` or `..` components, so it can be joined onto the repository root
/// without escaping it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoPath(String);

impl RepoPath {
    const MAX_LEN: usize = 4096;

    /// create a RepoPath from user input, normalising `./` prefixes
    /// and, where it is the platform separator, `\`
    pub fn new(path: impl AsRef<str>) -> Result<Self, InvalidNameError> {
        let raw = path.as_ref();
        if raw.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if raw.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong(raw.len()));
        }

        // `\` is only a separator where the platform says so; elsewhere it
        // is an ordinary file-name character
        let unified: Cow<'_, str> = if MAIN_SEPARATOR == '\\' {
            Cow::Owned(raw.replace('\\', "/"))
        } else {
            Cow::Borrowed(raw)
        };
        if unified.starts_with('/') {
            return Err(InvalidNameError::InvalidPath(raw.to_string()));
        }

        let mut parts = Vec::new();
        for part in unified.split('/') {
            match part {
                "" | "." => continue,
                ".." => return Err(InvalidNameError::InvalidPath(raw.to_string())),
                p => {
                    if let Some((position, char)) =
                        p.chars().enumerate().find(|(_, c)| c.is_control())
                    {
                        return Err(InvalidNameError::InvalidCharacter { char, position });
                    }
                    parts.push(p);
                }
            }
        }

        if parts.is_empty() {
            return Err(InvalidNameError::InvalidPath(raw.to_string()));
        }
        Ok(Self(parts.join("/")))
    }

    /// build a RepoPath from a filesystem path relative to the repository root
    pub fn from_relative(path: &Path) -> Result<Self, InvalidNameError> {
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => continue,
                _ => return Err(InvalidNameError::InvalidPath(path.display().to_string())),
            }
        }
        Self::new(parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// first path component
    pub fn first_component(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// join onto a root directory
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated baseline (tag) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaselineName(String);

impl BaselineName {
    const MAX_LEN: usize = 255;

    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if name.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong(name.len()));
        }
        for (position, c) in name.chars().enumerate() {
            if c.is_control() {
                return Err(InvalidNameError::InvalidCharacter { char: c, position });
            }
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BaselineName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// error type for invalid names (paths, baselines, digests)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidCharacter { char: char, position: usize },
    InvalidPath(String),
    InvalidHex(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} characters", len),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character {:?} at position {}", char, position)
            }
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
            Self::InvalidHex(hex) => write!(f, "invalid digest: '{}'", hex),
        }
    }
}

impl std::error::Error for InvalidNameError {}
