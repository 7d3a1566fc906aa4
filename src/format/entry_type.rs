//! Entry type codes.

use std::fmt;

/// The kind of an archive member, from the header's typeflag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum EntryType {
    /// Regular file (`'0'`).
    #[default]
    File,
    /// Regular file from pre-POSIX archives (NUL typeflag).
    OldFile,
    /// Hard link to an earlier member (`'1'`).
    Link,
    /// Symbolic link (`'2'`).
    SymbolicLink,
    /// Character device (`'3'`).
    CharacterDevice,
    /// Block device (`'4'`).
    BlockDevice,
    /// Directory (`'5'`).
    Directory,
    /// Named pipe (`'6'`).
    Fifo,
    /// Contiguous file, treated as a regular file (`'7'`).
    ContiguousFile,
    /// PAX global extended header (`'g'`).
    GlobalExtendedHeader,
    /// PAX per-entry extended header (`'x'`).
    ExtendedHeader,
    /// Solaris access control list (`'A'`).
    SolarisAcl,
    /// GNU directory dump (`'D'`).
    GnuDumpDir,
    /// Inode metadata only (`'I'`).
    Inode,
    /// GNU long link name for the next member (`'K'`).
    NextFileHasLongLinkpath,
    /// GNU long path for the next member (`'L'`).
    NextFileHasLongPath,
    /// Multi-volume continuation (`'M'`).
    ContinuationFile,
    /// Old GNU long path (`'N'`).
    OldGnuLongPath,
    /// GNU sparse file (`'S'`).
    SparseFile,
    /// Tape volume header (`'V'`).
    TapeVolumeHeader,
    /// Solaris extended header (`'X'`).
    OldExtendedHeader,
    /// A typeflag outside the known table.
    Unknown(u8),
}

impl EntryType {
    /// Maps a typeflag byte to an entry type.
    ///
    /// A NUL byte is read as [`EntryType::File`], matching how every tar
    /// implementation treats pre-POSIX regular files.
    pub fn from_code(code: u8) -> Self {
        match code {
            b'0' | 0 => Self::File,
            b'1' => Self::Link,
            b'2' => Self::SymbolicLink,
            b'3' => Self::CharacterDevice,
            b'4' => Self::BlockDevice,
            b'5' => Self::Directory,
            b'6' => Self::Fifo,
            b'7' => Self::ContiguousFile,
            b'g' => Self::GlobalExtendedHeader,
            b'x' => Self::ExtendedHeader,
            b'A' => Self::SolarisAcl,
            b'D' => Self::GnuDumpDir,
            b'I' => Self::Inode,
            b'K' => Self::NextFileHasLongLinkpath,
            b'L' => Self::NextFileHasLongPath,
            b'M' => Self::ContinuationFile,
            b'N' => Self::OldGnuLongPath,
            b'S' => Self::SparseFile,
            b'V' => Self::TapeVolumeHeader,
            b'X' => Self::OldExtendedHeader,
            other => Self::Unknown(other),
        }
    }

    /// Returns the typeflag byte written for this type.
    pub fn code(&self) -> u8 {
        match self {
            Self::File => b'0',
            Self::OldFile => 0,
            Self::Link => b'1',
            Self::SymbolicLink => b'2',
            Self::CharacterDevice => b'3',
            Self::BlockDevice => b'4',
            Self::Directory => b'5',
            Self::Fifo => b'6',
            Self::ContiguousFile => b'7',
            Self::GlobalExtendedHeader => b'g',
            Self::ExtendedHeader => b'x',
            Self::SolarisAcl => b'A',
            Self::GnuDumpDir => b'D',
            Self::Inode => b'I',
            Self::NextFileHasLongLinkpath => b'K',
            Self::NextFileHasLongPath => b'L',
            Self::ContinuationFile => b'M',
            Self::OldGnuLongPath => b'N',
            Self::SparseFile => b'S',
            Self::TapeVolumeHeader => b'V',
            Self::OldExtendedHeader => b'X',
            Self::Unknown(code) => *code,
        }
    }

    /// Returns the conventional name of the type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::File => "File",
            Self::OldFile => "OldFile",
            Self::Link => "Link",
            Self::SymbolicLink => "SymbolicLink",
            Self::CharacterDevice => "CharacterDevice",
            Self::BlockDevice => "BlockDevice",
            Self::Directory => "Directory",
            Self::Fifo => "FIFO",
            Self::ContiguousFile => "ContiguousFile",
            Self::GlobalExtendedHeader => "GlobalExtendedHeader",
            Self::ExtendedHeader => "ExtendedHeader",
            Self::SolarisAcl => "SolarisACL",
            Self::GnuDumpDir => "GNUDumpDir",
            Self::Inode => "Inode",
            Self::NextFileHasLongLinkpath => "NextFileHasLongLinkpath",
            Self::NextFileHasLongPath => "NextFileHasLongPath",
            Self::ContinuationFile => "ContinuationFile",
            Self::OldGnuLongPath => "OldGnuLongPath",
            Self::SparseFile => "SparseFile",
            Self::TapeVolumeHeader => "TapeVolumeHeader",
            Self::OldExtendedHeader => "OldExtendedHeader",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Returns true for headers whose body describes the next member.
    pub fn is_meta(&self) -> bool {
        matches!(
            self,
            Self::GlobalExtendedHeader
                | Self::ExtendedHeader
                | Self::OldExtendedHeader
                | Self::NextFileHasLongLinkpath
                | Self::NextFileHasLongPath
                | Self::OldGnuLongPath
        )
    }

    /// Returns true for member types surfaced to consumers.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Self::File
                | Self::OldFile
                | Self::Link
                | Self::SymbolicLink
                | Self::CharacterDevice
                | Self::BlockDevice
                | Self::Directory
                | Self::Fifo
                | Self::ContiguousFile
                | Self::GnuDumpDir
        )
    }

    /// Returns true for types that store file content in their body.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File | Self::OldFile | Self::ContiguousFile)
    }

    /// Returns true for types that must carry a link target.
    pub fn requires_linkpath(&self) -> bool {
        matches!(self, Self::Link | Self::SymbolicLink)
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
