//! Archive members re-encoded from another archive.

use crate::format::{EntryType, Header};
use crate::read::ReadEntry;
use crate::safety::strip_absolute_path;
use crate::warning::Diagnostics;
use crate::write::PackOptions;
use crate::write::entry::{EntrySettings, mode_fix, pax_for, prefix_path};
use crate::{Error, Result, Warning, WarningCode};

/// A member copied from a [`ReadEntry`] into a new archive.
///
/// The header (and PAX header when needed) is produced on construction;
/// the body is passed through [`write`](Self::write) and padded by
/// [`end`](Self::end).
#[derive(Debug)]
pub struct WriteEntryTar {
    path: String,
    entry_type: EntryType,
    block_remain: u64,
    output: Vec<u8>,
    ended: bool,
}

impl WriteEntryTar {
    /// Builds the header for `entry` using the pack options.
    pub fn new(entry: &ReadEntry, options: &PackOptions) -> Result<Self> {
        Self::with_settings(entry, options.into(), &options.diagnostics())
    }

    pub(crate) fn with_settings(
        entry: &ReadEntry,
        settings: EntrySettings,
        diagnostics: &Diagnostics,
    ) -> Result<Self> {
        let portable = settings.portable;
        let mut path = entry.path.clone();
        if !settings.preserve_paths {
            let (root, rest) = strip_absolute_path(&entry.path);
            if !root.is_empty() {
                diagnostics.warn(
                    Warning::new(
                        WarningCode::EntryInfo,
                        format!("stripping {root} from absolute path"),
                    )
                    .with_path(entry.path.clone()),
                )?;
                path = rest.to_string();
            }
        }

        let is_dir = entry.entry_type == EntryType::Directory;
        let mtime = if settings.no_mtime {
            None
        } else {
            settings.mtime.or(entry.mtime)
        };
        let prefix = settings.prefix.as_deref();
        let linkpath = match (&entry.linkpath, entry.entry_type) {
            (Some(link), EntryType::Link) => Some(prefix_path(link, prefix)),
            (link, _) => link.clone(),
        };
        let mut header = Header {
            path: prefix_path(&path, prefix),
            mode: entry.mode.map(|m| mode_fix(m, is_dir, portable)),
            uid: if portable { None } else { entry.uid },
            gid: if portable { None } else { entry.gid },
            uname: if portable { None } else { entry.uname.clone() },
            gname: if portable { None } else { entry.gname.clone() },
            size: entry.size,
            mtime,
            entry_type: entry.entry_type,
            linkpath,
            devmajor: entry.devmajor,
            devminor: entry.devminor,
            atime: if portable { None } else { entry.atime },
            ctime: if portable { None } else { entry.ctime },
            ..Header::default()
        };

        let mut output = Vec::new();
        let (block, needs_pax) = header.to_block();
        if needs_pax && !settings.no_pax {
            let mut pax = pax_for(&header, mtime);
            if !portable {
                pax.dev = entry.dev;
                pax.ino = entry.ino;
                pax.nlink = entry.nlink;
            }
            output.extend_from_slice(&pax.encode());
        }
        output.extend_from_slice(&block);

        Ok(Self {
            path: header.path,
            entry_type: entry.entry_type,
            block_remain: entry.start_block_size(),
            output,
            ended: false,
        })
    }

    /// Appends body bytes.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.ended {
            return Err(Error::InvalidState("write after end"));
        }
        let len = data.len() as u64;
        if len > self.block_remain {
            return Err(Error::ResourceLimitExceeded(
                "writing more to entry than is appropriate".into(),
            ));
        }
        self.block_remain -= len;
        self.output.extend_from_slice(data);
        Ok(())
    }

    /// Pads the body to its block boundary.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.output
            .resize(self.output.len() + self.block_remain as usize, 0);
        self.block_remain = 0;
        self.ended = true;
    }

    /// Drains the bytes produced so far.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Returns true after [`end`](Self::end).
    pub fn is_done(&self) -> bool {
        self.ended
    }

    /// Archive path as written.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Member type.
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }
}
