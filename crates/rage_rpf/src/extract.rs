//! Reading file data back out of an archive.

use std::io::{Cursor, SeekFrom};

use binrw::BinWrite;
use rage_rsc::{compression::inflate, ResourceHeader};
use tracing::{instrument, warn};

use crate::{
    archive::{ArchiveStorage, RpfFile},
    entry::{ArchiveId, EntryId, EntryKind},
    error::{Error, Result},
    types::BLOCK_SIZE,
};

impl<S: ArchiveStorage> RpfFile<S> {
    /// Reads `length` bytes starting `skip` bytes into the blocks of `entry`
    fn read_stored(&mut self, entry: EntryId, skip: u64, length: u64) -> Result<Vec<u8>> {
        let (archive, offset) = {
            let e = self.entry(entry)?;
            (e.archive, e.file_offset().unwrap_or(0) as u64)
        };
        let start_pos = self.archive(archive)?.start_pos;

        let mut data = vec![0; length as usize];
        self.storage
            .seek(SeekFrom::Start(start_pos + offset * BLOCK_SIZE + skip))?;
        self.storage.read_exact(&mut data)?;
        Ok(data)
    }

    fn check_encrypted(&self, entry: EntryId, is_encrypted: bool) -> Result<()> {
        if !is_encrypted {
            return Ok(());
        }
        let e = self.entry(entry)?;
        Err(Error::UnsupportedEncryption(format!(
            "{} of {}",
            self.archive(e.archive)?.encryption,
            e.path
        )))
    }

    /// Returns the contents of a file, decompressed
    ///
    /// Directories and files without any data return `None`. Resources come back as their
    /// decompressed heaps, without the container header.
    #[instrument(skip(self), err)]
    pub fn extract_file(&mut self, entry: EntryId) -> Result<Option<Vec<u8>>> {
        let e = self.entry(entry)?;
        match e.kind.clone() {
            EntryKind::Directory(_) => Ok(None),
            EntryKind::Binary(file) => {
                let length = e.stored_size();
                if length == 0 {
                    return Ok(None);
                }
                self.check_encrypted(entry, file.is_encrypted)?;

                let data = self.read_stored(entry, 0, length)?;
                if file.file_size > 0 {
                    Ok(Some(inflate(&data)?))
                } else {
                    Ok(Some(data))
                }
            }
            EntryKind::Resource(file) => {
                if file.file_size == 0 {
                    return Ok(None);
                }
                let length = (file.file_size as u64)
                    .checked_sub(ResourceHeader::SIZE as u64)
                    .ok_or_else(|| {
                        Error::CorruptData(format!(
                            "resource {} is smaller than its header",
                            e.path
                        ))
                    })?;
                self.check_encrypted(entry, file.is_encrypted)?;

                let data = self.read_stored(entry, ResourceHeader::SIZE as u64, length)?;
                Ok(Some(inflate(&data)?))
            }
        }
    }

    /// Returns a file as it is stored
    ///
    /// Resources get a container header built from the entry's page flags, so the result can be
    /// added to another archive with [`RpfFile::create_file`].
    #[instrument(skip(self), err)]
    pub fn extract_file_raw(&mut self, entry: EntryId) -> Result<Option<Vec<u8>>> {
        let e = self.entry(entry)?;
        match e.kind.clone() {
            EntryKind::Directory(_) => Ok(None),
            EntryKind::Binary(_) => {
                let length = e.stored_size();
                if length == 0 {
                    return Ok(None);
                }
                Ok(Some(self.read_stored(entry, 0, length)?))
            }
            EntryKind::Resource(file) => {
                let length = (file.file_size as u64).saturating_sub(ResourceHeader::SIZE as u64);
                if length == 0 {
                    return Ok(None);
                }

                let header = ResourceHeader {
                    version: file.version(),
                    system_flags: file.system_flags.value(),
                    graphics_flags: file.graphics_flags.value(),
                };
                let mut output = Cursor::new(Vec::with_capacity(file.file_size as usize));
                header.write(&mut output)?;

                let mut output = output.into_inner();
                output.extend(self.read_stored(entry, ResourceHeader::SIZE as u64, length)?);
                Ok(Some(output))
            }
        }
    }

    /// Extracts every file of one archive, returning a line for each one that failed
    ///
    /// Nested archives are skipped, they are tested on their own. The number of bytes extracted
    /// is kept in [`crate::RpfArchive::extracted_byte_count`] and the latest failure in
    /// [`crate::RpfArchive::last_error`].
    #[instrument(skip(self), err)]
    pub fn test_extract_all_files(&mut self, archive: ArchiveId) -> Result<String> {
        let mut report = String::new();
        let mut extracted = 0;

        for id in self.archive(archive)?.all_entries.clone() {
            let (path, kind, skip) = {
                let e = self.entry(id)?;
                let kind = match &e.kind {
                    EntryKind::Directory(_) => continue,
                    EntryKind::Binary(_) => "Binary",
                    EntryKind::Resource(_) => "Resource",
                };
                (e.path.clone(), kind, e.name_lower.ends_with(".rpf"))
            };
            if skip {
                continue;
            }

            match self.extract_file(id) {
                Ok(Some(data)) if data.is_empty() => {
                    report.push_str(&format!("{} : Decompressed output was empty.\n", path));
                }
                Ok(Some(data)) => extracted += data.len() as u64,
                Ok(None) => {
                    report.push_str(&format!("{} : {} FileSize is 0.\n", path, kind));
                }
                Err(e) => {
                    warn!("unable to extract {}: {}", path, e);
                    report.push_str(&format!("{} : {}\n", path, e));
                    self.archive_mut(archive)?.last_error = Some(e.to_string());
                }
            }
        }

        self.archive_mut(archive)?.extracted_byte_count = extracted;
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::{
        archive::{ArchiveOptions, RpfFile},
        entry::EntryKind,
        error::{Error, Result},
    };

    fn new_archive() -> Result<RpfFile<Cursor<Vec<u8>>>> {
        RpfFile::new(Cursor::new(Vec::new()), "x.rpf", ArchiveOptions::default())
    }

    fn resource_data() -> Result<Vec<u8>> {
        let mut arena = rage_rsc::ResourceArena::new();
        let root = arena.insert(rage_rsc::StringBlock::new("inside an archive"));
        Ok(rage_rsc::build(
            &mut arena,
            root.id(),
            2,
            rage_rsc::BuildOptions::default(),
        )?)
    }

    #[test]
    fn compressed_binary_round_trip() -> Result<()> {
        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;
        let text = b"some text, some text, some text, some text".to_vec();
        let id = rpf.create_file(root, "notes.txt", &text, false)?;

        let EntryKind::Binary(file) = &rpf.entry(id)?.kind else {
            panic!("expected a binary entry");
        };
        assert!(file.file_size > 0);
        assert_eq!(rpf.extract_file(id)?, Some(text));

        Ok(())
    }

    #[test]
    fn directory_has_no_data() -> Result<()> {
        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;
        assert_eq!(rpf.extract_file(root)?, None);
        Ok(())
    }

    #[test]
    fn raw_resource_can_be_imported_again() -> Result<()> {
        let data = resource_data()?;

        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;
        let id = rpf.create_file(root, "text.ydr", &data, false)?;

        let raw = rpf.extract_file_raw(id)?;
        assert_eq!(raw.as_deref(), Some(data.as_slice()));

        let heaps = rpf.extract_file(id)?.unwrap_or_default();
        let header = rage_rsc::read_header(&data)?;
        let resource = rage_rsc::load_decompressed::<rage_rsc::StringBlock>(header, &heaps)?;
        assert_eq!(resource.root()?.value, "inside an archive");

        Ok(())
    }

    #[test]
    fn encrypted_binary_is_unsupported() -> Result<()> {
        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;
        let id = rpf.create_file(root, "secret.bin", b"hidden", false)?;
        if let EntryKind::Binary(file) = &mut rpf.entry_mut(id)?.kind {
            file.is_encrypted = true;
        }

        assert!(matches!(
            rpf.extract_file(id),
            Err(Error::UnsupportedEncryption(_))
        ));

        Ok(())
    }

    #[test]
    #[traced_test]
    fn test_extract_reports_failures() -> Result<()> {
        let mut rpf = new_archive()?;
        let root = rpf.root_directory(rpf.root())?;
        rpf.create_file(root, "good.txt", b"good data", false)?;
        let bad = rpf.create_file(root, "bad.bin", b"bad data", false)?;
        if let EntryKind::Binary(file) = &mut rpf.entry_mut(bad)?.kind {
            file.is_encrypted = true;
        }

        let report = rpf.test_extract_all_files(rpf.root())?;

        assert!(report.starts_with("x.rpf/bad.bin : "));
        assert!(report.ends_with('\n'));
        assert_eq!(report.lines().count(), 1);
        let archive = rpf.archive(rpf.root())?;
        assert_eq!(archive.extracted_byte_count, 9);
        assert!(archive.last_error.is_some());
        assert!(logs_contain("unable to extract x.rpf/bad.bin"));

        Ok(())
    }
}
