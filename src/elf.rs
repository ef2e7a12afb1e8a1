use crate::error::Result;
use goblin::elf::header::{
    machine_to_str, EI_CLASS, ELFCLASS64, ELFMAG, EM_386, EM_AARCH64, EM_ARM, EM_X86_64, SELFMAG,
};
use goblin::elf::Elf;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const HEADER_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfIdentity {
    pub machine: &'static str,
    /// Android ABI directory name, when the machine maps to one.
    pub abi: Option<&'static str>,
    pub is_64: bool,
}

/// Reads only the ELF header of `path`. Returns `None` for files that do not
/// start with the ELF magic.
pub fn identify<P: AsRef<Path>>(path: P) -> Result<Option<ElfIdentity>> {
    let mut file = File::open(path.as_ref())?;
    let mut buf = Vec::with_capacity(HEADER_LEN);
    file.by_ref().take(HEADER_LEN as u64).read_to_end(&mut buf)?;

    if buf.len() < SELFMAG || &buf[..SELFMAG] != ELFMAG {
        return Ok(None);
    }

    let header = Elf::parse_header(&buf)?;
    let abi = match header.e_machine {
        EM_AARCH64 => Some("arm64-v8a"),
        EM_ARM => Some("armeabi-v7a"),
        EM_386 => Some("x86"),
        EM_X86_64 => Some("x86_64"),
        _ => None,
    };

    Ok(Some(ElfIdentity {
        machine: machine_to_str(header.e_machine),
        abi,
        is_64: header.e_ident[EI_CLASS] == ELFCLASS64,
    }))
}


#[cfg(test)]
mod tests {
    use super::test_support::elf_header;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn identifies_arm64_library() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("libil2cpp.so");
        let mut bytes = elf_header(true, EM_AARCH64);
        bytes.extend_from_slice(&[0u8; 256]);
        fs::write(&path, bytes).unwrap();

        let id = identify(&path).unwrap().unwrap();
        assert_eq!(id.abi, Some("arm64-v8a"));
        assert!(id.is_64);
        assert_eq!(id.machine, machine_to_str(EM_AARCH64));
    }

    #[test]
    fn identifies_32_bit_arm() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("libil2cpp.so");
        fs::write(&path, elf_header(false, EM_ARM)).unwrap();

        let id = identify(&path).unwrap().unwrap();
        assert_eq!(id.abi, Some("armeabi-v7a"));
        assert!(!id.is_64);
    }

    #[test]
    fn non_elf_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("libil2cpp.so");
        fs::write(&path, b"placeholder").unwrap();
        assert_eq!(identify(&path).unwrap(), None);
    }
}
