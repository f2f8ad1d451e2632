//! The host import ABI exposed to guest WASM commands, and a fast,
//! dependency-free pre-check of a module's exports before paying for a
//! full `wasmi::Module::new` compile.

/// ABI version number.
pub const ABI_VERSION: u32 = 1;

/// Required guest exports.
pub mod exports {
    pub const MEMORY: &str = "memory";
    pub const MAIN: &str = "main";
}

/// Host import namespace. Every import below lives under this one name.
pub const IMPORT_NAMESPACE: &str = "env";

/// Host import function names.
pub mod imports {
    pub const WRITE_STDOUT: &str = "shell_write_stdout";
    pub const WRITE_STDERR: &str = "shell_write_stderr";
    pub const READ_STDIN: &str = "shell_read_stdin";
    pub const GET_ARGC: &str = "shell_get_argc";
    pub const GET_ARG: &str = "shell_get_arg";
    pub const GET_ENV: &str = "shell_get_env";
    pub const SET_EXIT_CODE: &str = "shell_set_exit_code";
}

const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];
const WASM_VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

const SECTION_EXPORT: u8 = 7;

/// Cheaply rejects obviously malformed module bytes and confirms the
/// required exports are present, without running a real parser/compiler.
pub struct ModuleValidator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    TooShort,
    BadMagic,
    BadVersion,
    MissingExport(&'static str),
    Truncated,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort => write!(f, "module too short to contain a header"),
            Self::BadMagic => write!(f, "not a WASM module (bad magic bytes)"),
            Self::BadVersion => write!(f, "unsupported WASM version"),
            Self::MissingExport(name) => write!(f, "missing required export: '{}'", name),
            Self::Truncated => write!(f, "module truncated while scanning export section"),
        }
    }
}

impl ModuleValidator {
    pub fn validate(bytes: &[u8]) -> Result<(), ValidationError> {
        if bytes.len() < 8 {
            return Err(ValidationError::TooShort);
        }
        if bytes[0..4] != WASM_MAGIC {
            return Err(ValidationError::BadMagic);
        }
        if bytes[4..8] != WASM_VERSION {
            return Err(ValidationError::BadVersion);
        }

        let exports = parse_export_section(&bytes[8..])?;
        if !exports.iter().any(|e| e == exports::MEMORY) {
            return Err(ValidationError::MissingExport(exports::MEMORY));
        }
        if !exports.iter().any(|e| e == exports::MAIN) {
            return Err(ValidationError::MissingExport(exports::MAIN));
        }
        Ok(())
    }
}

fn read_leb128(bytes: &[u8], pos: &mut usize) -> Option<u32> {
    let mut result: u32 = 0;
    let mut shift = 0;
    loop {
        let byte = *bytes.get(*pos)?;
        *pos += 1;
        result |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 32 {
            return None;
        }
    }
    Some(result)
}

fn parse_export_section(bytes: &[u8]) -> Result<Vec<String>, ValidationError> {
    let mut pos = 0;
    while pos < bytes.len() {
        let section_id = bytes[pos];
        pos += 1;
        let section_len = read_leb128(bytes, &mut pos).ok_or(ValidationError::Truncated)? as usize;
        let section_start = pos;
        let section_end = section_start
            .checked_add(section_len)
            .filter(|end| *end <= bytes.len())
            .ok_or(ValidationError::Truncated)?;

        if section_id == SECTION_EXPORT {
            let mut p = section_start;
            let count = read_leb128(bytes, &mut p).ok_or(ValidationError::Truncated)?;
            let mut names = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let name_len = read_leb128(bytes, &mut p).ok_or(ValidationError::Truncated)? as usize;
                let name_end = p.checked_add(name_len).filter(|e| *e <= bytes.len()).ok_or(ValidationError::Truncated)?;
                let name = String::from_utf8_lossy(&bytes[p..name_end]).into_owned();
                names.push(name);
                p = name_end;
                // kind byte + index varint, skipped; we only need names.
                p += 1;
                read_leb128(bytes, &mut p).ok_or(ValidationError::Truncated)?;
            }
            return Ok(names);
        }
        pos = section_end;
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_input() {
        assert_eq!(ModuleValidator::validate(&[0, 1]), Err(ValidationError::TooShort));
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = [0xffu8, 0, 0, 0, 1, 0, 0, 0];
        assert_eq!(ModuleValidator::validate(&bytes), Err(ValidationError::BadMagic));
    }

    #[test]
    fn rejects_bad_version() {
        let mut bytes = WASM_MAGIC.to_vec();
        bytes.extend_from_slice(&[9, 0, 0, 0]);
        assert_eq!(ModuleValidator::validate(&bytes), Err(ValidationError::BadVersion));
    }
}
