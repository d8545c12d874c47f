//! Name hashing for archive entries.

/// Jenkins one-at-a-time hash of `name`, ignoring ASCII case
pub fn joaat(name: &str) -> u32 {
    let mut hash: u32 = 0;
    for byte in name.bytes() {
        hash = hash.wrapping_add(byte.to_ascii_lowercase() as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash.wrapping_add(hash << 15)
}

/// Name without its last extension, e.g. `model` for `model.ydr`
///
/// A leading dot is part of the name, so `.hidden` has no extension.
pub fn short_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(index) if index > 0 => &name[..index],
        _ => name,
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{joaat, short_name};

    #[test]
    fn known_hashes() {
        assert_eq!(joaat(""), 0);
        assert_eq!(joaat("a"), 0xCA2E9442);
        assert_eq!(joaat("hello"), 0xC8FD181B);
        assert_eq!(joaat("a.txt"), 0x42DB70B6);
    }

    #[test]
    fn hash_ignores_case() {
        assert_eq!(joaat("HeLLo"), joaat("hello"));
        assert_eq!(joaat("Y.RPF"), 0x2D957066);
    }

    #[test]
    fn strips_last_extension() {
        assert_eq!(short_name("model.ydr"), "model");
        assert_eq!(short_name("archive.tar.rpf"), "archive.tar");
        assert_eq!(short_name("noext"), "noext");
        assert_eq!(short_name(".hidden"), ".hidden");
    }
}
