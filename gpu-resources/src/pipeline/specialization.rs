//! Specialization constant blobs.

use crate::error::fatal;

/// One constant inside a [`SpecializationConstantInfo`] blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecializationEntry {
    pub constant_id: u32,
    pub offset: u32,
    pub size: u32,
}

/// Append-only specialization constant data.
///
/// Each id can be added once and then changed in place with a value of the
/// same size. Hashing covers the entries and the bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SpecializationConstantInfo {
    entries: Vec<SpecializationEntry>,
    data: Vec<u8>,
}

impl SpecializationConstantInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` as constant `constant_id`.
    ///
    /// Returns `false` and leaves the blob untouched if the id is already present.
    pub fn add_constant(&mut self, constant_id: u32, bytes: &[u8]) -> bool {
        if self.entry(constant_id).is_some() {
            log::warn!(
                "Specialization constant {} was already added, use change_constant instead",
                constant_id
            );
            return false;
        }
        self.entries.push(SpecializationEntry {
            constant_id,
            offset: self.data.len() as u32,
            size: bytes.len() as u32,
        });
        self.data.extend_from_slice(bytes);
        true
    }

    pub fn add_value<T: bytemuck::Pod>(&mut self, constant_id: u32, value: T) -> bool {
        self.add_constant(constant_id, bytemuck::bytes_of(&value))
    }

    /// Overwrite the bytes of an existing constant.
    ///
    /// Unknown ids and size mismatches are fatal.
    pub fn change_constant(&mut self, constant_id: u32, bytes: &[u8]) {
        let Some(entry) = self.entry(constant_id).copied() else {
            fatal(format_args!(
                "Specialization constant {} was never added",
                constant_id
            ));
        };
        if entry.size as usize != bytes.len() {
            fatal(format_args!(
                "Specialization constant {} is {} bytes, got {}",
                constant_id,
                entry.size,
                bytes.len()
            ));
        }
        let start = entry.offset as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn change_value<T: bytemuck::Pod>(&mut self, constant_id: u32, value: T) {
        self.change_constant(constant_id, bytemuck::bytes_of(&value));
    }

    pub fn entries(&self) -> &[SpecializationEntry] {
        &self.entries
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.data.clear();
    }

    fn entry(&self, constant_id: u32) -> Option<&SpecializationEntry> {
        self.entries.iter().find(|e| e.constant_id == constant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_change() {
        let mut info = SpecializationConstantInfo::new();
        assert!(info.add_value(0, 7u32));
        assert!(info.add_value(3, 1.5f32));
        assert_eq!(info.entries()[1].offset, 4);
        assert_eq!(info.data().len(), 8);

        info.change_value(0, 9u32);
        assert_eq!(&info.data()[0..4], &9u32.to_ne_bytes());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut info = SpecializationConstantInfo::new();
        assert!(info.add_value(1, 1u32));
        assert!(!info.add_value(1, 2u32));
        assert_eq!(info.entries().len(), 1);
        assert_eq!(info.data(), &1u32.to_ne_bytes());
    }

    #[test]
    #[should_panic]
    fn test_change_unknown_id() {
        SpecializationConstantInfo::new().change_value(5, 1u32);
    }

    #[test]
    #[should_panic]
    fn test_change_with_wrong_size() {
        let mut info = SpecializationConstantInfo::new();
        info.add_value(0, 1u32);
        info.change_value(0, 1u64);
    }

    #[test]
    fn test_identity_follows_contents() {
        let mut a = SpecializationConstantInfo::new();
        let mut b = SpecializationConstantInfo::new();
        a.add_value(0, 1u32);
        b.add_value(0, 1u32);
        assert_eq!(a, b);
        b.change_value(0, 2u32);
        assert_ne!(a, b);
    }
}
