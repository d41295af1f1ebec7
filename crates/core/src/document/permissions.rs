//! Document access permissions carried in the `/P` entry.

use bitflags::bitflags;

bitflags! {
    /// User access permissions of the standard security handler.
    ///
    /// Bit positions follow the `/P` value (bit 3 is `1 << 2`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u32 {
        const PRINT = 1 << 2;
        const MODIFY = 1 << 3;
        const COPY = 1 << 4;
        const ANNOTATE = 1 << 5;
        const FILL_FORMS = 1 << 8;
        const EXTRACT_ACCESSIBILITY = 1 << 9;
        const ASSEMBLE = 1 << 10;
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

/// Bits that must be 1 in a written `/P` value: 7, 8 and 13-32.
const RESERVED_ONES: u32 = 0xFFFF_F0C0;

impl Permissions {
    /// Decode a signed `/P` value, ignoring reserved bits.
    pub const fn from_p_value(p: i32) -> Self {
        Self::from_bits_truncate(p as u32)
    }

    /// Encode as the signed 32-bit `/P` value.
    pub const fn to_p_value(self) -> i32 {
        (RESERVED_ONES | self.bits()) as i32
    }

    /// Permission names as used on the command line and in reports.
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| flag_label(name)).collect()
    }

    /// Parse a label as produced by [`Permissions::names`].
    pub fn from_label(label: &str) -> Option<Self> {
        Self::all()
            .iter_names()
            .find(|(name, _)| flag_label(name) == label)
            .map(|(_, flag)| flag)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::all()
    }
}

impl serde::Serialize for Permissions {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}

fn flag_label(name: &str) -> &'static str {
    match name {
        "PRINT" => "print",
        "MODIFY" => "modify",
        "COPY" => "copy",
        "ANNOTATE" => "annotate",
        "FILL_FORMS" => "fill-forms",
        "EXTRACT_ACCESSIBILITY" => "accessibility",
        "ASSEMBLE" => "assemble",
        "PRINT_HIGH_QUALITY" => "print-high-quality",
        _ => "unknown",
    }
}
