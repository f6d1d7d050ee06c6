//! Image option bit-field decoding.
//!
//! Compute images carry a `com.rackspace__1__options` code describing the
//! licensed operating system or network appliance. Only the combinations in
//! the table below are valid; anything else fails the record.

use crate::error::{CoreError, Result};

/// Metadata key holding the option code in `image_meta`.
pub const OPTIONS_KEY: &str = "com.rackspace__1__options";

/// Decoded product options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductOptions {
    /// No markers.
    None,
    /// Boolean system markers rendered as `name="true"`.
    System(&'static [&'static str]),
    /// A network appliance rendered as `appliance="NAME"`.
    Appliance(&'static str),
}

const OPTIONS_TABLE: &[(&str, ProductOptions)] = &[
    ("0", ProductOptions::None),
    ("1", ProductOptions::System(&["isRedHat"])),
    ("2", ProductOptions::System(&["isSELinux"])),
    ("4", ProductOptions::System(&["isWindows"])),
    ("12", ProductOptions::System(&["isWindows", "isMSSQL"])),
    ("36", ProductOptions::System(&["isWindows", "isMSSQLWeb"])),
    ("64", ProductOptions::Appliance("VYATTA")),
];

impl ProductOptions {
    /// Decodes an option code.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnknownOption` for codes outside the table.
    pub fn decode(code: &str) -> Result<Self> {
        OPTIONS_TABLE
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, options)| *options)
            .ok_or_else(|| CoreError::unknown_option(code))
    }

    /// Attribute pairs in document order.
    pub fn attributes(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            Self::None => Vec::new(),
            Self::System(names) => names.iter().map(|name| (*name, "true")).collect(),
            Self::Appliance(name) => vec![("appliance", *name)],
        }
    }
}
